//! Scheduled jobs: a static scan plus one alert per run.

use domain::{PRODUCT_DISCRIMINATOR, ProductStatus};
use record_store::{ScanRequest, attr};

/// Stock level at or below which an active product counts as low.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

/// How far back the price sync looks for changes.
pub const PRICE_SYNC_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// A timer-triggered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Finds active products running low on stock.
    InventoryCheck,
    /// Finds active products changed in the last day.
    PriceSync,
}

impl Job {
    /// Returns the job id.
    pub fn id(&self) -> &'static str {
        match self {
            Job::InventoryCheck => "inventory-check",
            Job::PriceSync => "price-sync",
        }
    }

    /// Returns the timer event type that runs the job.
    pub fn trigger_type(&self) -> &'static str {
        match self {
            Job::InventoryCheck => "inventory-check-scheduled",
            Job::PriceSync => "price-sync-scheduled",
        }
    }

    /// Returns the type of the single alert each run emits.
    pub fn alert_type(&self) -> &'static str {
        match self {
            Job::InventoryCheck => "low-stock-alert",
            Job::PriceSync => "price-changes-detected",
        }
    }

    /// Builds the job's scan. It depends only on the job and the current
    /// time, never on the triggering event.
    pub fn scan_request(&self, now_millis: i64) -> ScanRequest {
        let active = ProductStatus::Active.as_str();

        match self {
            Job::InventoryCheck => ScanRequest::new(
                "#stockQuantity <= :lowStock AND #status = :status AND #discriminator = :discriminator",
            )
            .name("#stockQuantity", "stockQuantity")
            .name("#status", attr::STATUS)
            .name("#discriminator", attr::DISCRIMINATOR)
            .value(":lowStock", LOW_STOCK_THRESHOLD)
            .value(":status", active)
            .value(":discriminator", PRODUCT_DISCRIMINATOR),
            Job::PriceSync => ScanRequest::new(
                "#status = :status AND #discriminator = :discriminator AND #lastModified > :yesterday",
            )
            .name("#status", attr::STATUS)
            .name("#discriminator", attr::DISCRIMINATOR)
            .name("#lastModified", attr::TIMESTAMP)
            .value(":status", active)
            .value(":discriminator", PRODUCT_DISCRIMINATOR)
            .value(":yesterday", now_millis - PRICE_SYNC_WINDOW_MS),
        }
    }
}
