//! Catalog read path: listings and aggregate lookups.

use record_store::{Index, QueryPage, QueryRequest, RecordStore};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::Result;
use crate::aggregate::{Aggregate, AggregateMapper};
use crate::mapper::RecordMapper;

/// Parameters of a product listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Cursor returned by the previous page.
    #[serde(default, alias = "last")]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Lists one category through the category index.
    #[serde(default)]
    pub category: Option<String>,
    /// Keeps only products in this status; applied after the fetch.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
}

impl ListQuery {
    fn to_request(&self, root: &str) -> QueryRequest {
        let mut request = match &self.category {
            Some(category) => QueryRequest::on(Index::Gsi2, category.clone()),
            None => QueryRequest::on(Index::Gsi1, root),
        };
        if let Some(cursor) = &self.cursor {
            request = request.cursor(cursor.clone());
        }
        if let Some(limit) = self.limit {
            request = request.limit(limit);
        }
        if let Some(search) = &self.search {
            request = request.search(search.clone());
        }
        if let Some(sort_by) = &self.sort_by {
            request = request.sort_by(sort_by.clone());
        }
        request
    }
}

/// Reads products out of the record store.
#[derive(Clone)]
pub struct CatalogReader<S: RecordStore> {
    store: S,
    mapper: AggregateMapper,
}

impl<S: RecordStore> CatalogReader<S> {
    /// Creates a reader for the product catalog.
    pub fn new(store: S) -> Self {
        Self::with_mapper(store, AggregateMapper::catalog())
    }

    /// Creates a reader with a custom aggregate mapper.
    pub fn with_mapper(store: S, mapper: AggregateMapper) -> Self {
        Self { store, mapper }
    }

    /// Lists live root records, each mapped to its public form.
    ///
    /// Tombstones are excluded immediately, even while still stored.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, query: ListQuery) -> Result<QueryPage<Map<String, Value>>> {
        let root = self.mapper.root();
        let page = self.store.query(query.to_request(root)).await?;

        let data = page
            .data
            .iter()
            .filter(|r| !r.is_deleted())
            .filter(|r| r.discriminator == root)
            .filter(|r| query.status.as_deref().is_none_or(|s| r.status() == Some(s)))
            .map(|r| RecordMapper::root().map(r))
            .collect();

        metrics::counter!("catalog_reads_total", "operation" => "list").increment(1);
        Ok(QueryPage {
            data,
            cursor: page.cursor,
        })
    }

    /// Rebuilds the aggregate for `id`, or `None` if the partition holds no
    /// visible records. A tombstoned product stays readable here until its
    /// retention window passes.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<Aggregate>> {
        let records = self.store.get(id).await?;
        metrics::counter!("catalog_reads_total", "operation" => "get").increment(1);

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.mapper.map(&records)))
    }

    /// Lists the products of one category.
    pub async fn list_category(
        &self,
        category: &str,
        mut query: ListQuery,
    ) -> Result<QueryPage<Map<String, Value>>> {
        query.category = Some(category.to_string());
        self.list(query).await
    }
}
