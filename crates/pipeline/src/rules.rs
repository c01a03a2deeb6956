//! Rule table and first-match routing.

use domain::PRODUCT_DISCRIMINATOR;
use regex::Regex;

use crate::job::Job;

/// Processing strategy a rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Materialize,
    Cdc,
    Job,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Materialize => "materialize",
            Flavor::Cdc => "cdc",
            Flavor::Job => "job",
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches event types. Regular expressions must match the whole type.
#[derive(Debug, Clone)]
pub enum EventTypePattern {
    Exact(String),
    Regex(Regex),
}

impl EventTypePattern {
    /// Matches one type exactly.
    pub fn exact(event_type: impl Into<String>) -> Self {
        EventTypePattern::Exact(event_type.into())
    }

    /// Compiles `pattern`, anchored at both ends.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(EventTypePattern::Regex(Regex::new(&format!(
            "^(?:{pattern})$"
        ))?))
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            EventTypePattern::Exact(expected) => expected == event_type,
            EventTypePattern::Regex(regex) => regex.is_match(event_type),
        }
    }
}

/// Target of a materialize rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeSpec {
    /// Discriminator written, also the root sort key.
    pub discriminator: String,
}

/// Options of a CDC rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdcSpec {
    /// Fetch every record sharing the changed record's partition key.
    pub query_related: bool,
}

/// What a matched rule does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Materialize(MaterializeSpec),
    Cdc(CdcSpec),
    Job(Job),
}

impl RuleAction {
    pub fn flavor(&self) -> Flavor {
        match self {
            RuleAction::Materialize(_) => Flavor::Materialize,
            RuleAction::Cdc(_) => Flavor::Cdc,
            RuleAction::Job(_) => Flavor::Job,
        }
    }
}

/// One routing entry.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub pattern: EventTypePattern,
    pub action: RuleAction,
}

impl Rule {
    pub fn new(id: impl Into<String>, pattern: EventTypePattern, action: RuleAction) -> Self {
        Self {
            id: id.into(),
            pattern,
            action,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.action.flavor()
    }
}

/// An ordered rule table. The first rule whose pattern matches wins.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Returns the first matching rule, or `None` if the event should be
    /// dropped.
    pub fn route(&self, event_type: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.pattern.matches(event_type))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns true if any rule matches. Lets the transport prefilter.
    pub fn accepts(&self, event_type: &str) -> bool {
        self.route(event_type).is_some()
    }

    /// Rules applied to inbound domain events.
    pub fn listener() -> Result<Self, regex::Error> {
        let product = || {
            RuleAction::Materialize(MaterializeSpec {
                discriminator: PRODUCT_DISCRIMINATOR.to_string(),
            })
        };

        Ok(Self::new(vec![
            Rule::new(
                "m1",
                EventTypePattern::regex(
                    "product-(draft|published|deactivated|out-of-stock|discontinued|deleted)",
                )?,
                product(),
            ),
            Rule::new(
                "m2",
                EventTypePattern::exact("product-inventory-updated"),
                product(),
            ),
            Rule::new(
                "m3",
                EventTypePattern::exact("product-price-updated"),
                product(),
            ),
        ]))
    }

    /// Rules applied to the store's change feed and to timer events.
    pub fn trigger() -> Result<Self, regex::Error> {
        let cdc = RuleAction::Cdc(CdcSpec {
            query_related: true,
        });

        Ok(Self::new(vec![
            Rule::new(
                "t1",
                EventTypePattern::regex("product-(created|updated|deleted)")?,
                cdc.clone(),
            ),
            Rule::new(
                "t2",
                EventTypePattern::regex("product-variant-(created|updated|deleted)")?,
                cdc,
            ),
            Rule::new(
                Job::InventoryCheck.id(),
                EventTypePattern::exact(Job::InventoryCheck.trigger_type()),
                RuleAction::Job(Job::InventoryCheck),
            ),
            Rule::new(
                Job::PriceSync.id(),
                EventTypePattern::exact(Job::PriceSync.trigger_type()),
                RuleAction::Job(Job::PriceSync),
            ),
        ]))
    }
}
