use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Round a monetary amount to the nearest cent. Applied at every point a
/// computed value is persisted, never mid-formula.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Identifier wrapper for pricebook versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for pricing rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Line-item families the rule set prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    ShowerEnclosure,
    VanityMirror,
    Hardware,
    Labor,
    Misc,
}

impl RuleCategory {
    pub fn label(&self) -> &'static str {
        match self {
            RuleCategory::ShowerEnclosure => "SHOWER_ENCLOSURE",
            RuleCategory::VanityMirror => "VANITY_MIRROR",
            RuleCategory::Hardware => "HARDWARE",
            RuleCategory::Labor => "LABOR",
            RuleCategory::Misc => "MISC",
        }
    }
}

/// Closed pricing formula sum type; adding a kind is a compile-checked
/// change for every evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    PerSqft { rate: f64 },
    UnitPrice { unit_price: f64 },
    Fixed { amount: f64 },
}

/// One pricing formula plus the predicate selecting the items it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: RuleId,
    pub name: String,
    pub category: RuleCategory,
    pub formula: Formula,
    /// Partial-match predicate: every entry must be present in the item's
    /// attributes with an equal value. Empty matches everything.
    #[serde(default)]
    pub applies_to: BTreeMap<String, String>,
    pub is_active: bool,
}

impl PricingRule {
    /// Number of predicate attributes; higher wins during resolution.
    pub fn specificity(&self) -> usize {
        self.applies_to.len()
    }
}

/// Immutable, ordered snapshot of pricing policy. `rules` preserves
/// creation order, which breaks specificity ties deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricebookVersion {
    pub id: VersionId,
    pub version: u32,
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub rules: Vec<PricingRule>,
    pub created_at: DateTime<Utc>,
}

/// One priced row of a quote, embedded in the job's SSOT document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: String,
    pub category: RuleCategory,
    pub quantity: u32,
    /// Attributes the rule predicate matches against (glass type,
    /// hardware finish, and the like). Set by upstream measurement.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Measured area backing per-square-foot formulas.
    #[serde(default)]
    pub area_sqft: Option<f64>,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(default)]
    pub manual_override: bool,
    #[serde(default)]
    pub override_reason: Option<String>,
}

impl LineItem {
    /// Attribute set used for rule resolution; the category participates
    /// as an implicit attribute unless the item already carries one.
    pub fn match_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = self.attributes.clone();
        attributes
            .entry("category".to_string())
            .or_insert_with(|| self.category.label().to_string());
        attributes
    }
}

/// Typed pricing section of the SSOT, serialized only at the storage
/// boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotePricing {
    pub line_items: Vec<LineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

impl QuotePricing {
    /// Recompute subtotal and grand total from the line totals; tax
    /// carries over unchanged.
    pub fn recompute(&mut self) {
        let subtotal: f64 = self.line_items.iter().map(|item| item.total_price).sum();
        self.subtotal = round_cents(subtotal);
        self.total = round_cents(self.subtotal + self.tax);
    }
}
