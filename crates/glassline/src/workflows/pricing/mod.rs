//! Pricing engine: versioned rule sets, specificity-ranked resolution,
//! formula evaluation, and transactional manual override with an audit
//! trail. Operates over the same durable record store as the job state
//! machine but is triggered only by admin and override calls.

pub mod domain;
pub mod engine;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    round_cents, Formula, LineItem, PricebookVersion, PricingRule, QuotePricing, RuleCategory,
    RuleId, VersionId,
};
pub use engine::{evaluate, resolve_rule, Evaluated, EvaluationError};
pub use repository::{AuditAction, AuditEntry, AuditError, AuditSink, PricebookRepository};
pub use router::pricing_router;
pub use service::{
    CreateVersionRequest, OverrideRequest, PriceJobRequest, PricingError, PricingService, RuleSpec,
};
