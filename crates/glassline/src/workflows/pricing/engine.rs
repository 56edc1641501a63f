use std::collections::BTreeMap;

use super::domain::{round_cents, Formula, LineItem, PricingRule};

/// Result of evaluating a formula for one line item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluated {
    pub unit_price: f64,
    pub total: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("line item '{0}' has no measured area for a per-square-foot formula")]
    MissingArea(String),
}

/// True when every predicate entry appears in `attributes` with an equal
/// value. An empty predicate matches everything.
fn predicate_matches(
    applies_to: &BTreeMap<String, String>,
    attributes: &BTreeMap<String, String>,
) -> bool {
    applies_to
        .iter()
        .all(|(key, value)| attributes.get(key) == Some(value))
}

/// Most specific active rule matching the attribute set. Specificity is
/// the predicate's key count; ties resolve to the earlier-created rule so
/// re-runs produce identical quotes.
pub fn resolve_rule<'a>(
    rules: &'a [PricingRule],
    attributes: &BTreeMap<String, String>,
) -> Option<&'a PricingRule> {
    let mut best: Option<&PricingRule> = None;
    for rule in rules.iter().filter(|rule| rule.is_active) {
        if !predicate_matches(&rule.applies_to, attributes) {
            continue;
        }
        match best {
            Some(current) if rule.specificity() <= current.specificity() => {}
            _ => best = Some(rule),
        }
    }
    best
}

/// Evaluate `formula` against the line item's quantity and measurement.
pub fn evaluate(formula: &Formula, item: &LineItem) -> Result<Evaluated, EvaluationError> {
    let evaluated = match formula {
        Formula::PerSqft { rate } => {
            let area = item
                .area_sqft
                .ok_or_else(|| EvaluationError::MissingArea(item.item_id.clone()))?;
            Evaluated {
                unit_price: *rate,
                total: round_cents(rate * area),
            }
        }
        Formula::UnitPrice { unit_price } => Evaluated {
            unit_price: *unit_price,
            total: round_cents(unit_price * f64::from(item.quantity)),
        },
        Formula::Fixed { amount } => Evaluated {
            unit_price: *amount,
            total: round_cents(*amount),
        },
    };
    Ok(evaluated)
}
