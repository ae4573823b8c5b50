use crate::error::{CalculationError, Result};
use crate::schema::{numeric_value, FieldValues};
use crate::utils::round_currency;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Every intermediate value a calculation used, keyed by name.
pub type Breakdown = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationOutcome {
    pub total: f64,
    pub breakdown: Breakdown,
}

pub type CalculatorFn = fn(&FieldValues) -> CalculationOutcome;

/// Volume tiers for `subscription-tiered`: (minimum users, discount %), highest first.
pub const SUBSCRIPTION_TIERS: [(f64, f64); 3] = [(200.0, 20.0), (100.0, 15.0), (50.0, 10.0)];

/// Fixed mapping of calculator id to function. Templates can only name calculators
/// registered here.
#[derive(Clone, Default)]
pub struct CalculatorRegistry {
    calculators: BTreeMap<String, CalculatorFn>,
}

impl fmt::Debug for CalculatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.calculators.keys()).finish()
    }
}

impl CalculatorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("learnership-complex", learnership_complex);
        registry.register("subscription-tiered", subscription_tiered);
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, calculator: CalculatorFn) {
        self.calculators.insert(id.into(), calculator);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.calculators.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.calculators.keys().map(String::as_str)
    }

    pub fn run(&self, id: &str, values: &FieldValues) -> Result<CalculationOutcome> {
        let calculator = self
            .calculators
            .get(id)
            .ok_or_else(|| CalculationError::UnknownCalculator(id.to_string()))?;
        Ok(calculator(values))
    }
}

/// Learners times rate, less a percentage discount.
pub fn learnership_complex(values: &FieldValues) -> CalculationOutcome {
    let learner_count = numeric_value(values, "learnerCount");
    let cost_per_learner = numeric_value(values, "costPerLearner");
    let discount_percentage = numeric_value(values, "discountPercentage");

    let subtotal = round_currency(learner_count * cost_per_learner);
    let discount_amount = round_currency(subtotal * discount_percentage / 100.0);
    let total = round_currency(subtotal - discount_amount);

    let breakdown = Breakdown::from([
        ("learnerCount".to_string(), learner_count),
        ("costPerLearner".to_string(), cost_per_learner),
        ("subtotal".to_string(), subtotal),
        ("discountPercentage".to_string(), discount_percentage),
        ("discountAmount".to_string(), discount_amount),
        ("total".to_string(), total),
    ]);
    CalculationOutcome { total, breakdown }
}

pub fn subscription_discount(user_count: f64) -> f64 {
    SUBSCRIPTION_TIERS
        .iter()
        .find(|(min_users, _)| user_count >= *min_users)
        .map(|(_, discount)| *discount)
        .unwrap_or(0.0)
}

/// Per-user rate with the volume discount of the highest tier reached.
pub fn subscription_tiered(values: &FieldValues) -> CalculationOutcome {
    let user_count = numeric_value(values, "userCount");
    let price_per_user = numeric_value(values, "pricePerUser");
    let discount_percentage = subscription_discount(user_count);

    let subtotal = round_currency(user_count * price_per_user);
    let discount_amount = round_currency(subtotal * discount_percentage / 100.0);
    let total = round_currency(subtotal - discount_amount);
    let effective_price = if user_count > 0.0 {
        round_currency(total / user_count)
    } else {
        0.0
    };

    let breakdown = Breakdown::from([
        ("userCount".to_string(), user_count),
        ("pricePerUser".to_string(), price_per_user),
        ("subtotal".to_string(), subtotal),
        ("discountPercentage".to_string(), discount_percentage),
        ("discountAmount".to_string(), discount_amount),
        ("effectivePricePerUser".to_string(), effective_price),
        ("total".to_string(), total),
    ]);
    CalculationOutcome { total, breakdown }
}
