use crate::calculators::{Breakdown, CalculatorRegistry};
use crate::formula::{identifiers, try_evaluate};
use crate::schema::{numeric_value, EffectiveTemplate, FieldValues, FormulaDef};
use crate::utils::round_currency;
use log::{debug, warn};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeResult {
    pub total: f64,
    pub breakdown: Breakdown,
    /// Set when the formula could not be evaluated, or its calculator is unknown or failed,
    /// and the total fell back to 0. The breakdown is then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub template_id: String,
    pub template_name: String,
}

/// Layers values by precedence: template field defaults, then product defaults, then
/// what the user entered. Blank user entries do not mask a default.
pub fn merge_values(
    template: &EffectiveTemplate,
    field_values: &FieldValues,
    product_defaults: Option<&FieldValues>,
) -> FieldValues {
    let mut merged = template.field_defaults();
    if let Some(defaults) = product_defaults {
        merged.extend(
            defaults
                .iter()
                .filter(|(_, v)| !v.is_blank())
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
    merged.extend(
        field_values
            .iter()
            .filter(|(_, v)| !v.is_blank())
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    merged
}

/// Income total for an already-resolved template. Never fails: a broken formula or an
/// unregistered calculator yields a zero total with `error` set.
pub fn calculate_template_total(
    template: &EffectiveTemplate,
    calculators: &CalculatorRegistry,
    field_values: &FieldValues,
    product_defaults: Option<&FieldValues>,
) -> IncomeResult {
    let values = merge_values(template, field_values, product_defaults);

    let (total, breakdown, error) = match &template.formula {
        FormulaDef::Simple { expression } => {
            let mut breakdown: Breakdown = identifiers(expression)
                .into_iter()
                .map(|id| {
                    let value = numeric_value(&values, &id);
                    (id, value)
                })
                .collect();
            match try_evaluate(expression, &values) {
                Ok(total) => {
                    let total = round_currency(total);
                    breakdown.insert("total".to_string(), total);
                    (total, breakdown, None)
                }
                Err(e) => {
                    warn!("Template '{}': {}", template.id, e);
                    (0.0, breakdown, Some(e.to_string()))
                }
            }
        }
        FormulaDef::Custom {
            custom_calculator_id,
        } => match calculators.run(custom_calculator_id, &values) {
            Ok(outcome) => (outcome.total, outcome.breakdown, None),
            Err(e) => {
                warn!("Template '{}': {}", template.id, e);
                (0.0, Breakdown::new(), Some(e.to_string()))
            }
        },
    };

    debug!("Template '{}' income total {}", template.id, total);

    IncomeResult {
        total,
        breakdown,
        error,
        template_id: template.id.clone(),
        template_name: template.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TemplateRegistry;
    use crate::schema::FieldValue;

    fn values(pairs: &[(&str, FieldValue)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn learnership() -> EffectiveTemplate {
        TemplateRegistry::default().get_template("learnership").unwrap()
    }

    #[test]
    fn test_simple_formula_total() {
        let result = calculate_template_total(
            &learnership(),
            &CalculatorRegistry::with_builtins(),
            &values(&[("learnerCount", 15.into()), ("costPerLearner", 28000.into())]),
            None,
        );
        assert_eq!(result.total, 420000.0);
        assert_eq!(result.breakdown["learnerCount"], 15.0);
        assert_eq!(result.breakdown["total"], 420000.0);
        assert_eq!(result.template_id, "learnership");
        assert_eq!(result.template_name, "Learnership");
        assert!(result.error.is_none());
    }

    #[test]
    fn test_merge_precedence() {
        let template = learnership();
        let product = values(&[("costPerLearner", 30000.into()), ("learnerCount", 5.into())]);
        let entered = values(&[("learnerCount", 10.into()), ("costPerLearner", "".into())]);

        let merged = merge_values(&template, &entered, Some(&product));
        assert_eq!(merged["learnerCount"], FieldValue::Number(10.0));
        // Blank entry keeps the product default
        assert_eq!(merged["costPerLearner"], FieldValue::Number(30000.0));
        // Template default for a field nobody set
        assert_eq!(merged["duration"], FieldValue::Number(12.0));

        let result = calculate_template_total(
            &template,
            &CalculatorRegistry::with_builtins(),
            &entered,
            Some(&product),
        );
        assert_eq!(result.total, 300000.0);
    }

    #[test]
    fn test_template_default_applies_without_product() {
        let result = calculate_template_total(
            &learnership(),
            &CalculatorRegistry::with_builtins(),
            &values(&[("learnerCount", 2.into())]),
            None,
        );
        assert_eq!(result.total, 56000.0);
    }

    #[test]
    fn test_custom_calculator_dispatch() {
        let template = TemplateRegistry::default()
            .get_template("subscription")
            .unwrap();
        let result = calculate_template_total(
            &template,
            &CalculatorRegistry::with_builtins(),
            &values(&[("userCount", 50.into()), ("pricePerUser", 100.into())]),
            None,
        );
        assert_eq!(result.total, 4500.0);
        assert_eq!(result.breakdown["discountPercentage"], 10.0);
    }

    #[test]
    fn test_unknown_calculator_degrades_to_zero() {
        let template = TemplateRegistry::default()
            .get_template("subscription")
            .unwrap();
        let result = calculate_template_total(
            &template,
            &CalculatorRegistry::empty(),
            &values(&[("userCount", 50.into()), ("pricePerUser", 100.into())]),
            None,
        );
        assert_eq!(result.total, 0.0);
        assert!(result.breakdown.is_empty());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["error"].as_str().unwrap().contains("subscription-tiered"));
        assert_eq!(json["breakdown"], serde_json::json!({}));
    }

    #[test]
    fn test_broken_expression_degrades_to_zero() {
        let mut template = learnership();
        template.formula = FormulaDef::Simple {
            expression: "learnerCount ^ 2".to_string(),
        };
        let result = calculate_template_total(
            &template,
            &CalculatorRegistry::with_builtins(),
            &values(&[("learnerCount", 3.into())]),
            None,
        );
        assert_eq!(result.total, 0.0);
        assert!(result.error.is_some());
    }
}
