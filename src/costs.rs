use crate::schema::{keys, CostType, EffectiveTemplate, FieldValue, FieldValues};
use crate::utils::round_currency;
use log::debug;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// When a cost line is incurred.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CostFrequency {
    Monthly,
    WithIncome,
    EndOfProgram,
    #[default]
    OnceOff,
    /// Unrecognised tag; distributed like `OnceOff`.
    Other(String),
}

impl CostFrequency {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "" | "once-off" => Self::OnceOff,
            "monthly" => Self::Monthly,
            "with-income" => Self::WithIncome,
            "end-of-program" => Self::EndOfProgram,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Monthly => "monthly",
            Self::WithIncome => "with-income",
            Self::EndOfProgram => "end-of-program",
            Self::OnceOff => "once-off",
            Self::Other(tag) => tag.as_str(),
        }
    }

    pub fn from_value(value: Option<&FieldValue>) -> Self {
        value
            .map(|v| Self::parse(&v.as_text()))
            .unwrap_or_default()
    }
}

impl fmt::Display for CostFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CostFrequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLine {
    #[serde(rename = "type")]
    pub cost_type: CostType,
    /// Display name, or the user's custom label when the field allows one.
    pub name: String,
    pub amount: f64,
    pub frequency: CostFrequency,
    /// The entered 0-100 rate for percentage-of-income costs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub costs: BTreeMap<String, CostLine>,
    pub total_cost: f64,
}

/// Resolves every cost field of the template into an amount and a frequency tag.
/// Percentage costs are taken of `total_income`; absent values contribute 0.
pub fn calculate_template_costs(
    template: &EffectiveTemplate,
    cost_values: &FieldValues,
    total_income: f64,
) -> CostBreakdown {
    let mut costs = BTreeMap::new();

    for def in &template.cost_fields {
        let entered = cost_values
            .get(&def.id)
            .map(FieldValue::as_number)
            .unwrap_or(0.0);

        let (amount, percentage) = if def.is_percentage {
            (round_currency(total_income * (entered / 100.0)), Some(entered))
        } else {
            (round_currency(entered), None)
        };

        let name = cost_values
            .get(&keys::label_key(&def.id))
            .filter(|_| def.has_custom_label)
            .map(FieldValue::as_text)
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| def.name.clone());

        let frequency = CostFrequency::from_value(cost_values.get(&keys::frequency_key(&def.id)));

        debug!("Cost '{}' = {} ({})", def.id, amount, frequency);

        costs.insert(
            def.id.clone(),
            CostLine {
                cost_type: def.cost_type,
                name,
                amount,
                frequency,
                percentage,
            },
        );
    }

    let total_cost = round_currency(costs.values().map(|c| c.amount).sum());

    CostBreakdown { costs, total_cost }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TemplateRegistry;

    fn learnership() -> EffectiveTemplate {
        TemplateRegistry::default().get_template("learnership").unwrap()
    }

    fn values(pairs: &[(&str, FieldValue)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_percentage_cost_of_income() {
        let breakdown =
            calculate_template_costs(&learnership(), &values(&[("commission", 10.into())]), 420000.0);
        let commission = &breakdown.costs["commission"];
        assert_eq!(commission.amount, 42000.0);
        assert_eq!(commission.percentage, Some(10.0));
        assert_eq!(commission.cost_type, CostType::Percentage);
        assert_eq!(breakdown.total_cost, 42000.0);
    }

    #[test]
    fn test_fixed_costs_and_frequencies() {
        let breakdown = calculate_template_costs(
            &learnership(),
            &values(&[
                ("facilitation", "60000".into()),
                ("facilitationFrequency", "monthly".into()),
                ("assessment", 10000.into()),
                ("assessmentFrequency", "end-of-program".into()),
            ]),
            0.0,
        );
        assert_eq!(breakdown.costs["facilitation"].amount, 60000.0);
        assert_eq!(breakdown.costs["facilitation"].frequency, CostFrequency::Monthly);
        assert_eq!(
            breakdown.costs["assessment"].frequency,
            CostFrequency::EndOfProgram
        );
        assert_eq!(breakdown.costs["stipends"].frequency, CostFrequency::OnceOff);
        assert_eq!(breakdown.total_cost, 70000.0);
    }

    #[test]
    fn test_empty_cost_values() {
        let breakdown = calculate_template_costs(&learnership(), &FieldValues::new(), 420000.0);
        assert_eq!(breakdown.total_cost, 0.0);
        assert_eq!(breakdown.costs.len(), 4);
        assert!(breakdown.costs.values().all(|c| c.amount == 0.0));
    }

    #[test]
    fn test_total_equals_sum_of_lines() {
        let breakdown = calculate_template_costs(
            &learnership(),
            &values(&[
                ("facilitation", 1234.565.into()),
                ("stipends", "999.994".into()),
                ("commission", 7.5.into()),
            ]),
            123456.78,
        );
        let sum: f64 = breakdown.costs.values().map(|c| c.amount).sum();
        assert!((breakdown.total_cost - sum).abs() < 0.005);
    }

    #[test]
    fn test_custom_label_only_when_allowed() {
        let template = TemplateRegistry::default()
            .get_template("subscription")
            .unwrap();
        let breakdown = calculate_template_costs(
            &template,
            &values(&[
                ("support", 500.into()),
                ("supportLabel", "Premium support".into()),
                ("licensingLabel", "ignored".into()),
            ]),
            1000.0,
        );
        assert_eq!(breakdown.costs["support"].name, "Premium support");
        assert_eq!(breakdown.costs["licensing"].name, "Vendor licensing");
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!(CostFrequency::parse("with-income"), CostFrequency::WithIncome);
        assert_eq!(CostFrequency::parse(""), CostFrequency::OnceOff);
        assert_eq!(
            CostFrequency::parse("quarterly"),
            CostFrequency::Other("quarterly".to_string())
        );
        assert_eq!(
            serde_json::to_string(&CostFrequency::EndOfProgram).unwrap(),
            "\"end-of-program\""
        );
    }
}
