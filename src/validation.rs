use crate::calculators::CalculatorRegistry;
use crate::costs::CostFrequency;
use crate::formula::{identifiers, parse_arithmetic, substitute};
use crate::schema::{
    keys, EffectiveTemplate, FieldDef, FieldType, FieldValue, FieldValues, FormulaDef,
    PERCENTAGE_OF_TOTAL_AMOUNT,
};
use crate::utils::{parse_date_input, parse_month_input};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Error key used when the template itself could not be loaded.
pub const TEMPLATE_ERROR_KEY: &str = "_template";

/// Every violation found in one pass, keyed by field id, so a form can show them together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl ValidationResult {
    fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn template_error(message: impl Into<String>) -> Self {
        Self::from_errors(BTreeMap::from([(
            TEMPLATE_ERROR_KEY.to_string(),
            message.into(),
        )]))
    }
}

fn present<'a>(values: &'a FieldValues, key: &str) -> Option<&'a FieldValue> {
    values.get(key).filter(|v| !v.is_blank())
}

fn check_field(def: &FieldDef, value: Option<&FieldValue>) -> Option<String> {
    let Some(value) = value else {
        return def.required.then(|| format!("{} is required", def.name));
    };

    if def.field_type.is_numeric() {
        let Some(number) = value.parse_number() else {
            return Some(format!("{} must be a number", def.name));
        };
        let validation = def.validation.clone().unwrap_or_default();
        if let Some(min) = validation.min.filter(|min| number < *min) {
            return Some(format!("{} must be at least {}", def.name, min));
        }
        if let Some(max) = validation.max.filter(|max| number > *max) {
            return Some(format!("{} must be at most {}", def.name, max));
        }
    } else if def.field_type == FieldType::Date
        && parse_date_input(value).or_else(|| parse_month_input(value)).is_none()
    {
        return Some(format!("{} must be a valid date", def.name));
    }

    None
}

/// Required check first; bounds only apply to values that are present.
pub fn validate_field_values(template: &EffectiveTemplate, values: &FieldValues) -> ValidationResult {
    let errors = template
        .fields
        .iter()
        .filter_map(|def| {
            check_field(def, present(values, &def.id)).map(|message| (def.id.clone(), message))
        })
        .collect();
    ValidationResult::from_errors(errors)
}

pub fn validate_cost_values(template: &EffectiveTemplate, cost_values: &FieldValues) -> ValidationResult {
    let mut errors = BTreeMap::new();

    for def in &template.cost_fields {
        if let Some(value) = present(cost_values, &def.id) {
            match value.parse_number() {
                None => {
                    errors.insert(def.id.clone(), format!("{} must be a number", def.name));
                }
                Some(rate) if def.is_percentage && !(0.0..=100.0).contains(&rate) => {
                    errors.insert(
                        def.id.clone(),
                        format!("{} must be between 0 and 100", def.name),
                    );
                }
                Some(amount) if !def.is_percentage && amount < 0.0 => {
                    errors.insert(def.id.clone(), format!("{} cannot be negative", def.name));
                }
                Some(_) => {}
            }
        }

        let frequency_key = keys::frequency_key(&def.id);
        if let Some(tag) = present(cost_values, &frequency_key) {
            let tag = tag.as_text();
            let allowed = def.frequency_options.iter().any(|o| *o == tag.trim());
            if def.has_frequency && !def.frequency_options.is_empty() && !allowed {
                errors.insert(
                    frequency_key,
                    format!("'{}' is not an allowed frequency for {}", tag, def.name),
                );
            }
        }
    }

    ValidationResult::from_errors(errors)
}

pub fn is_identifier(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Structural problems in a resolved template. Empty means the template is usable.
pub fn validate_template(template: &EffectiveTemplate, calculators: &CalculatorRegistry) -> Vec<String> {
    let mut issues = Vec::new();

    let mut seen = BTreeSet::new();
    for def in &template.fields {
        if !is_identifier(&def.id) {
            issues.push(format!("Field id '{}' is not a valid identifier", def.id));
        }
        if !seen.insert(def.id.as_str()) {
            issues.push(format!("Duplicate field id '{}'", def.id));
        }
    }

    let mut seen_costs = BTreeSet::new();
    for cost in &template.cost_fields {
        if !seen_costs.insert(cost.id.as_str()) {
            issues.push(format!("Duplicate cost field id '{}'", cost.id));
        }
        if cost.is_percentage && cost.percentage_of.as_deref() != Some(PERCENTAGE_OF_TOTAL_AMOUNT) {
            issues.push(format!(
                "Percentage cost '{}' must be a percentage of '{}'",
                cost.id, PERCENTAGE_OF_TOTAL_AMOUNT
            ));
        }
        for option in &cost.frequency_options {
            if let CostFrequency::Other(tag) = CostFrequency::parse(option) {
                issues.push(format!("Cost '{}' lists unknown frequency '{}'", cost.id, tag));
            }
        }
    }

    match &template.formula {
        FormulaDef::Simple { expression } if expression.trim().is_empty() => {
            issues.push("Simple formula has an empty expression".to_string());
        }
        FormulaDef::Simple { expression } => {
            for id in identifiers(expression) {
                if !seen.contains(id.as_str()) && !keys::CONTEXT_KEYS.contains(&id.as_str()) {
                    issues.push(format!("Formula references unknown field '{}'", id));
                }
            }
            if let Err(e) = parse_arithmetic(&substitute(expression, &FieldValues::new())) {
                issues.push(format!("Formula does not parse: {}", e));
            }
        }
        FormulaDef::Custom {
            custom_calculator_id,
        } => {
            if !calculators.contains(custom_calculator_id) {
                issues.push(format!(
                    "Custom calculator '{}' is not registered",
                    custom_calculator_id
                ));
            }
        }
    }

    issues
}
