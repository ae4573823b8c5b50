use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field-value keys the engine reads by convention rather than from a template.
pub mod keys {
    pub const INCOME_MONTH: &str = "incomeMonth";
    pub const START_DATE: &str = "startDate";
    pub const DURATION: &str = "duration";
    pub const CONTRACT_MONTHS: &str = "contractMonths";
    pub const CERTAINTY_PERCENTAGE: &str = "certaintyPercentage";

    /// Context keys a formula may reference without a matching field definition.
    pub const CONTEXT_KEYS: [&str; 5] = [
        INCOME_MONTH,
        START_DATE,
        DURATION,
        CONTRACT_MONTHS,
        CERTAINTY_PERCENTAGE,
    ];

    pub fn frequency_key(cost_id: &str) -> String {
        format!("{}Frequency", cost_id)
    }

    pub fn label_key(cost_id: &str) -> String {
        format!("{}Label", cost_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    #[default]
    #[schemars(description = "Selectable for new deals and resolvable for existing ones")]
    Active,

    #[schemars(description = "Hidden from new deals but still resolvable so existing deals keep computing")]
    Archived,

    #[schemars(description = "Soft-deleted: resolves as not found")]
    Deleted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Currency,
    #[schemars(description = "Stored as 0-100, rendered with a trailing %")]
    Percentage,
    #[schemars(description = "Chosen from an option list referenced by listKey")]
    Select,
    Date,
    Text,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Currency | Self::Percentage)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionType {
    #[default]
    #[schemars(description = "Whole amount lands in the income month (or start month)")]
    OnceOff,

    #[schemars(description = "Amount split evenly over the 12 financial-year months")]
    Annual,

    #[schemars(
        description = "Amount amortized over the contract duration, starting at the start date"
    )]
    Monthly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CostType {
    Currency,
    Percentage,
}

/// A raw value captured by a form. Numbers arrive as JSON numbers or as strings typed by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
    /// JSON `null`; behaves like a blank entry.
    Null,
}

impl FieldValue {
    /// Strict numeric reading: `None` for blank or non-numeric text and non-finite numbers.
    pub fn parse_number(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Null => return None,
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok()?
            }
        };
        value.is_finite().then_some(value)
    }

    /// Lenient numeric coercion used by every calculation: anything unreadable is 0.
    pub fn as_number(&self) -> f64 {
        self.parse_number().unwrap_or(0.0)
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => s.clone(),
            Self::Null => String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Null => true,
            _ => false,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Caller-owned map of field id (or cost id, or `<costId>Frequency`) to raw value.
pub type FieldValues = BTreeMap<String, FieldValue>;

pub fn numeric_value(values: &FieldValues, key: &str) -> f64 {
    values.get(key).map(FieldValue::as_number).unwrap_or(0.0)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    #[schemars(
        description = "Variable name used verbatim in formula expressions. Must match [A-Za-z_][A-Za-z0-9_]*"
    )]
    pub id: String,

    #[schemars(description = "Display label")]
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Typed default used when neither the product nor the user supplies a value")]
    pub default: Option<FieldValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Option list key for select fields")]
    pub list_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostFieldDef {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub cost_type: CostType,

    #[serde(default)]
    #[schemars(
        description = "If true the stored value is a 0-100 percentage of the income total, not a currency amount"
    )]
    pub is_percentage: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Base of a percentage cost. Only 'totalAmount' is supported")]
    pub percentage_of: Option<String>,

    #[serde(default)]
    pub has_frequency: bool,

    #[serde(default)]
    #[schemars(
        description = "Allowed frequency tags: monthly, with-income, end-of-program, once-off"
    )]
    pub frequency_options: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Allows a free-text name for the line item via '<id>Label'")]
    pub has_custom_label: bool,
}

pub const PERCENTAGE_OF_TOTAL_AMOUNT: &str = "totalAmount";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FormulaDef {
    #[schemars(description = "Arithmetic over field ids using + - * / and parentheses")]
    Simple { expression: String },

    #[schemars(description = "Named calculator from the fixed calculator registry")]
    Custom {
        #[serde(rename = "customCalculatorId")]
        custom_calculator_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct OptionItem {
    pub id: String,
    pub name: String,
    pub value: FieldValue,
}

pub type OptionList = Vec<OptionItem>;

/// A template as authored. Inheritable parts are optional and fall back to the
/// `inheritsFrom` parent when absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalculationTemplate {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub status: TemplateStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Id of a base template supplying any part left out here")]
    pub inherits_from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDef>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_fields: Option<Vec<CostFieldDef>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<FormulaDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_type: Option<DistributionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_certainty_percentage: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_contract_duration: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_payment_frequency: Option<bool>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(description = "Fixed option lists, not editable per tenant")]
    pub system_lists: BTreeMap<String, OptionList>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(description = "Default option lists a tenant or product may override")]
    pub default_custom_lists: BTreeMap<String, OptionList>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl CalculationTemplate {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(CalculationTemplate)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// A template with its whole `inheritsFrom` chain folded in. Calculations only ever see this.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub status: TemplateStatus,
    /// Template ids from this template up to the root of its chain.
    pub lineage: Vec<String>,
    pub fields: Vec<FieldDef>,
    pub cost_fields: Vec<CostFieldDef>,
    pub formula: FormulaDef,
    pub distribution_type: DistributionType,
    pub has_certainty_percentage: bool,
    pub has_contract_duration: bool,
    pub has_payment_frequency: bool,
    pub system_lists: BTreeMap<String, OptionList>,
    pub default_custom_lists: BTreeMap<String, OptionList>,
}

impl EffectiveTemplate {
    pub fn field(&self, id: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn cost_field(&self, id: &str) -> Option<&CostFieldDef> {
        self.cost_fields.iter().find(|c| c.id == id)
    }

    /// Field defaults as a value map, the lowest-precedence layer of a calculation.
    pub fn field_defaults(&self) -> FieldValues {
        self.fields
            .iter()
            .filter_map(|f| f.default.clone().map(|d| (f.id.clone(), d)))
            .collect()
    }
}
