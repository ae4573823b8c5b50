use crate::calendar::FinancialYearInfo;
use crate::error::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Locale {
    #[schemars(description = "Grouping separator for thousands, e.g. ' ' for en-ZA or ',' for en-US")]
    pub thousands_separator: String,

    pub decimal_separator: String,

    pub currency_symbol: String,

    #[schemars(description = "Whether a space separates the currency symbol from the amount")]
    pub space_after_symbol: bool,

    #[schemars(description = "chrono strftime pattern used to render date fields")]
    pub date_format: String,
}

impl Locale {
    pub fn en_za() -> Self {
        Self {
            thousands_separator: " ".to_string(),
            decimal_separator: ",".to_string(),
            currency_symbol: "R".to_string(),
            space_after_symbol: true,
            date_format: "%Y/%m/%d".to_string(),
        }
    }

    pub fn en_us() -> Self {
        Self {
            thousands_separator: ",".to_string(),
            decimal_separator: ".".to_string(),
            currency_symbol: "$".to_string(),
            space_after_symbol: false,
            date_format: "%m/%d/%Y".to_string(),
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::en_za()
    }
}

/// Engine-wide knobs. Every field has a default so a partial JSON document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub locale: Locale,

    #[schemars(description = "Longest inheritsFrom chain resolved before giving up")]
    pub max_inheritance_depth: usize,

    #[schemars(description = "Contract length in months when neither duration nor contractMonths is set")]
    pub default_duration_months: u32,

    pub default_certainty_percentage: f64,

    #[schemars(description = "Financial year start month (0-based) for tenants without settings")]
    pub default_start_month: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            max_inheritance_depth: 8,
            default_duration_months: 12,
            default_certainty_percentage: 100.0,
            default_start_month: 2,
        }
    }
}

impl EngineSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Tenant settings collaborator.
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when the tenant has not configured a financial year.
    fn financial_year_info(&self, tenant_id: &str) -> Result<Option<FinancialYearInfo>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySettingsStore {
    tenants: BTreeMap<String, FinancialYearInfo>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>, info: FinancialYearInfo) -> Self {
        self.tenants.insert(tenant_id.into(), info);
        self
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn financial_year_info(&self, tenant_id: &str) -> Result<Option<FinancialYearInfo>> {
        Ok(self.tenants.get(tenant_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings =
            EngineSettings::from_json_str(r#"{"maxInheritanceDepth": 3, "locale": {"currencySymbol": "$"}}"#)
                .unwrap();
        assert_eq!(settings.max_inheritance_depth, 3);
        assert_eq!(settings.default_duration_months, 12);
        assert_eq!(settings.locale.currency_symbol, "$");
        assert_eq!(settings.locale.thousands_separator, " ");
    }

    #[test]
    fn test_invalid_settings_json() {
        assert!(EngineSettings::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_in_memory_settings_store() {
        let store = InMemorySettingsStore::new()
            .with_tenant("acme", FinancialYearInfo::new(2, 2025).unwrap());
        assert_eq!(
            store.financial_year_info("acme").unwrap().unwrap().start_month,
            2
        );
        assert!(store.financial_year_info("other").unwrap().is_none());
    }
}
