use crate::calculators::CalculatorRegistry;
use crate::calendar::FinancialYearInfo;
use crate::costs::{calculate_template_costs, CostBreakdown};
use crate::distribution::{CostDistribution, MonthlyDistribution, MonthlyDistributor};
use crate::error::Result;
use crate::format::format_field_value;
use crate::income::{calculate_template_total, merge_values, IncomeResult};
use crate::options::{resolve_option_list, OptionListSource, OptionListStore};
use crate::profit::{gross_profit, monthly_gross_profit, GrossProfitSummary};
use crate::registry::TemplateRegistry;
use crate::schema::{keys, DistributionType, EffectiveTemplate, FieldType, FieldValue, FieldValues, OptionList};
use crate::settings::{EngineSettings, SettingsStore};
use crate::validation::{validate_cost_values, validate_field_values, ValidationResult};
use chrono::{Local, NaiveDate};
use log::{debug, info};
use serde::Serialize;

/// Everything one preview needs: totals, the gross-profit summary and the three month maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullCalculation {
    pub income: IncomeResult,
    pub costs: CostBreakdown,
    /// Totals use the unweighted income; only the month maps apply certainty.
    pub gross_profit: GrossProfitSummary,
    pub certainty_percentage: f64,
    pub monthly_income: MonthlyDistribution,
    pub monthly_costs: MonthlyDistribution,
    #[serde(rename = "monthlyGP")]
    pub monthly_gp: MonthlyDistribution,
    /// Cost ids tagged `with-income`, absent from `monthly_costs`.
    pub unallocated_costs: Vec<String>,
}

pub struct CalculationEngine {
    registry: TemplateRegistry,
    calculators: CalculatorRegistry,
    settings: EngineSettings,
    reference_date: Option<NaiveDate>,
}

impl Default for CalculationEngine {
    fn default() -> Self {
        Self::new(
            TemplateRegistry::default(),
            CalculatorRegistry::with_builtins(),
            EngineSettings::default(),
        )
    }
}

impl CalculationEngine {
    pub fn new(
        registry: TemplateRegistry,
        calculators: CalculatorRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry: registry.with_max_depth(settings.max_inheritance_depth),
            calculators,
            settings,
            reference_date: None,
        }
    }

    pub fn from_settings(settings: EngineSettings) -> Self {
        Self::new(
            TemplateRegistry::default(),
            CalculatorRegistry::with_builtins(),
            settings,
        )
    }

    /// Pins "today" for deals without a start date and tenants without a financial year.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn calculators(&self) -> &CalculatorRegistry {
        &self.calculators
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    fn distributor(&self, fy: &FinancialYearInfo) -> MonthlyDistributor {
        MonthlyDistributor::new(fy.clone())
            .with_reference_date(self.today())
            .with_default_duration(self.settings.default_duration_months)
    }

    pub fn get_template(&self, template_id: &str) -> Result<EffectiveTemplate> {
        self.registry.get_template(template_id)
    }

    /// Fails only when the template cannot be resolved; formula problems come back as a
    /// zero total with `error` set.
    pub fn calculate_total(
        &self,
        template_id: &str,
        field_values: &FieldValues,
        product_defaults: Option<&FieldValues>,
    ) -> Result<IncomeResult> {
        let template = self.get_template(template_id)?;
        Ok(calculate_template_total(
            &template,
            &self.calculators,
            field_values,
            product_defaults,
        ))
    }

    pub fn calculate_costs(
        &self,
        template_id: &str,
        cost_values: &FieldValues,
        total_income: f64,
    ) -> Result<CostBreakdown> {
        let template = self.get_template(template_id)?;
        Ok(calculate_template_costs(&template, cost_values, total_income))
    }

    pub fn distribute_income(
        &self,
        distribution_type: DistributionType,
        total: f64,
        certainty_percentage: Option<f64>,
        field_values: &FieldValues,
        fy: &FinancialYearInfo,
    ) -> Result<MonthlyDistribution> {
        let certainty = certainty_percentage.unwrap_or(self.settings.default_certainty_percentage);
        self.distributor(fy)
            .distribute_income(distribution_type, total, Some(certainty), field_values)
    }

    pub fn distribute_costs(
        &self,
        costs: &CostBreakdown,
        field_values: &FieldValues,
        fy: &FinancialYearInfo,
    ) -> Result<CostDistribution> {
        self.distributor(fy).distribute_costs(costs, field_values)
    }

    pub fn gross_profit(&self, income: f64, costs: f64) -> GrossProfitSummary {
        gross_profit(income, costs)
    }

    /// Certainty applied to the month maps, clamped to 0-100. Templates without a
    /// certainty field always use the configured default.
    fn certainty_for(&self, template: &EffectiveTemplate, values: &FieldValues) -> f64 {
        let entered = if template.has_certainty_percentage {
            values
                .get(keys::CERTAINTY_PERCENTAGE)
                .and_then(FieldValue::parse_number)
        } else {
            None
        };
        entered
            .unwrap_or(self.settings.default_certainty_percentage)
            .clamp(0.0, 100.0)
    }

    pub fn full_calculation(
        &self,
        template_id: &str,
        field_values: &FieldValues,
        cost_values: &FieldValues,
        fy: &FinancialYearInfo,
        product_defaults: Option<&FieldValues>,
    ) -> Result<FullCalculation> {
        let template = self.get_template(template_id)?;
        let values = merge_values(&template, field_values, product_defaults);

        let income = calculate_template_total(
            &template,
            &self.calculators,
            field_values,
            product_defaults,
        );
        let costs = calculate_template_costs(&template, cost_values, income.total);
        let summary = gross_profit(income.total, costs.total_cost);
        let certainty = self.certainty_for(&template, &values);

        let distributor = self.distributor(fy);
        let monthly_income = distributor.distribute_income(
            template.distribution_type,
            income.total,
            Some(certainty),
            &values,
        )?;
        let cost_distribution = distributor.distribute_costs(&costs, &values)?;
        let monthly_gp = monthly_gross_profit(&monthly_income, &cost_distribution.monthly);

        info!(
            "Calculated '{}': income {}, costs {}, GP {} ({}%)",
            template.id,
            summary.income,
            summary.costs,
            summary.gross_profit,
            summary.gp_percentage
        );

        Ok(FullCalculation {
            income,
            costs,
            gross_profit: summary,
            certainty_percentage: certainty,
            monthly_income,
            monthly_costs: cost_distribution.monthly,
            monthly_gp,
            unallocated_costs: cost_distribution.unallocated,
        })
    }

    /// The tenant's financial year, or the year containing today with the configured
    /// start month when the tenant has none.
    pub fn financial_year_for(
        &self,
        settings_store: &dyn SettingsStore,
        tenant_id: &str,
    ) -> Result<FinancialYearInfo> {
        match settings_store.financial_year_info(tenant_id)? {
            Some(fy) => Ok(fy),
            None => {
                debug!("Tenant '{}' has no financial year settings, using default", tenant_id);
                FinancialYearInfo::containing(self.today(), self.settings.default_start_month)
            }
        }
    }

    pub fn full_calculation_for_tenant(
        &self,
        settings_store: &dyn SettingsStore,
        tenant_id: &str,
        template_id: &str,
        field_values: &FieldValues,
        cost_values: &FieldValues,
        product_defaults: Option<&FieldValues>,
    ) -> Result<FullCalculation> {
        let fy = self.financial_year_for(settings_store, tenant_id)?;
        self.full_calculation(template_id, field_values, cost_values, &fy, product_defaults)
    }

    /// Never fails; an unresolvable template is reported under `_template`.
    pub fn validate_field_values(&self, template_id: &str, field_values: &FieldValues) -> ValidationResult {
        match self.get_template(template_id) {
            Ok(template) => validate_field_values(&template, field_values),
            Err(e) => ValidationResult::template_error(e.to_string()),
        }
    }

    pub fn validate_cost_values(&self, template_id: &str, cost_values: &FieldValues) -> ValidationResult {
        match self.get_template(template_id) {
            Ok(template) => validate_cost_values(&template, cost_values),
            Err(e) => ValidationResult::template_error(e.to_string()),
        }
    }

    pub fn format_field_value(&self, field_type: FieldType, value: Option<&FieldValue>) -> String {
        format_field_value(field_type, value, &self.settings.locale)
    }

    pub fn effective_option_list(
        &self,
        store: &dyn OptionListStore,
        tenant_id: &str,
        product_id: &str,
        template_id: &str,
        list_key: &str,
    ) -> Result<(OptionList, OptionListSource)> {
        let template = self.get_template(template_id)?;
        Ok(resolve_option_list(store, tenant_id, product_id, list_key, &template))
    }
}
