//! # Sales Calc Engine
//!
//! Template-driven income, cost and gross-profit calculation for sales forecasting, with
//! monthly spreading over a tenant's financial year.
//!
//! ## Core Concepts
//!
//! - **Templates**: a product's input fields, cost lines and income formula. Templates may
//!   inherit parts from a base template through `inheritsFrom`.
//! - **Formulas**: either a small arithmetic expression over field ids or a named calculator
//!   from a fixed registry.
//! - **Costs**: fixed amounts or percentages of income, each tagged with when it is paid.
//! - **Monthly distribution**: once-off, annual or amortised-monthly spreading across the
//!   12 months of a financial year that may start in any month.
//! - **Gross profit**: income less costs, in total and month by month.
//!
//! ## Example
//!
//! ```rust
//! use sales_calc_engine::*;
//!
//! let engine = CalculationEngine::default();
//! let fy = FinancialYearInfo::new(3, 2024).unwrap();
//!
//! let mut fields = FieldValues::new();
//! fields.insert("learnerCount".to_string(), 15.into());
//! fields.insert("costPerLearner".to_string(), 28000.into());
//! fields.insert("startDate".to_string(), "2024-04-01".into());
//!
//! let result = engine
//!     .full_calculation("learnership", &fields, &FieldValues::new(), &fy, None)
//!     .unwrap();
//! assert_eq!(result.income.total, 420000.0);
//! assert_eq!(result.monthly_income.get("apr2024"), Some(35000.0));
//! ```

pub mod calculators;
pub mod calendar;
pub mod costs;
pub mod defaults;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod format;
pub mod formula;
pub mod income;
pub mod options;
pub mod profit;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod utils;
pub mod validation;

pub use calculators::{Breakdown, CalculationOutcome, CalculatorFn, CalculatorRegistry};
pub use calendar::FinancialYearInfo;
pub use costs::{calculate_template_costs, CostBreakdown, CostFrequency, CostLine};
pub use defaults::default_templates;
pub use distribution::{
    distribute_costs, distribute_income, CostDistribution, MonthlyDistribution, MonthlyDistributor,
};
pub use engine::{CalculationEngine, FullCalculation};
pub use error::{CalculationError, Result};
pub use format::format_field_value;
pub use formula::{evaluate, try_evaluate};
pub use income::{calculate_template_total, merge_values, IncomeResult};
pub use options::{
    get_effective_option_list, resolve_option_list, InMemoryOptionStore, OptionListSource,
    OptionListStore,
};
pub use profit::{gross_profit, monthly_gross_profit, GrossProfitSummary};
pub use registry::{StaticTemplateStore, TemplateRegistry, TemplateStore};
pub use schema::*;
pub use settings::{EngineSettings, InMemorySettingsStore, Locale, SettingsStore};
pub use validation::{validate_cost_values, validate_field_values, validate_template, ValidationResult};
