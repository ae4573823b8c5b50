use crate::error::{CalculationError, Result};
use crate::utils::{add_months, last_day_of_month, month_key};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MONTHS_IN_YEAR: u32 = 12;

/// Tenant financial-year settings. `start_month` is 0-based (0 = January).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialYearInfo {
    #[schemars(description = "First month of the financial year, 0 = January ... 11 = December")]
    pub start_month: u32,

    #[schemars(description = "Calendar year in which the financial year starts")]
    pub start_year: i32,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

fn default_currency_symbol() -> String {
    "R".to_string()
}

pub fn validate_start_month(month: u32) -> Result<()> {
    if month >= MONTHS_IN_YEAR {
        return Err(CalculationError::InvalidStartMonth(month));
    }
    Ok(())
}

impl FinancialYearInfo {
    pub fn new(start_month: u32, start_year: i32) -> Result<Self> {
        validate_start_month(start_month)?;
        Ok(Self {
            start_month,
            start_year,
            currency_symbol: default_currency_symbol(),
        })
    }

    pub fn with_currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.currency_symbol = symbol.into();
        self
    }

    /// The financial year that `date` falls in, for a year starting at `start_month`.
    pub fn containing(date: NaiveDate, start_month: u32) -> Result<Self> {
        validate_start_month(start_month)?;
        // Months before the start month belong to the year that began last calendar year
        let start_year = if date.month0() >= start_month {
            date.year()
        } else {
            date.year() - 1
        };
        Self::new(start_month, start_year)
    }

    pub fn start_date(&self) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(self.start_year, self.start_month + 1, 1).ok_or_else(|| {
            CalculationError::DateError(format!(
                "Invalid financial year start: month {} of {}",
                self.start_month, self.start_year
            ))
        })
    }

    pub fn end_date(&self) -> Result<NaiveDate> {
        let last_month = add_months(self.start_date()?, MONTHS_IN_YEAR - 1).ok_or_else(|| {
            CalculationError::DateError("Financial year end out of range".to_string())
        })?;
        last_day_of_month(last_month.year(), last_month.month())
    }

    /// First day of each of the 12 months, in financial-year order.
    pub fn month_starts(&self) -> Result<Vec<NaiveDate>> {
        let start = self.start_date()?;
        (0..MONTHS_IN_YEAR)
            .map(|i| {
                add_months(start, i).ok_or_else(|| {
                    CalculationError::DateError(format!(
                        "Month {} of financial year {} out of range",
                        i, self.start_year
                    ))
                })
            })
            .collect()
    }

    pub fn month_keys(&self) -> Result<Vec<String>> {
        Ok(self.month_starts()?.into_iter().map(month_key).collect())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match (self.start_date(), self.end_date()) {
            (Ok(start), Ok(end)) => date >= start && date <= end,
            _ => false,
        }
    }
}
