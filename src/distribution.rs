use crate::calendar::FinancialYearInfo;
use crate::costs::{CostBreakdown, CostFrequency};
use crate::error::Result;
use crate::schema::{keys, DistributionType, FieldValue, FieldValues};
use crate::utils::{add_months, first_of_month, month_key, months_between, parse_month_input, parse_month_key, round_currency};
use chrono::{Local, NaiveDate};
use log::{debug, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

pub const DEFAULT_DURATION_MONTHS: u32 = 12;
pub const DEFAULT_CERTAINTY_PERCENTAGE: f64 = 100.0;

/// One financial year of amounts. Keys are the first day of each month; externally each
/// month is addressed by its `mar2025` style key. Always holds exactly the 12 months of
/// the year it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyDistribution {
    months: BTreeMap<NaiveDate, f64>,
}

impl MonthlyDistribution {
    /// All twelve months of `fy`, zeroed.
    pub fn for_financial_year(fy: &FinancialYearInfo) -> Result<Self> {
        Ok(Self {
            months: fy.month_starts()?.into_iter().map(|d| (d, 0.0)).collect(),
        })
    }

    /// Adds `amount` to the month containing `month`. Months outside the year are dropped;
    /// returns whether anything was credited.
    pub fn credit(&mut self, month: NaiveDate, amount: f64) -> bool {
        match self.months.get_mut(&first_of_month(month)) {
            Some(slot) => {
                *slot += amount;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        parse_month_key(key).and_then(|d| self.value_for(d))
    }

    pub fn value_for(&self, month: NaiveDate) -> Option<f64> {
        self.months.get(&first_of_month(month)).copied()
    }

    pub fn keys(&self) -> Vec<String> {
        self.months.keys().copied().map(month_key).collect()
    }

    /// `(key, amount)` pairs in financial-year order.
    pub fn iter(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.months.iter().map(|(d, v)| (month_key(*d), *v))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.months.values().copied()
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn total(&self) -> f64 {
        round_currency(self.months.values().sum())
    }

    /// Key-by-key `self - other`, rounded. Months missing from `other` count as 0.
    pub fn net(&self, other: &MonthlyDistribution) -> MonthlyDistribution {
        let months = self
            .months
            .iter()
            .map(|(d, v)| {
                let deduction = other.months.get(d).copied().unwrap_or(0.0);
                (*d, round_currency(v - deduction))
            })
            .collect();
        MonthlyDistribution { months }
    }

    fn rounded(mut self) -> Self {
        for value in self.months.values_mut() {
            *value = round_currency(*value);
        }
        self
    }

    fn first_month(&self) -> Option<NaiveDate> {
        self.months.keys().next().copied()
    }

    fn last_month(&self) -> Option<NaiveDate> {
        self.months.keys().next_back().copied()
    }
}

impl Serialize for MonthlyDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.months.len()))?;
        for (date, value) in &self.months {
            map.serialize_entry(&month_key(*date), value)?;
        }
        map.end()
    }
}

/// Cost distribution plus the cost lines it deliberately left out.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostDistribution {
    pub monthly: MonthlyDistribution,
    /// Ids of costs tagged `with-income`. They follow the income curve, which this
    /// distributor does not model, so no month receives them.
    pub unallocated: Vec<String>,
}

/// Spreads amounts over one financial year. The reference date stands in for "now" when a
/// deal has no start date.
#[derive(Debug, Clone)]
pub struct MonthlyDistributor {
    fy: FinancialYearInfo,
    today: NaiveDate,
    default_duration: u32,
}

impl MonthlyDistributor {
    pub fn new(fy: FinancialYearInfo) -> Self {
        Self {
            fy,
            today: Local::now().date_naive(),
            default_duration: DEFAULT_DURATION_MONTHS,
        }
    }

    pub fn with_reference_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_default_duration(mut self, months: u32) -> Self {
        self.default_duration = months.max(1);
        self
    }

    pub fn financial_year(&self) -> &FinancialYearInfo {
        &self.fy
    }

    /// `duration`, else `contractMonths`, else the default. Fractions are truncated and
    /// anything below one month falls back to the default.
    pub fn duration_months(&self, values: &FieldValues) -> u32 {
        [keys::DURATION, keys::CONTRACT_MONTHS]
            .iter()
            .find_map(|key| values.get(*key).and_then(FieldValue::parse_number))
            .map(f64::trunc)
            .filter(|months| *months >= 1.0)
            .map(|months| months.min(f64::from(u32::MAX)) as u32)
            .unwrap_or(self.default_duration)
    }

    pub fn start_month(&self, values: &FieldValues) -> NaiveDate {
        values
            .get(keys::START_DATE)
            .and_then(parse_month_input)
            .unwrap_or_else(|| first_of_month(self.today))
    }

    fn income_month(&self, values: &FieldValues) -> Option<NaiveDate> {
        values
            .get(keys::INCOME_MONTH)
            .and_then(parse_month_input)
            .or_else(|| values.get(keys::START_DATE).and_then(parse_month_input))
    }

    /// Credits `share` to each of `duration` consecutive months from `start`, skipping
    /// straight to the months that can land inside the financial year.
    fn spread(&self, months: &mut MonthlyDistribution, start: NaiveDate, duration: u32, share: f64) {
        let (Some(first), Some(last)) = (months.first_month(), months.last_month()) else {
            return;
        };
        let from = i64::from(months_between(start, first).max(0));
        let to = i64::from(months_between(start, last)).min(i64::from(duration) - 1);
        for offset in from..=to {
            let month = u32::try_from(offset).ok().and_then(|o| add_months(start, o));
            if let Some(month) = month {
                months.credit(month, share);
            }
        }
    }

    pub fn distribute_income(
        &self,
        distribution_type: DistributionType,
        total: f64,
        certainty_percentage: Option<f64>,
        values: &FieldValues,
    ) -> Result<MonthlyDistribution> {
        let mut months = MonthlyDistribution::for_financial_year(&self.fy)?;
        let certainty = certainty_percentage.unwrap_or(DEFAULT_CERTAINTY_PERCENTAGE);
        let adjusted = total * (certainty / 100.0);

        match distribution_type {
            DistributionType::OnceOff => match self.income_month(values) {
                Some(month) => {
                    if !months.credit(month, round_currency(adjusted)) {
                        debug!("Income month {} falls outside the financial year", month_key(month));
                    }
                }
                None => debug!("No income month or start date; once-off income not placed"),
            },
            DistributionType::Annual => {
                let share = round_currency(adjusted / 12.0);
                for slot in months.months.values_mut() {
                    *slot = share;
                }
            }
            DistributionType::Monthly => {
                let duration = self.duration_months(values);
                let share = round_currency(adjusted / f64::from(duration));
                self.spread(&mut months, self.start_month(values), duration, share);
            }
        }

        Ok(months.rounded())
    }

    pub fn distribute_costs(
        &self,
        costs: &CostBreakdown,
        values: &FieldValues,
    ) -> Result<CostDistribution> {
        let mut months = MonthlyDistribution::for_financial_year(&self.fy)?;
        let mut unallocated = Vec::new();
        let start = self.start_month(values);
        let duration = self.duration_months(values);

        for (id, line) in &costs.costs {
            if line.amount == 0.0 {
                continue;
            }
            match &line.frequency {
                CostFrequency::Monthly => {
                    let share = round_currency(line.amount / f64::from(duration));
                    self.spread(&mut months, start, duration, share);
                }
                CostFrequency::EndOfProgram => {
                    if let Some(month) = add_months(start, duration - 1) {
                        months.credit(month, line.amount);
                    }
                }
                CostFrequency::WithIncome => {
                    warn!("Cost '{}' is tagged with-income and was not distributed", id);
                    unallocated.push(id.clone());
                }
                CostFrequency::OnceOff | CostFrequency::Other(_) => {
                    months.credit(start, line.amount);
                }
            }
        }

        Ok(CostDistribution {
            monthly: months.rounded(),
            unallocated,
        })
    }
}

/// Distributes income using today's date for deals without a start date.
pub fn distribute_income(
    distribution_type: DistributionType,
    total: f64,
    certainty_percentage: Option<f64>,
    values: &FieldValues,
    fy: &FinancialYearInfo,
) -> Result<MonthlyDistribution> {
    MonthlyDistributor::new(fy.clone()).distribute_income(
        distribution_type,
        total,
        certainty_percentage,
        values,
    )
}

pub fn distribute_costs(
    costs: &CostBreakdown,
    values: &FieldValues,
    fy: &FinancialYearInfo,
) -> Result<CostDistribution> {
    MonthlyDistributor::new(fy.clone()).distribute_costs(costs, values)
}
