use crate::distribution::MonthlyDistribution;
use crate::utils::{round_currency, round_percentage};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrossProfitSummary {
    pub income: f64,
    pub costs: f64,
    pub gross_profit: f64,
    /// Margin in percent, one decimal. Zero whenever income is not positive.
    pub gp_percentage: f64,
}

pub fn gross_profit(income: f64, costs: f64) -> GrossProfitSummary {
    let income = round_currency(income);
    let costs = round_currency(costs);
    let gross_profit = round_currency(income - costs);
    let gp_percentage = if income > 0.0 {
        round_percentage(gross_profit / income * 100.0)
    } else {
        0.0
    };

    GrossProfitSummary {
        income,
        costs,
        gross_profit,
        gp_percentage,
    }
}

/// Per-month gross profit. Both maps come from the same financial year so keys line up.
pub fn monthly_gross_profit(
    income: &MonthlyDistribution,
    costs: &MonthlyDistribution,
) -> MonthlyDistribution {
    income.net(costs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::FinancialYearInfo;
    use chrono::NaiveDate;

    #[test]
    fn test_gross_profit_margin() {
        let summary = gross_profit(420000.0, 70000.0);
        assert_eq!(summary.gross_profit, 350000.0);
        assert_eq!(summary.gp_percentage, 83.3);
        assert_eq!(summary.income, 420000.0);
        assert_eq!(summary.costs, 70000.0);
    }

    #[test]
    fn test_zero_income_has_zero_margin() {
        for costs in [0.0, 500.0, -250.0] {
            let summary = gross_profit(0.0, costs);
            assert_eq!(summary.gp_percentage, 0.0);
            assert_eq!(summary.gross_profit, -costs);
        }
    }

    #[test]
    fn test_loss_gives_negative_margin() {
        let summary = gross_profit(1000.0, 1500.0);
        assert_eq!(summary.gross_profit, -500.0);
        assert_eq!(summary.gp_percentage, -50.0);
    }

    #[test]
    fn test_rounding() {
        let summary = gross_profit(100.006, 33.333);
        assert_eq!(summary.income, 100.01);
        assert_eq!(summary.costs, 33.33);
        assert_eq!(summary.gross_profit, 66.68);
        assert_eq!(summary.gp_percentage, 66.7);
    }

    #[test]
    fn test_monthly_net() {
        let fy = FinancialYearInfo::new(0, 2025).unwrap();
        let mut income = MonthlyDistribution::for_financial_year(&fy).unwrap();
        let mut costs = MonthlyDistribution::for_financial_year(&fy).unwrap();
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        income.credit(jan, 35000.0);
        costs.credit(jan, 5000.0);

        let gp = monthly_gross_profit(&income, &costs);
        assert_eq!(gp.len(), 12);
        assert_eq!(gp.get("jan2025"), Some(30000.0));
        assert_eq!(gp.get("feb2025"), Some(0.0));
    }
}
