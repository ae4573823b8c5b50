use crate::error::{CalculationError, Result};
use crate::schema::FieldValue;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate};

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Rounds half away from zero at `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub fn round_currency(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn round_percentage(value: f64) -> f64 {
    round_to(value, 1)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.checked_add_months(Months::new(1)))
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .ok_or_else(|| {
            CalculationError::DateError(format!("No such month: {:04}-{:02}", year, month))
        })
}

/// First day of the month `offset` months after `date`'s month.
pub fn add_months(date: NaiveDate, offset: u32) -> Option<NaiveDate> {
    first_of_month(date).checked_add_months(Months::new(offset))
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// Key of the form `mar2025` for the month containing `date`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{}{:04}", MONTH_ABBREVIATIONS[date.month0() as usize], date.year())
}

/// Parses a `mar2025` style key back to the first of that month.
pub fn parse_month_key(key: &str) -> Option<NaiveDate> {
    let key = key.trim().to_ascii_lowercase();
    if key.len() != 7 || !key.is_char_boundary(3) {
        return None;
    }
    let (abbr, year) = key.split_at(3);
    let month0 = MONTH_ABBREVIATIONS.iter().position(|m| *m == abbr)?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month0 as u32 + 1, 1)
}

/// Reads a month from a form value. Accepts `YYYY-MM-DD`, RFC 3339 date-times,
/// `YYYY-MM` and month keys. Returns the first day of that month.
pub fn parse_month_input(value: &FieldValue) -> Option<NaiveDate> {
    let text = match value {
        FieldValue::Text(s) => s.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(first_of_month(date));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(first_of_month(dt.date_naive()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d") {
        return Some(date);
    }
    parse_month_key(text)
}

/// Reads a calendar date (not just a month) from a form value.
pub fn parse_date_input(value: &FieldValue) -> Option<NaiveDate> {
    let text = match value {
        FieldValue::Text(s) => s.trim(),
        _ => return None,
    };
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_to(2.345, 1), 2.3);
        assert_eq!(round_to(2.35, 1), 2.4);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_currency(35000.004), 35000.0);
        assert_eq!(round_percentage(83.333_333), 83.3);
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 12).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
        assert!(last_day_of_month(2023, 13).is_err());
    }

    #[test]
    fn test_add_months_wraps_year() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
        assert_eq!(
            add_months(date, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
        );
        assert_eq!(
            add_months(date, 0).unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
        );
    }

    #[test]
    fn test_months_between() {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(months_between(start, end), 11);
        assert_eq!(months_between(end, start), -11);
    }

    #[test]
    fn test_month_key_round_trip() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap();
        assert_eq!(month_key(date), "mar2025");
        assert_eq!(
            parse_month_key("mar2025"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        );
        assert_eq!(parse_month_key("Dec2024").map(|d| d.month()), Some(12));
        assert_eq!(parse_month_key("xyz2025"), None);
        assert_eq!(parse_month_key("mar25"), None);
    }

    #[test]
    fn test_parse_month_input_formats() {
        let april = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert_eq!(parse_month_input(&FieldValue::from("2024-04-18")), Some(april));
        assert_eq!(parse_month_input(&FieldValue::from("2024-04")), Some(april));
        assert_eq!(parse_month_input(&FieldValue::from("apr2024")), Some(april));
        assert_eq!(
            parse_month_input(&FieldValue::from("2024-04-30T22:00:00+00:00")),
            Some(april)
        );
        assert_eq!(parse_month_input(&FieldValue::from("")), None);
        assert_eq!(parse_month_input(&FieldValue::from("soon")), None);
        assert_eq!(parse_month_input(&FieldValue::Number(4.0)), None);
    }
}
