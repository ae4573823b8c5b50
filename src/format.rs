use crate::schema::{FieldType, FieldValue};
use crate::settings::Locale;
use crate::utils::{parse_date_input, parse_month_input, round_to};
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;

/// Rendered in place of a missing or unreadable value.
pub const EMPTY_DISPLAY: &str = "-";

const NUMBER_DECIMALS: usize = 3;
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

fn group_thousands(digits: &str, separator: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3 * separator.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

/// Up to `max_decimals` places with trailing zeros dropped, grouped per the locale.
pub fn format_decimal(value: f64, max_decimals: usize, locale: &Locale) -> String {
    let rounded = round_to(value, max_decimals as u32);
    let text = format!("{:.*}", max_decimals, rounded.abs());
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction.trim_end_matches('0')),
        None => (text.as_str(), ""),
    };

    let mut out = String::new();
    if rounded < 0.0 {
        out.push('-');
    }
    out.push_str(&group_thousands(whole, &locale.thousands_separator));
    if !fraction.is_empty() {
        out.push_str(&locale.decimal_separator);
        out.push_str(fraction);
    }
    out
}

pub fn format_currency(value: f64, locale: &Locale) -> String {
    let amount = format_decimal(value.abs(), 0, locale);
    let sign = if round_to(value, 0) < 0.0 { "-" } else { "" };
    let space = if locale.space_after_symbol { " " } else { "" };
    format!("{}{}{}{}", sign, locale.currency_symbol, space, amount)
}

pub fn format_date(date: NaiveDate, locale: &Locale) -> String {
    let pattern_ok = !StrftimeItems::new(&locale.date_format).any(|item| matches!(item, Item::Error));
    let pattern = if pattern_ok {
        locale.date_format.as_str()
    } else {
        ISO_DATE_FORMAT
    };
    date.format(pattern).to_string()
}

/// Display string for a form value. Anything missing, blank or unreadable for its type
/// renders as `-`.
pub fn format_field_value(field_type: FieldType, value: Option<&FieldValue>, locale: &Locale) -> String {
    let Some(value) = value.filter(|v| !v.is_blank()) else {
        return EMPTY_DISPLAY.to_string();
    };

    // Scaling for rounding overflows near f64::MAX
    let number = || {
        value
            .parse_number()
            .filter(|n| round_to(*n, NUMBER_DECIMALS as u32).is_finite())
    };

    let rendered = match field_type {
        FieldType::Currency => number().map(|n| format_currency(n, locale)),
        FieldType::Percentage => {
            number().map(|n| format!("{}%", format_decimal(n, NUMBER_DECIMALS, locale)))
        }
        FieldType::Number => number().map(|n| format_decimal(n, NUMBER_DECIMALS, locale)),
        FieldType::Date => parse_date_input(value)
            .or_else(|| parse_month_input(value))
            .map(|d| format_date(d, locale)),
        FieldType::Select | FieldType::Text => Some(value.as_text()),
    };

    rendered.unwrap_or_else(|| EMPTY_DISPLAY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn za(field_type: FieldType, value: impl Into<FieldValue>) -> String {
        format_field_value(field_type, Some(&value.into()), &Locale::en_za())
    }

    fn us(field_type: FieldType, value: impl Into<FieldValue>) -> String {
        format_field_value(field_type, Some(&value.into()), &Locale::en_us())
    }

    #[test]
    fn test_currency() {
        assert_eq!(za(FieldType::Currency, 420000.0), "R 420 000");
        assert_eq!(us(FieldType::Currency, 420000.0), "$420,000");
        assert_eq!(za(FieldType::Currency, 1234.56), "R 1 235");
        assert_eq!(za(FieldType::Currency, "999"), "R 999");
        assert_eq!(za(FieldType::Currency, -1500.0), "-R 1 500");
        assert_eq!(za(FieldType::Currency, 0.0), "R 0");
    }

    #[test]
    fn test_numbers_and_percentages() {
        assert_eq!(za(FieldType::Number, 1234567.891), "1 234 567,891");
        assert_eq!(us(FieldType::Number, 1234567.891), "1,234,567.891");
        assert_eq!(us(FieldType::Number, 2.5), "2.5");
        assert_eq!(us(FieldType::Number, 15.0), "15");
        assert_eq!(za(FieldType::Percentage, 83.3), "83,3%");
        assert_eq!(us(FieldType::Percentage, 10.0), "10%");
    }

    #[test]
    fn test_dates() {
        assert_eq!(za(FieldType::Date, "2024-04-01"), "2024/04/01");
        assert_eq!(us(FieldType::Date, "2024-04-01"), "04/01/2024");
        assert_eq!(za(FieldType::Date, "mar2025"), "2025/03/01");
        assert_eq!(za(FieldType::Date, "tomorrow"), "-");

        let mut broken = Locale::en_za();
        broken.date_format = "%Q".to_string();
        let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert_eq!(format_date(date, &broken), "2024-04-01");
    }

    #[test]
    fn test_missing_and_unreadable() {
        let locale = Locale::en_za();
        assert_eq!(format_field_value(FieldType::Currency, None, &locale), "-");
        assert_eq!(za(FieldType::Number, "   "), "-");
        assert_eq!(za(FieldType::Currency, "abc"), "-");
        assert_eq!(za(FieldType::Text, ""), "-");
        assert_eq!(za(FieldType::Number, 1.0e306), "-");
        assert_eq!(za(FieldType::Percentage, -1.0e306), "-");
        assert_eq!(za(FieldType::Currency, f64::MAX), "-");
    }

    #[test]
    fn test_text_and_select_pass_through() {
        assert_eq!(za(FieldType::Text, "Cohort A"), "Cohort A");
        assert_eq!(za(FieldType::Select, "nqf4"), "nqf4");
    }
}
