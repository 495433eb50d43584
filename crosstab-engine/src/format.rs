//! Value formatting: renders cell values to display strings.
//!
//! `format_value` is pure and never fails: any value that does not fit the
//! requested format falls back to its raw string label.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Where the currency symbol sits relative to the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CurrencyPosition {
    #[default]
    Before,
    After,
}

/// Declarative display formatting for dimension labels and measure cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormatSpec {
    /// Fixed decimals with optional thousands grouping and prefix/suffix.
    Number {
        decimal_places: u8,
        #[serde(default)]
        use_thousands_separator: bool,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        suffix: Option<String>,
    },
    /// Currency amount; negatives render in parentheses.
    Currency {
        decimal_places: u8,
        symbol: String,
        #[serde(default)]
        symbol_position: CurrencyPosition,
    },
    /// Multiplies by 100 and appends '%'.
    Percentage { decimal_places: u8 },
    /// Date pattern built from YYYY / YY / MM / DD placeholders.
    Date { pattern: String },
}

/// Formats a value for display. Mismatched input (text under a numeric
/// format, an unparseable date) yields the raw value stringified.
pub fn format_value(value: &Value, spec: &FormatSpec) -> String {
    match spec {
        FormatSpec::Number {
            decimal_places,
            use_thousands_separator,
            prefix,
            suffix,
        } => match value.as_number() {
            Some(n) => {
                let body = format_decimal(n, *decimal_places, *use_thousands_separator);
                format!(
                    "{}{}{}",
                    prefix.as_deref().unwrap_or(""),
                    body,
                    suffix.as_deref().unwrap_or("")
                )
            }
            None => value.label(),
        },
        FormatSpec::Currency {
            decimal_places,
            symbol,
            symbol_position,
        } => match value.as_number() {
            Some(n) => format_currency(n, *decimal_places, symbol, *symbol_position),
            None => value.label(),
        },
        FormatSpec::Percentage { decimal_places } => match value.as_number() {
            Some(n) => format_percentage(n, *decimal_places),
            None => value.label(),
        },
        FormatSpec::Date { pattern } => match value.as_date() {
            Some(d) => {
                use chrono::Datelike;
                pattern
                    .replace("YYYY", &format!("{:04}", d.year()))
                    .replace("YY", &format!("{:02}", d.year() % 100))
                    .replace("MM", &format!("{:02}", d.month()))
                    .replace("DD", &format!("{:02}", d.day()))
            }
            None => value.label(),
        },
    }
}

/// Format a number with specified decimal places and optional thousands separator.
fn format_decimal(value: f64, decimal_places: u8, use_thousands_separator: bool) -> String {
    let rounded = format!("{:.prec$}", value, prec = decimal_places as usize);

    if use_thousands_separator {
        add_thousands_separator(&rounded)
    } else {
        rounded
    }
}

/// Add thousands separators to a numeric string.
fn add_thousands_separator(s: &str) -> String {
    let parts: Vec<&str> = s.split('.').collect();
    let integer_part = parts[0];
    let decimal_part = parts.get(1);

    let negative = integer_part.starts_with('-');
    let digits: String = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut result = String::new();
    let len = digits.len();

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    if negative {
        result = format!("-{}", result);
    }

    if let Some(decimal) = decimal_part {
        result.push('.');
        result.push_str(decimal);
    }

    result
}

/// Format a number as currency.
fn format_currency(
    value: f64,
    decimal_places: u8,
    symbol: &str,
    position: CurrencyPosition,
) -> String {
    let formatted =
        add_thousands_separator(&format!("{:.prec$}", value.abs(), prec = decimal_places as usize));

    let with_symbol = match position {
        CurrencyPosition::Before => format!("{}{}", symbol, formatted),
        CurrencyPosition::After => format!("{}{}", formatted, symbol),
    };

    if value < 0.0 {
        format!("({})", with_symbol)
    } else {
        with_symbol
    }
}

/// Format a number as percentage.
fn format_percentage(value: f64, decimal_places: u8) -> String {
    let percentage = value * 100.0;
    format!("{:.prec$}%", percentage, prec = decimal_places as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(1234.567, 2, false), "1234.57");
        assert_eq!(format_decimal(1234.567, 2, true), "1,234.57");
        assert_eq!(format_decimal(1000000.0, 0, true), "1,000,000");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(
            format_currency(1234.56, 2, "$", CurrencyPosition::Before),
            "$1,234.56"
        );
        assert_eq!(
            format_currency(-1234.56, 2, "$", CurrencyPosition::Before),
            "($1,234.56)"
        );
        assert_eq!(
            format_currency(1234.56, 2, " kr", CurrencyPosition::After),
            "1,234.56 kr"
        );
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.5, 0), "50%");
        assert_eq!(format_percentage(0.1234, 2), "12.34%");
    }

    #[test]
    fn test_thousands_separator() {
        assert_eq!(add_thousands_separator("1234567"), "1,234,567");
        assert_eq!(add_thousands_separator("123"), "123");
        assert_eq!(add_thousands_separator("-1234.56"), "-1,234.56");
    }

    #[test]
    fn number_format_with_prefix_and_suffix() {
        let spec = FormatSpec::Number {
            decimal_places: 1,
            use_thousands_separator: true,
            prefix: Some("~".to_string()),
            suffix: Some(" units".to_string()),
        };
        assert_eq!(format_value(&Value::number(1234.56), &spec), "~1,234.6 units");
    }

    #[test]
    fn date_pattern_replacement() {
        let spec = FormatSpec::Date {
            pattern: "DD/MM/YYYY".to_string(),
        };
        let date = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(format_value(&date, &spec), "05/03/2024");
    }

    #[test]
    fn mismatched_value_falls_back_to_raw_label() {
        let spec = FormatSpec::Percentage { decimal_places: 2 };
        assert_eq!(format_value(&Value::text("n/a"), &spec), "n/a");

        let date_spec = FormatSpec::Date {
            pattern: "YYYY-MM-DD".to_string(),
        };
        assert_eq!(format_value(&Value::text("not a date"), &date_spec), "not a date");
    }
}
