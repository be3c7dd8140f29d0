use std::str::FromStr;

use serde::Deserialize;

/// Reading value as reported by the API: either a plain number, or a numeric
/// string that may carry stray characters (units, separators).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("cannot parse `{raw}` as a meter value")]
pub struct ParseError {
    pub raw: String,
}

impl RawValue {
    /// Normalize into a finite float.
    ///
    /// Strings are trimmed and stripped of every character that is not a
    /// digit, a decimal point, or a minus sign, then parsed. An empty result
    /// after stripping, an unparseable remainder, or NaN all fail.
    pub fn parse(&self) -> Result<f64, ParseError> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => {
                let cleaned: String = text
                    .trim()
                    .chars()
                    .filter(|char| char.is_ascii_digit() || *char == '.' || *char == '-')
                    .collect();
                if cleaned.is_empty() {
                    return Err(self.to_error());
                }
                f64::from_str(&cleaned).map_err(|_| self.to_error())?
            }
        };
        if value.is_nan() { Err(self.to_error()) } else { Ok(value) }
    }

    fn to_error(&self) -> ParseError {
        let raw = match self {
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        };
        ParseError { raw }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_parse_number_ok() {
        assert_abs_diff_eq!(RawValue::Number(42.5).parse().unwrap(), 42.5);
    }

    #[test]
    fn test_parse_plain_string_ok() {
        assert_abs_diff_eq!(RawValue::Text("1000.5".to_string()).parse().unwrap(), 1000.5);
    }

    #[test]
    fn test_parse_strips_stray_characters() {
        // The thousands separator gets stripped too, that is the documented rule.
        assert_abs_diff_eq!(RawValue::Text("1,234.5 kWh".to_string()).parse().unwrap(), 1234.5);
    }

    #[test]
    fn test_parse_negative_ok() {
        assert_abs_diff_eq!(RawValue::Text(" -3.25 ".to_string()).parse().unwrap(), -3.25);
    }

    #[test]
    fn test_parse_non_numeric_fails() {
        assert!(RawValue::Text("abc".to_string()).parse().is_err());
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!(RawValue::Text("   ".to_string()).parse().is_err());
    }

    #[test]
    fn test_parse_nan_fails() {
        assert!(RawValue::Number(f64::NAN).parse().is_err());
    }
}
