use serde::{Deserialize, Serialize};
use std::fmt;

/// A JavaScript number literal.
///
/// Formatting follows `Number.prototype.toString()` so printed programs and
/// serialized values agree with what a JavaScript engine would show.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Number(f64);

impl Number {
    pub fn new(value: f64) -> Self {
        Number(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Returns `true` if the number has no fractional part.
    pub fn is_int(&self) -> bool {
        self.0.is_finite() && self.0.fract() == 0.0
    }

    /// Parses a numeric string the way `Number(string)` does.
    ///
    /// Surrounding whitespace is ignored, the empty string is `0` and anything
    /// that is not a complete numeric literal is `NaN`.
    pub fn parse(text: &str) -> Number {
        let text = text.trim();

        if text.is_empty() {
            return Number(0.0);
        }

        let (sign, unsigned) = match text.as_bytes()[0] {
            b'-' => (-1.0, &text[1..]),
            b'+' => (1.0, &text[1..]),
            _ => (1.0, text),
        };

        let radix = match unsigned.get(..2) {
            Some("0x") | Some("0X") => Some(16),
            Some("0o") | Some("0O") => Some(8),
            Some("0b") | Some("0B") => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            if sign < 0.0 || unsigned.len() == 2 {
                return Number(f64::NAN);
            }
            return u64::from_str_radix(&unsigned[2..], radix)
                .map(|n| Number(n as f64))
                .unwrap_or(Number(f64::NAN));
        }

        match unsigned {
            "Infinity" => Number(sign * f64::INFINITY),
            _ if unsigned
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
            {
                unsigned
                    .parse::<f64>()
                    .map(|n| Number(sign * n))
                    .unwrap_or(Number(f64::NAN))
            }
            _ => Number(f64::NAN),
        }
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number(value as f64)
    }
}

impl From<u32> for Number {
    fn from(value: u32) -> Self {
        Number(value as f64)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value as f64)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;

        if value.is_nan() {
            return write!(f, "NaN");
        }
        if value == 0.0 {
            return write!(f, "0");
        }
        if value.is_infinite() {
            return write!(f, "{}", if value > 0.0 { "Infinity" } else { "-Infinity" });
        }
        if value < 0.0 {
            write!(f, "-")?;
        }

        // Shortest round-trip digits and decimal exponent, e.g. "1.25e-7".
        let scientific = format!("{:e}", value.abs());
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
        let digits = mantissa.replace('.', "");
        let k = digits.len() as i32;
        let n = exponent.parse::<i32>().unwrap_or(0) + 1;

        if k <= n && n <= 21 {
            write!(f, "{}{}", digits, "0".repeat((n - k) as usize))
        } else if 0 < n && n <= 21 {
            let (int, frac) = digits.split_at(n as usize);
            write!(f, "{}.{}", int, frac)
        } else if -6 < n && n <= 0 {
            write!(f, "0.{}{}", "0".repeat((-n) as usize), digits)
        } else {
            let sign = if n - 1 < 0 { "-" } else { "+" };
            let (head, tail) = digits.split_at(1);
            if tail.is_empty() {
                write!(f, "{}e{}{}", head, sign, (n - 1).abs())
            } else {
                write!(f, "{}.{}e{}{}", head, tail, sign, (n - 1).abs())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(8.0, "8")]
    #[case(-3.0, "-3")]
    #[case(0.5, "0.5")]
    #[case(-0.0, "0")]
    #[case(0.1 + 0.2, "0.30000000000000004")]
    #[case(123456.789, "123456.789")]
    #[case(1e21, "1e+21")]
    #[case(1.5e22, "1.5e+22")]
    #[case(1e-7, "1e-7")]
    #[case(0.000001, "0.000001")]
    #[case(100.0, "100")]
    #[case(f64::NAN, "NaN")]
    #[case(f64::INFINITY, "Infinity")]
    #[case(f64::NEG_INFINITY, "-Infinity")]
    fn test_display(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(Number::new(value).to_string(), expected);
    }

    #[rstest]
    #[case("42", 42.0)]
    #[case("  -1.5 ", -1.5)]
    #[case("", 0.0)]
    #[case("0x1f", 31.0)]
    #[case("1e3", 1000.0)]
    #[case("-Infinity", f64::NEG_INFINITY)]
    fn test_parse(#[case] text: &str, #[case] expected: f64) {
        assert_eq!(Number::parse(text).value(), expected);
    }

    #[rstest]
    #[case("abc")]
    #[case("12px")]
    #[case("0x")]
    fn test_parse_nan(#[case] text: &str) {
        assert!(Number::parse(text).value().is_nan());
    }

    #[rstest]
    #[case(3.0, true)]
    #[case(3.5, false)]
    #[case(f64::INFINITY, false)]
    fn test_is_int(#[case] value: f64, #[case] expected: bool) {
        assert_eq!(Number::new(value).is_int(), expected);
    }
}
