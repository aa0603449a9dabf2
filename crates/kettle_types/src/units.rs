//! Unit conversion for mirrored components
//!
//! The table is symmetric: registering `C -> F` also provides `F -> C`.
//! Results are rounded to 8 significant digits so that a round trip lands
//! back on the original reading.

use crate::error::ConversionError;
use crate::value::Value;

/// Significant digits kept by every conversion
pub const SIGNIFICANT_DIGITS: i32 = 8;

struct Conversion {
    from: &'static str,
    to: &'static str,
    forward: fn(f64) -> f64,
    reverse: fn(f64) -> f64,
}

const CONVERSIONS: &[Conversion] = &[Conversion {
    from: "C",
    to: "F",
    forward: |c| c * 9.0 / 5.0 + 32.0,
    reverse: |f| (f - 32.0) * 5.0 / 9.0,
}];

/// Canonical spelling of a unit tag (`°C`, `degC` -> `C`)
pub fn normalize_units(units: &str) -> &str {
    match units.trim() {
        "°C" | "degC" | "celsius" => "C",
        "°F" | "degF" | "fahrenheit" => "F",
        other => other,
    }
}

fn lookup(from: &str, to: &str) -> Option<fn(f64) -> f64> {
    CONVERSIONS.iter().find_map(|c| {
        if c.from == from && c.to == to {
            Some(c.forward)
        } else if c.from == to && c.to == from {
            Some(c.reverse)
        } else {
            None
        }
    })
}

/// Check whether values can be converted between two unit tags
pub fn can_convert(from: &str, to: &str) -> bool {
    let (from, to) = (normalize_units(from), normalize_units(to));
    from.is_empty() || to.is_empty() || from == to || lookup(from, to).is_some()
}

/// Convert a value between unit tags.
///
/// Converting to or from the empty unit, or between identical units, is the
/// identity. Non-numeric values pass through any registered pair unchanged.
pub fn convert_value(value: &Value, from: &str, to: &str) -> Result<Value, ConversionError> {
    let (from_n, to_n) = (normalize_units(from), normalize_units(to));
    if from_n.is_empty() || to_n.is_empty() || from_n == to_n {
        return Ok(value.clone());
    }

    let convert = lookup(from_n, to_n).ok_or_else(|| ConversionError {
        from: from.to_string(),
        to: to.to_string(),
    })?;

    Ok(match value {
        Value::Number(n) => Value::Number(round_significant(convert(*n), SIGNIFICANT_DIGITS)),
        other => other.clone(),
    })
}

/// Round to `digits` significant digits
pub fn round_significant(x: f64, digits: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let scale = digits - 1 - magnitude;
    if scale >= 0 {
        let factor = 10f64.powi(scale);
        (x * factor).round() / factor
    } else {
        let factor = 10f64.powi(-scale);
        (x / factor).round() * factor
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: Value) -> f64 {
        v.as_f64().unwrap()
    }

    #[test]
    fn test_celsius_fahrenheit() {
        assert_eq!(num(convert_value(&Value::from(100.0), "C", "F").unwrap()), 212.0);
        assert_eq!(num(convert_value(&Value::from(32.0), "F", "C").unwrap()), 0.0);
        assert_eq!(num(convert_value(&Value::from(-40.0), "°C", "°F").unwrap()), -40.0);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        for reading in [0.1_f64, 21.37, 78.3, -12.345678, 1234.5678] {
            let f = convert_value(&Value::from(reading), "C", "F").unwrap();
            let back = num(convert_value(&f, "F", "C").unwrap());
            let tolerance = reading.abs().max(1.0) * 1e-7;
            assert!((back - reading).abs() <= tolerance, "{} -> {}", reading, back);
        }
    }

    #[test]
    fn test_identity_conversions() {
        let v = Value::from(42.0);
        assert_eq!(convert_value(&v, "C", "C").unwrap(), v);
        assert_eq!(convert_value(&v, "", "F").unwrap(), v);
        assert_eq!(convert_value(&v, "%", "").unwrap(), v);
    }

    #[test]
    fn test_unregistered_pair_errors() {
        let err = convert_value(&Value::from(1.0), "C", "%").unwrap_err();
        assert_eq!(err.from, "C");
        assert_eq!(err.to, "%");
        assert!(!can_convert("hPa", "F"));
        assert!(can_convert("F", "C"));
    }

    #[test]
    fn test_round_significant() {
        assert_eq!(round_significant(1.234567891, 8), 1.2345679);
        assert_eq!(round_significant(123456789.0, 8), 123456790.0);
        assert_eq!(round_significant(0.0, 8), 0.0);
    }
}
