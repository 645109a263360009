use serde_json::{Number, Value};

use crate::core::errors::{DecodeTarget, HarnessError};

/// 2^63 and 2^64, the exclusive upper bounds of `i64` and `u64` as doubles.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

/// Compares expected and actual output as structured values.
///
/// Both sides are parsed and re-serialized canonically, so `[0,1]` equals
/// `[0, 1]` and `2.0` equals `2`. A side that does not parse fails the case
/// with the parse error instead of propagating.
pub fn outputs_match(expected: &str, actual: &str) -> Result<bool, HarnessError> {
    let expected = canonical_form(expected, DecodeTarget::ExpectedOutput)?;
    let actual = canonical_form(actual, DecodeTarget::ActualOutput)?;
    Ok(expected == actual)
}

pub fn canonical_form(text: &str, what: DecodeTarget) -> Result<String, HarnessError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| HarnessError::decode(what, err))?;
    Ok(canonicalize(value).to_string())
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Integral floats collapse to integers, the way JSON.stringify spells them.
///
/// Every integral double below 2^64 is exactly representable as an integer,
/// so `1e16` and `10000000000000000` end up as the same `Number`. Larger
/// integers are parsed as doubles on both sides already.
fn canonical_number(n: Number) -> Number {
    if !n.is_f64() {
        return n;
    }
    let Some(f) = n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0) else {
        return n;
    };
    if (-I64_BOUND..0.0).contains(&f) {
        Number::from(f as i64)
    } else if (0.0..U64_BOUND).contains(&f) {
        Number::from(f as u64)
    } else {
        n
    }
}
