use serde_json::{Number as JsonNumber, Value as JsonValue};

/// A numeric field value, kept exactly as the source document wrote it.
///
/// Equality is exact: two numerics are equal when they denote the same decimal value. A float
/// denotes its shortest round-trip decimal, so `1`, `1.0` and `{"$numberDecimal": "1.00"}` are
/// equal while two 64-bit integers above 2^53 that differ by one are not. `NaN` equals `NaN`.
#[derive(Debug, Clone)]
pub enum Numeric {
    /// Any 64-bit signed or unsigned integer.
    Int(i128),
    Float(f64),
    /// A Decimal128 value in its source text.
    Decimal(String),
}

#[derive(Debug, PartialEq, Eq)]
enum DecimalKey {
    /// `(-1)^negative * 0.<digits> * 10^exponent`; zero has no digits.
    Finite { negative: bool, digits: String, exponent: i64 },
    Infinity { negative: bool },
    NaN,
}

impl Numeric {
    /// A Decimal128 value, or `None` when `text` is not a decimal literal.
    #[must_use]
    pub fn decimal(text: &str) -> Option<Self> {
        decimal_key(text).map(|_| Self::Decimal(text.trim().to_string()))
    }

    /// Read a plain JSON number. Integers stay exact; anything else is a float.
    #[must_use]
    pub fn from_json(number: &JsonNumber) -> Option<Self> {
        if let Some(integer) = number.as_i64() {
            return Some(Self::Int(i128::from(integer)));
        }
        if let Some(integer) = number.as_u64() {
            return Some(Self::Int(i128::from(integer)));
        }
        number.as_f64().map(Self::Float)
    }

    /// Read the payload of a `$numberInt`, `$numberLong`, `$numberDouble` or `$numberDecimal`
    /// wrapper.
    #[must_use]
    pub fn from_wrapper(wrapper: &str, text: &str) -> Option<Self> {
        let text = text.trim();
        match wrapper {
            "$numberInt" => text.parse::<i32>().ok().map(|value| Self::Int(i128::from(value))),
            "$numberLong" => text.parse::<i64>().ok().map(|value| Self::Int(i128::from(value))),
            "$numberDouble" => text.parse::<f64>().ok().map(Self::Float),
            "$numberDecimal" => Self::decimal(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Int(value) => i64::try_from(*value)
                .map(JsonValue::from)
                .or_else(|_| u64::try_from(*value).map(JsonValue::from))
                .unwrap_or_else(|_| serde_json::json!({ "$numberLong": value.to_string() })),
            Self::Float(value) => JsonNumber::from_f64(*value).map_or_else(
                || serde_json::json!({ "$numberDouble": non_finite_name(*value) }),
                JsonValue::Number,
            ),
            Self::Decimal(text) => serde_json::json!({ "$numberDecimal": text }),
        }
    }

    /// Lookup text for identifiers: integers in decimal, integral floats without a fraction.
    /// Non-finite values identify nothing.
    #[must_use]
    pub fn id_text(&self) -> Option<String> {
        match self {
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) if value.is_finite() => Some(value.to_string()),
            Self::Float(_) => None,
            Self::Decimal(text) => match decimal_key(text)? {
                DecimalKey::Finite { .. } => Some(text.clone()),
                _ => None,
            },
        }
    }

    fn key(&self) -> Option<DecimalKey> {
        match self {
            Self::Int(value) => decimal_key(&value.to_string()),
            Self::Float(value) if value.is_nan() => Some(DecimalKey::NaN),
            Self::Float(value) if value.is_infinite() => {
                Some(DecimalKey::Infinity { negative: value.is_sign_negative() })
            }
            // Display never uses exponent notation and prints the shortest round-trip digits.
            Self::Float(value) => decimal_key(&value.to_string()),
            Self::Decimal(text) => decimal_key(text),
        }
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => match (self.key(), other.key()) {
                (Some(a), Some(b)) => a == b,
                _ => matches!((self, other), (Self::Decimal(a), Self::Decimal(b)) if a == b),
            },
        }
    }
}

fn non_finite_name(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value.is_sign_negative() {
        "-Infinity"
    } else {
        "Infinity"
    }
}

fn decimal_key(text: &str) -> Option<DecimalKey> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let lower = unsigned.to_ascii_lowercase();
    match lower.as_str() {
        "nan" => return Some(DecimalKey::NaN),
        "inf" | "infinity" => return Some(DecimalKey::Infinity { negative }),
        _ => {}
    }

    let (mantissa, exponent) = match lower.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().ok()?),
        None => (lower.as_str(), 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    let all = format!("{whole}{fraction}");
    let leading_zeros = all.bytes().take_while(|byte| *byte == b'0').count();
    let digits = all[leading_zeros..].trim_end_matches('0');
    if digits.is_empty() {
        return Some(DecimalKey::Finite { negative: false, digits: String::new(), exponent: 0 });
    }

    let shift = i64::try_from(whole.len()).ok()? - i64::try_from(leading_zeros).ok()?;
    Some(DecimalKey::Finite {
        negative,
        digits: digits.to_string(),
        exponent: exponent.checked_add(shift)?,
    })
}
