use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::numeric::Numeric;
use crate::ReconcileError;

pub const OBJECT_ID_FIELD: &str = "object_id";

const NUMBER_WRAPPERS: [&str; 4] = ["$numberInt", "$numberLong", "$numberDouble", "$numberDecimal"];

const UNSUPPORTED_WRAPPERS: [&str; 9] = [
    "$binary",
    "$regularExpression",
    "$regex",
    "$timestamp",
    "$minKey",
    "$maxKey",
    "$symbol",
    "$dbPointer",
    "$uuid",
];

static ABSENT: Value = Value::Absent;

/// One field value of a stored document.
///
/// `Ignorable` marks executable content (Extended JSON `$code`), which never counts as a
/// mismatch. `Unsupported` keeps BSON types the comparison has no rule for; reaching one
/// during comparison is a data-shape error.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Absent,
    Bool(bool),
    Number(Numeric),
    Text(String),
    Array(Vec<Value>),
    Object(Record),
    Ignorable(JsonValue),
    Unsupported { kind: String, raw: JsonValue },
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Ignorable(_) => "ignorable",
            Self::Unsupported { .. } => "unsupported",
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Object(record) => Some(record),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Absent => JsonValue::Null,
            Self::Bool(flag) => JsonValue::Bool(*flag),
            Self::Number(number) => number.to_json(),
            Self::Text(text) => JsonValue::String(text.clone()),
            Self::Array(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(record) => record.to_json(),
            Self::Ignorable(raw) | Self::Unsupported { raw, .. } => raw.clone(),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Absent,
            JsonValue::Bool(flag) => Self::Bool(flag),
            JsonValue::Number(number) => match Numeric::from_json(&number) {
                Some(numeric) => Self::Number(numeric),
                None => Self::Unsupported {
                    kind: "number".to_string(),
                    raw: JsonValue::Number(number),
                },
            },
            JsonValue::String(text) => Self::Text(text),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            JsonValue::Object(object) => from_json_object(object),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn from_json_object(mut object: Map<String, JsonValue>) -> Value {
    let wrapper = match object.keys().next() {
        Some(key) if key.starts_with('$') => key.clone(),
        _ => return Value::Object(Record::from(object)),
    };

    match wrapper.as_str() {
        "$undefined" => Value::Absent,
        "$code" => Value::Ignorable(JsonValue::Object(object)),
        "$date" => object.remove("$date").map_or(Value::Absent, Value::from),
        "$oid" => {
            if let Some(JsonValue::String(hex)) = object.get("$oid") {
                return Value::Text(hex.clone());
            }
            unsupported(&wrapper, object)
        }
        key if NUMBER_WRAPPERS.contains(&key) => {
            if let Some(JsonValue::String(text)) = object.get(key) {
                if let Some(numeric) = Numeric::from_wrapper(key, text) {
                    return Value::Number(numeric);
                }
            }
            unsupported(&wrapper, object)
        }
        key if UNSUPPORTED_WRAPPERS.contains(&key) => unsupported(&wrapper, object),
        _ => Value::Object(Record::from(object)),
    }
}

fn unsupported(wrapper: &str, object: Map<String, JsonValue>) -> Value {
    Value::Unsupported {
        kind: wrapper.trim_start_matches('$').to_string(),
        raw: JsonValue::Object(object),
    }
}

/// Canonical text form of a record's `object_id`, used for point lookups across collections.
///
/// The key carries no type: text `"7"`, the integer `7` and the float `7.0` share the key `7`.
/// Records joined across types still differ on `object_id` itself, which the comparison reports.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Text is taken as-is and integral numbers lose their fractional part; anything else
    /// cannot identify a record.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(text) => Some(Self(text.clone())),
            Value::Number(number) => number.id_text().map(Self),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An insertion-ordered document. Field order is the enumeration order used when a record
/// drives a comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a JSON document into a record.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Shape`] when the document is not a JSON object.
    pub fn from_json(document: JsonValue) -> Result<Self, ReconcileError> {
        match Value::from(document) {
            Value::Object(record) => Ok(record),
            other => Err(ReconcileError::Shape(format!(
                "document must be a JSON object, found {}",
                other.kind()
            ))),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::with_capacity(self.fields.len());
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.to_json());
        }
        JsonValue::Object(object)
    }

    /// Field value, or [`Value::Absent`] when the key is missing.
    #[must_use]
    pub fn get(&self, key: &str) -> &Value {
        self.fields.iter().find(|(name, _)| name == key).map_or(&ABSENT, |(_, value)| value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == key)
    }

    /// Set a field, keeping its original position when it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if let Some((_, slot)) = self.fields.iter_mut().find(|(name, _)| *name == key) {
            return Some(std::mem::replace(slot, value));
        }
        self.fields.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.fields.iter().position(|(name, _)| name == key)?;
        Some(self.fields.remove(position).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        ObjectId::from_value(self.get(OBJECT_ID_FIELD))
    }
}

impl From<Map<String, JsonValue>> for Record {
    fn from(object: Map<String, JsonValue>) -> Self {
        Self {
            fields: object.into_iter().map(|(key, value)| (key, Value::from(value))).collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = JsonValue::deserialize(deserializer)?;
        Self::from_json(document).map_err(serde::de::Error::custom)
    }
}
