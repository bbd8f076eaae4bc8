//! Runtime Values
//!
//! The value domain for evaluation: the CEL scalar types, lists, maps,
//! time values backed by `chrono`, and dynamic messages produced by a
//! message factory. Maps preserve insertion order and compare keys
//! numerically, so `m[1]` and `m[1u]` address the same entry.

use chrono::{DateTime, Duration, Utc};

use crate::ast::Constant;
use crate::numeric;
use crate::registry::DynamicMessage;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(MapValue),
    Timestamp(DateTime<Utc>),
    Duration(Duration),
    Message(DynamicMessage),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null_type",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Timestamp(_) => "google.protobuf.Timestamp",
            Value::Duration(_) => "google.protobuf.Duration",
            Value::Message(_) => "message",
        }
    }

    pub fn from_constant(constant: &Constant) -> Option<Value> {
        Some(match constant {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Uint(u) => Value::Uint(*u),
            Constant::Double(d) => Value::Double(*d),
            Constant::String(s) => Value::String(s.clone()),
            Constant::Bytes(b) => Value::Bytes(b.clone()),
            Constant::Error(_) => return None,
        })
    }

    /// Convert to a JSON value where a faithful mapping exists. Int64
    /// and uint64 map to JSON numbers when exactly representable and
    /// decimal strings otherwise, following the protobuf JSON rules.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => {
                if i.unsigned_abs() < (1 << 53) {
                    json!(i)
                } else {
                    json!(i.to_string())
                }
            }
            Value::Uint(u) => {
                if *u < (1 << 53) {
                    json!(u)
                } else {
                    json!(u.to_string())
                }
            }
            Value::Double(d) => json!(d),
            Value::String(s) => json!(s),
            Value::Bytes(b) => {
                // Protobuf JSON encodes bytes in base64; a plain hex
                // dump keeps this crate dependency-light.
                json!(b.iter().map(|x| format!("{:02x}", x)).collect::<String>())
            }
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => {
                let mut object = serde_json::Map::new();
                for (key, value) in map.entries() {
                    object.insert(key.to_json_key(), value.to_json());
                }
                serde_json::Value::Object(object)
            }
            Value::Timestamp(t) => json!(t.to_rfc3339()),
            Value::Duration(d) => {
                let seconds = d.num_seconds();
                let nanos = (*d - Duration::seconds(seconds))
                    .num_nanoseconds()
                    .unwrap_or(0);
                if nanos == 0 {
                    json!(format!("{}s", seconds))
                } else {
                    json!(format!("{}.{:09}s", seconds, nanos.abs()))
                }
            }
            Value::Message(message) => {
                let mut object = serde_json::Map::new();
                for (field, value) in &message.fields {
                    object.insert(field.clone(), value.to_json());
                }
                serde_json::Value::Object(object)
            }
        }
    }

    /// Build a value from a JSON document (the protobuf `Value`
    /// well-known type mapping).
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                // JSON numbers are doubles in the protobuf Value
                // mapping.
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(object) => {
                let mut map = MapValue::new();
                for (key, value) in object {
                    let _ = map.insert(MapKey::String(key.clone()), Value::from_json(value));
                }
                Value::Map(map)
            }
        }
    }
}

/// Valid CEL map key types.
#[derive(Debug, Clone, PartialEq)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<MapKey> {
        Some(match value {
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Int(i) => MapKey::Int(*i),
            Value::Uint(u) => MapKey::Uint(*u),
            Value::String(s) => MapKey::String(s.clone()),
            _ => return None,
        })
    }

    /// Key equivalence: numeric keys compare across int and uint.
    pub fn equivalent(&self, other: &MapKey) -> bool {
        match (self, other) {
            (MapKey::Int(a), MapKey::Uint(b)) => numeric::equals_int_uint(*a, *b),
            (MapKey::Uint(a), MapKey::Int(b)) => numeric::equals_int_uint(*b, *a),
            _ => self == other,
        }
    }

    fn to_json_key(&self) -> String {
        match self {
            MapKey::Bool(b) => b.to_string(),
            MapKey::Int(i) => i.to_string(),
            MapKey::Uint(u) => u.to_string(),
            MapKey::String(s) => s.clone(),
        }
    }
}

/// Insertion-ordered map with numeric key equivalence.
#[derive(Debug, Clone, Default)]
pub struct MapValue {
    entries: Vec<(MapKey, Value)>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.equivalent(key))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &MapKey) -> bool {
        self.get(key).is_some()
    }

    /// Insert a new entry; duplicate keys are an error, reported with
    /// the offending key's rendering.
    pub fn insert(&mut self, key: MapKey, value: Value) -> Result<(), String> {
        if self.contains(&key) {
            return Err(format!("duplicate map key {}", key.to_json_key()));
        }
        self.entries.push((key, value));
        Ok(())
    }

    /// Insert, replacing any existing entry with an equivalent key.
    pub fn insert_or_replace(&mut self, key: MapKey, value: Value) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.equivalent(&key))
        {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }
}

/// Deep equality over values with CEL semantics: numeric comparisons
/// cross int/uint/double, any NaN is unequal to everything, and values
/// of incomparable types are simply not equal.
pub fn value_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Uint(x), Value::Uint(y)) => x == y,
        (Value::Double(x), Value::Double(y)) => numeric::equals_double_double(*x, *y),
        (Value::Int(x), Value::Uint(y)) => numeric::equals_int_uint(*x, *y),
        (Value::Uint(x), Value::Int(y)) => numeric::equals_int_uint(*y, *x),
        (Value::Double(x), Value::Int(y)) => numeric::equals_double_int(*x, *y),
        (Value::Int(x), Value::Double(y)) => numeric::equals_double_int(*y, *x),
        (Value::Double(x), Value::Uint(y)) => numeric::equals_double_uint(*x, *y),
        (Value::Uint(x), Value::Double(y)) => numeric::equals_double_uint(*y, *x),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| value_equals(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.entries().all(|(key, value)| {
                    y.get(key).is_some_and(|other| value_equals(value, other))
                })
        }
        (Value::Timestamp(x), Value::Timestamp(y)) => x == y,
        (Value::Duration(x), Value::Duration(y)) => x == y,
        (Value::Message(x), Value::Message(y)) => {
            x.type_name == y.type_name
                && x.fields.len() == y.fields.len()
                && x.fields.iter().all(|(field, value)| {
                    y.fields
                        .get(field)
                        .is_some_and(|other| value_equals(value, other))
                })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_type_numeric_equality() {
        assert!(value_equals(&Value::Int(1), &Value::Uint(1)));
        assert!(value_equals(&Value::Uint(2), &Value::Double(2.0)));
        assert!(value_equals(&Value::Double(3.0), &Value::Int(3)));
        assert!(!value_equals(&Value::Int(1), &Value::Double(1.5)));
        assert!(!value_equals(
            &Value::Double(f64::NAN),
            &Value::Double(f64::NAN)
        ));
        assert!(!value_equals(&Value::Bool(true), &Value::Int(1)));
    }

    #[test]
    fn test_map_numeric_key_equivalence() {
        let mut map = MapValue::new();
        map.insert(MapKey::Int(1), Value::String("one".into()))
            .unwrap();
        assert!(map.contains(&MapKey::Uint(1)));
        assert!(map.insert(MapKey::Uint(1), Value::Null).is_err());
        assert!(map.get(&MapKey::Int(2)).is_none());
    }

    #[test]
    fn test_map_insert_or_replace() {
        let mut map = MapValue::new();
        map.insert(MapKey::String("k".into()), Value::Int(1))
            .unwrap();
        map.insert_or_replace(MapKey::String("k".into()), Value::Int(2));
        assert_eq!(map.len(), 1);
        assert!(value_equals(
            map.get(&MapKey::String("k".into())).unwrap(),
            &Value::Int(2)
        ));
    }

    #[test]
    fn test_list_and_map_equality() {
        let a = Value::List(vec![Value::Int(1), Value::Double(2.0)]);
        let b = Value::List(vec![Value::Uint(1), Value::Int(2)]);
        assert!(value_equals(&a, &b));

        let mut m1 = MapValue::new();
        m1.insert(MapKey::Int(1), Value::Int(10)).unwrap();
        let mut m2 = MapValue::new();
        m2.insert(MapKey::Uint(1), Value::Uint(10)).unwrap();
        assert!(value_equals(&Value::Map(m1), &Value::Map(m2)));
    }

    #[test]
    fn test_json_round_trip() {
        let json = serde_json::json!({"a": [1.0, true, null], "b": "text"});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }
}
