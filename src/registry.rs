//! Message-Factory Interface
//!
//! The narrow contract through which richer value types (messages,
//! JSON-like values, timestamps, durations) are constructed without
//! coupling the core to a particular message runtime: a descriptor
//! pool for type lookup and a factory handing out field-by-field
//! builders.
//!
//! Pools compose: a [`CombinedDescriptorPool`] scans its members in
//! declared order and the first match wins. Every default pool carries
//! the well-known types (the protobuf JSON value family, the wrapper
//! types, duration, timestamp, and any).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CelError;
use crate::interp::value::Value;

/// Field of a message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Description of a message type: its fully qualified name and fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    full_name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn new(full_name: impl Into<String>, field_names: &[&str]) -> Self {
        Self {
            full_name: full_name.into(),
            fields: field_names
                .iter()
                .map(|name| FieldDescriptor::new(*name))
                .collect(),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Type lookup surface.
pub trait DescriptorPool: Send + Sync {
    /// Find a message descriptor by fully qualified type name.
    fn find_descriptor(&self, type_name: &str) -> Option<&MessageDescriptor>;

    /// Find an extension field declared against `containing`.
    fn find_extension_descriptor(
        &self,
        containing: &MessageDescriptor,
        field_name: &str,
    ) -> Option<&FieldDescriptor>;
}

/// In-memory descriptor pool.
#[derive(Debug, Clone, Default)]
pub struct SimpleDescriptorPool {
    messages: BTreeMap<String, MessageDescriptor>,
    extensions: BTreeMap<String, BTreeMap<String, FieldDescriptor>>,
}

impl SimpleDescriptorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool preloaded with the well-known types.
    pub fn with_well_known_types() -> Self {
        let mut pool = Self::new();
        for descriptor in well_known_types() {
            pool.add_message(descriptor.clone());
        }
        pool
    }

    pub fn add_message(&mut self, descriptor: MessageDescriptor) {
        self.messages
            .insert(descriptor.full_name.clone(), descriptor);
    }

    pub fn add_extension(&mut self, containing_type: &str, field: FieldDescriptor) {
        self.extensions
            .entry(containing_type.to_string())
            .or_default()
            .insert(field.name.clone(), field);
    }
}

impl DescriptorPool for SimpleDescriptorPool {
    fn find_descriptor(&self, type_name: &str) -> Option<&MessageDescriptor> {
        if !is_valid_type_name(type_name) {
            return None;
        }
        self.messages.get(type_name)
    }

    fn find_extension_descriptor(
        &self,
        containing: &MessageDescriptor,
        field_name: &str,
    ) -> Option<&FieldDescriptor> {
        self.extensions
            .get(containing.full_name())
            .and_then(|fields| fields.get(field_name))
    }
}

/// Ordered composition of pools; the first match wins.
#[derive(Clone, Default)]
pub struct CombinedDescriptorPool {
    pools: Vec<Arc<dyn DescriptorPool>>,
}

impl CombinedDescriptorPool {
    pub fn new(pools: Vec<Arc<dyn DescriptorPool>>) -> Self {
        Self { pools }
    }

    pub fn push(&mut self, pool: Arc<dyn DescriptorPool>) {
        self.pools.push(pool);
    }
}

impl DescriptorPool for CombinedDescriptorPool {
    fn find_descriptor(&self, type_name: &str) -> Option<&MessageDescriptor> {
        self.pools
            .iter()
            .find_map(|pool| pool.find_descriptor(type_name))
    }

    fn find_extension_descriptor(
        &self,
        containing: &MessageDescriptor,
        field_name: &str,
    ) -> Option<&FieldDescriptor> {
        self.pools
            .iter()
            .find_map(|pool| pool.find_extension_descriptor(containing, field_name))
    }
}

/// A message under construction.
pub trait MessageBuilder {
    /// Set a field by name. Unknown fields fail with `Unresolved`.
    fn set_field(&mut self, field_name: &str, value: Value) -> Result<(), CelError>;

    /// Finish construction, producing a runtime value. Well-known
    /// types surface as their natural runtime representation.
    fn build(self: Box<Self>) -> Result<Value, CelError>;
}

/// Hands out builders for message types.
pub trait MessageFactory: Send + Sync {
    /// A builder for the named type, or `None` when the type is
    /// unknown to this factory.
    fn new_builder(&self, type_name: &str) -> Option<Box<dyn MessageBuilder>>;
}

/// An untyped field-name/value message, the factory's generic output.
#[derive(Debug, Clone, Default)]
pub struct DynamicMessage {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

/// Factory producing [`DynamicMessage`]s against a descriptor pool,
/// with the well-known types converted to their natural runtime
/// values.
#[derive(Clone)]
pub struct DynamicMessageFactory {
    pool: Arc<dyn DescriptorPool>,
}

impl DynamicMessageFactory {
    pub fn new(pool: Arc<dyn DescriptorPool>) -> Self {
        Self { pool }
    }

    /// A factory over the default well-known-type pool.
    pub fn with_well_known_types() -> Self {
        Self::new(Arc::new(SimpleDescriptorPool::with_well_known_types()))
    }
}

impl MessageFactory for DynamicMessageFactory {
    fn new_builder(&self, type_name: &str) -> Option<Box<dyn MessageBuilder>> {
        let descriptor = self.pool.find_descriptor(type_name)?.clone();
        Some(Box::new(DynamicMessageBuilder {
            descriptor,
            fields: BTreeMap::new(),
        }))
    }
}

struct DynamicMessageBuilder {
    descriptor: MessageDescriptor,
    fields: BTreeMap<String, Value>,
}

impl MessageBuilder for DynamicMessageBuilder {
    fn set_field(&mut self, field_name: &str, value: Value) -> Result<(), CelError> {
        if self.descriptor.field(field_name).is_none() {
            return Err(CelError::unresolved(format!(
                "{}.{}",
                self.descriptor.full_name(),
                field_name
            )));
        }
        self.fields.insert(field_name.to_string(), value);
        Ok(())
    }

    fn build(self: Box<Self>) -> Result<Value, CelError> {
        finish_message(self.descriptor, self.fields)
    }
}

fn finish_message(
    descriptor: MessageDescriptor,
    mut fields: BTreeMap<String, Value>,
) -> Result<Value, CelError> {
    match descriptor.full_name() {
        "google.protobuf.Duration" => {
            let seconds = take_int(&mut fields, "seconds")?;
            let nanos = take_int(&mut fields, "nanos")?;
            let duration = chrono::Duration::seconds(seconds)
                .checked_add(&chrono::Duration::nanoseconds(nanos))
                .ok_or_else(|| CelError::overflow("duration out of range"))?;
            Ok(Value::Duration(duration))
        }
        "google.protobuf.Timestamp" => {
            let seconds = take_int(&mut fields, "seconds")?;
            let nanos = take_int(&mut fields, "nanos")?;
            let nanos = u32::try_from(nanos)
                .map_err(|_| CelError::overflow("timestamp nanos out of range"))?;
            let timestamp = chrono::DateTime::from_timestamp(seconds, nanos)
                .ok_or_else(|| CelError::overflow("timestamp out of range"))?;
            Ok(Value::Timestamp(timestamp))
        }
        "google.protobuf.BoolValue"
        | "google.protobuf.BytesValue"
        | "google.protobuf.DoubleValue"
        | "google.protobuf.FloatValue"
        | "google.protobuf.Int32Value"
        | "google.protobuf.Int64Value"
        | "google.protobuf.StringValue"
        | "google.protobuf.UInt32Value"
        | "google.protobuf.UInt64Value" => {
            Ok(fields.remove("value").unwrap_or(Value::Null))
        }
        "google.protobuf.Value" => {
            // One-of over the JSON value kinds; an empty construction
            // is the JSON null.
            let (_, value) = match fields.pop_first() {
                Some(entry) => entry,
                None => return Ok(Value::Null),
            };
            Ok(value)
        }
        "google.protobuf.ListValue" => match fields.remove("values") {
            Some(value @ Value::List(_)) => Ok(value),
            Some(_) => Err(CelError::invalid_state("ListValue.values must be a list")),
            None => Ok(Value::List(Vec::new())),
        },
        "google.protobuf.Struct" => match fields.remove("fields") {
            Some(value @ Value::Map(_)) => Ok(value),
            Some(_) => Err(CelError::invalid_state("Struct.fields must be a map")),
            None => Ok(Value::Map(Default::default())),
        },
        _ => Ok(Value::Message(DynamicMessage {
            type_name: descriptor.full_name().to_string(),
            fields,
        })),
    }
}

fn take_int(fields: &mut BTreeMap<String, Value>, name: &str) -> Result<i64, CelError> {
    match fields.remove(name) {
        None => Ok(0),
        Some(Value::Int(i)) => Ok(i),
        Some(other) => Err(CelError::invalid_state(format!(
            "field {} must be an integer, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Fully qualified protobuf-style type names.
fn is_valid_type_name(type_name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("type name pattern compiles")
    });
    pattern.is_match(type_name)
}

/// Descriptors for the well-known types every default pool carries.
fn well_known_types() -> &'static [MessageDescriptor] {
    static TYPES: OnceLock<Vec<MessageDescriptor>> = OnceLock::new();
    TYPES.get_or_init(|| {
        let wrapper = |name: &str| MessageDescriptor::new(name, &["value"]);
        vec![
            MessageDescriptor::new(
                "google.protobuf.Value",
                &[
                    "null_value",
                    "number_value",
                    "string_value",
                    "bool_value",
                    "struct_value",
                    "list_value",
                ],
            ),
            MessageDescriptor::new("google.protobuf.ListValue", &["values"]),
            MessageDescriptor::new("google.protobuf.Struct", &["fields"]),
            wrapper("google.protobuf.BoolValue"),
            wrapper("google.protobuf.BytesValue"),
            wrapper("google.protobuf.DoubleValue"),
            wrapper("google.protobuf.FloatValue"),
            wrapper("google.protobuf.Int32Value"),
            wrapper("google.protobuf.Int64Value"),
            wrapper("google.protobuf.StringValue"),
            wrapper("google.protobuf.UInt32Value"),
            wrapper("google.protobuf.UInt64Value"),
            MessageDescriptor::new("google.protobuf.Duration", &["seconds", "nanos"]),
            MessageDescriptor::new("google.protobuf.Timestamp", &["seconds", "nanos"]),
            MessageDescriptor::new("google.protobuf.Any", &["type_url", "value"]),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::value::value_equals;

    #[test]
    fn test_default_pool_has_well_known_types() {
        let pool = SimpleDescriptorPool::with_well_known_types();
        for name in [
            "google.protobuf.Value",
            "google.protobuf.ListValue",
            "google.protobuf.Struct",
            "google.protobuf.BoolValue",
            "google.protobuf.BytesValue",
            "google.protobuf.DoubleValue",
            "google.protobuf.FloatValue",
            "google.protobuf.Int32Value",
            "google.protobuf.Int64Value",
            "google.protobuf.StringValue",
            "google.protobuf.UInt32Value",
            "google.protobuf.UInt64Value",
            "google.protobuf.Duration",
            "google.protobuf.Timestamp",
            "google.protobuf.Any",
        ] {
            assert!(pool.find_descriptor(name).is_some(), "missing {}", name);
        }
        assert!(pool.find_descriptor("not a type!").is_none());
        assert!(pool.find_descriptor("missing.Type").is_none());
    }

    #[test]
    fn test_combined_pool_first_match_wins() {
        let mut first = SimpleDescriptorPool::new();
        first.add_message(MessageDescriptor::new("test.T", &["from_first"]));
        let mut second = SimpleDescriptorPool::new();
        second.add_message(MessageDescriptor::new("test.T", &["from_second"]));
        second.add_message(MessageDescriptor::new("test.Only", &["x"]));

        let combined = CombinedDescriptorPool::new(vec![Arc::new(first), Arc::new(second)]);
        let t = combined.find_descriptor("test.T").unwrap();
        assert!(t.field("from_first").is_some());
        assert!(combined.find_descriptor("test.Only").is_some());
    }

    #[test]
    fn test_extension_lookup() {
        let mut pool = SimpleDescriptorPool::new();
        pool.add_message(MessageDescriptor::new("test.T", &["a"]));
        pool.add_extension("test.T", FieldDescriptor::new("ext_field"));
        let t = pool.find_descriptor("test.T").unwrap().clone();
        assert!(pool.find_extension_descriptor(&t, "ext_field").is_some());
        assert!(pool.find_extension_descriptor(&t, "missing").is_none());
    }

    #[test]
    fn test_dynamic_builder_rejects_unknown_fields() {
        let factory = DynamicMessageFactory::with_well_known_types();
        let mut builder = factory.new_builder("google.protobuf.Duration").unwrap();
        assert!(matches!(
            builder.set_field("bogus", Value::Int(1)),
            Err(CelError::Unresolved { .. })
        ));
    }

    #[test]
    fn test_duration_and_timestamp_build() {
        let factory = DynamicMessageFactory::with_well_known_types();

        let mut builder = factory.new_builder("google.protobuf.Duration").unwrap();
        builder.set_field("seconds", Value::Int(90)).unwrap();
        let duration = builder.build().unwrap();
        assert!(matches!(
            duration,
            Value::Duration(d) if d == chrono::Duration::seconds(90)
        ));

        let mut builder = factory.new_builder("google.protobuf.Timestamp").unwrap();
        builder.set_field("seconds", Value::Int(0)).unwrap();
        builder.set_field("nanos", Value::Int(500)).unwrap();
        let timestamp = builder.build().unwrap();
        match timestamp {
            Value::Timestamp(t) => assert_eq!(t.timestamp_subsec_nanos(), 500),
            other => panic!("expected timestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_wrapper_build_unwraps() {
        let factory = DynamicMessageFactory::with_well_known_types();
        let mut builder = factory.new_builder("google.protobuf.Int64Value").unwrap();
        builder.set_field("value", Value::Int(7)).unwrap();
        assert!(value_equals(&builder.build().unwrap(), &Value::Int(7)));
    }

    #[test]
    fn test_plain_message_build() {
        let mut pool = SimpleDescriptorPool::new();
        pool.add_message(MessageDescriptor::new("test.Point", &["x", "y"]));
        let factory = DynamicMessageFactory::new(Arc::new(pool));
        let mut builder = factory.new_builder("test.Point").unwrap();
        builder.set_field("x", Value::Int(1)).unwrap();
        builder.set_field("y", Value::Int(2)).unwrap();
        match builder.build().unwrap() {
            Value::Message(message) => {
                assert_eq!(message.type_name, "test.Point");
                assert_eq!(message.fields.len(), 2);
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_gives_no_builder() {
        let factory = DynamicMessageFactory::with_well_known_types();
        assert!(factory.new_builder("example.Missing").is_none());
    }
}
