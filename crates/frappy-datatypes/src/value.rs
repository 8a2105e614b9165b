use indexmap::IndexMap;

/// A validated SECoP value. Every [`crate::Datatype::validate`] call
/// produces one of these; it is what parameter caches, announcements and
/// command results carry internally (the wire form is always JSON via
/// `export_value`/`import_value`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `double`
    Double(f64),
    /// `int` or the transported representation of a `scaled` value
    Int(i64),
    /// `bool`
    Bool(bool),
    /// `string`
    Str(String),
    /// `blob`, raw bytes (base64 on the wire)
    Blob(Vec<u8>),
    /// `enum`, the resolved (label, value) pair
    Enum(EnumMember),
    /// `array`
    Array(Vec<Value>),
    /// `tuple`, including `status` and `limit`
    Tuple(Vec<Value>),
    /// `struct`, member order preserved
    Struct(IndexMap<String, Value>),
}

/// One resolved member of an [`crate::EnumType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    /// The symbolic name, e.g. `"IDLE"`.
    pub label: String,
    /// The integer transported on the wire, e.g. `100`.
    pub value: i64,
}

impl Value {
    /// A short, stable type-name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Double(_) => "double",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Blob(_) => "blob",
            Value::Enum(_) => "enum",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Struct(_) => "struct",
        }
    }

    /// Best-effort numeric coercion, used by datatypes that accept either
    /// int or float on input (FloatRange, IntRange, ScaledInteger).
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}
