use base64::Engine;
use indexmap::IndexMap;
use serde_json::{json, Value as Json};

use crate::error::{bad_value, range_error, wrong_type, ValidationError};
use crate::types::{
    ArrayType, BlobType, BoolType, CommandType, FloatRange, IntRange, LimitType, ScaledInteger,
    StatusType, StringType, StructType, TupleType,
};
use crate::value::{EnumMember, Value};
use crate::EnumType;

const B64: base64::engine::general_purpose::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// The SECoP type system: a tagged union over every datatype variant
/// named by the wire protocol's `"type"` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    FloatRange(FloatRange),
    IntRange(IntRange),
    Scaled(ScaledInteger),
    Bool(BoolType),
    Enum(EnumType),
    String(StringType),
    Blob(BlobType),
    Array(ArrayType),
    Tuple(TupleType),
    Struct(StructType),
    Command(CommandType),
    Status(StatusType),
    Limit(LimitType),
}

impl Datatype {
    /// Coerce and check `v`, returning the canonical stored form.
    pub fn validate(&self, v: &Value) -> Result<Value, ValidationError> {
        match self {
            Datatype::FloatRange(ft) => {
                let raw = v
                    .as_f64()
                    .ok_or_else(|| wrong_type("number", v.type_name()))?;
                let eps = ft.tolerance(raw);
                if raw < ft.min - eps || raw > ft.max + eps {
                    return Err(range_error(raw, format!("[{}, {}]", ft.min, ft.max)));
                }
                Ok(Value::Double(raw.clamp(ft.min, ft.max)))
            }
            Datatype::IntRange(it) => {
                let raw = match v {
                    Value::Int(i) => *i,
                    Value::Double(f) if f.fract() == 0.0 => *f as i64,
                    Value::Bool(b) => i64::from(*b),
                    other => return Err(wrong_type("int", other.type_name())),
                };
                if raw < it.min || raw > it.max {
                    return Err(range_error(raw, format!("[{}, {}]", it.min, it.max)));
                }
                Ok(Value::Int(raw))
            }
            Datatype::Scaled(st) => {
                let raw = v
                    .as_f64()
                    .ok_or_else(|| wrong_type("number", v.type_name()))?;
                let eps = st.tolerance(raw);
                if raw < st.min - eps || raw > st.max + eps {
                    return Err(range_error(raw, format!("[{}, {}]", st.min, st.max)));
                }
                Ok(Value::Double(st.round_to_scale(raw).clamp(st.min, st.max)))
            }
            Datatype::Bool(_) => match v {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::Str(s) => match s.to_ascii_lowercase().as_str() {
                    "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
                    "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
                    _ => Err(bad_value(format!("{s:?} is not a valid bool"))),
                },
                other => Err(wrong_type("bool", other.type_name())),
            },
            Datatype::Enum(et) => match v {
                Value::Enum(m) => et
                    .by_label(&m.label)
                    .filter(|resolved| resolved.value == m.value)
                    .ok_or_else(|| bad_value(format!("{} is not a member of {}", m.label, et.name()))),
                Value::Int(i) => et
                    .by_value(*i)
                    .ok_or_else(|| bad_value(format!("{i} is not a member of {}", et.name()))),
                Value::Str(s) => et
                    .by_label(s)
                    .ok_or_else(|| bad_value(format!("{s:?} is not a member of {}", et.name()))),
                other => Err(wrong_type("enum", other.type_name())),
            },
            Datatype::String(s) => match v {
                Value::Str(text) => validate_string(s, text),
                other => Err(wrong_type("string", other.type_name())),
            },
            Datatype::Blob(b) => match v {
                Value::Blob(bytes) => {
                    if bytes.len() < b.min_bytes || bytes.len() > b.max_bytes {
                        return Err(range_error(
                            bytes.len(),
                            format!("[{}, {}] bytes", b.min_bytes, b.max_bytes),
                        ));
                    }
                    Ok(Value::Blob(bytes.clone()))
                }
                other => Err(wrong_type("blob", other.type_name())),
            },
            Datatype::Array(at) => match v {
                Value::Array(items) => {
                    if items.len() < at.min_len || items.len() > at.max_len {
                        return Err(range_error(
                            items.len(),
                            format!("[{}, {}] elements", at.min_len, at.max_len),
                        ));
                    }
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(at.element.validate(item)?);
                    }
                    Ok(Value::Array(out))
                }
                other => Err(wrong_type("array", other.type_name())),
            },
            Datatype::Tuple(tt) => match v {
                Value::Tuple(items) => validate_tuple(&tt.elements, items),
                other => Err(wrong_type("tuple", other.type_name())),
            },
            Datatype::Struct(st) => match v {
                Value::Struct(fields) => validate_struct(st, fields),
                other => Err(wrong_type("struct", other.type_name())),
            },
            Datatype::Command(_) => Err(bad_value(
                "commands are not transported as values".to_string(),
            )),
            Datatype::Status(status) => match v {
                Value::Tuple(items) if items.len() == 2 => {
                    let code = status.code_enum_datatype().validate(&items[0])?;
                    let text = Datatype::String(StringType::text()).validate(&items[1])?;
                    Ok(Value::Tuple(vec![code, text]))
                }
                other => Err(wrong_type("(code, text)", other.type_name())),
            },
            Datatype::Limit(lt) => match v {
                Value::Tuple(items) if items.len() == 2 => {
                    let lower = lt.element.validate(&items[0])?;
                    let upper = lt.element.validate(&items[1])?;
                    let (lf, uf) = (
                        lower.as_f64().unwrap_or(f64::NEG_INFINITY),
                        upper.as_f64().unwrap_or(f64::INFINITY),
                    );
                    if lf > uf {
                        return Err(bad_value(format!("lower limit {lf} > upper limit {uf}")));
                    }
                    Ok(Value::Tuple(vec![lower, upper]))
                }
                other => Err(wrong_type("(lower, upper)", other.type_name())),
            },
        }
    }

    /// Parse a wire-format JSON value into a [`Value`].
    pub fn import_value(&self, j: &Json) -> Result<Value, ValidationError> {
        match self {
            Datatype::FloatRange(_) => {
                let raw = j
                    .as_f64()
                    .ok_or_else(|| wrong_type("number", json_kind(j)))?;
                self.validate(&Value::Double(raw))
            }
            Datatype::Scaled(_) => {
                let raw = j
                    .as_f64()
                    .ok_or_else(|| wrong_type("number", json_kind(j)))?;
                self.validate(&Value::Double(raw))
            }
            Datatype::IntRange(_) => {
                let raw = j
                    .as_i64()
                    .ok_or_else(|| wrong_type("int", json_kind(j)))?;
                self.validate(&Value::Int(raw))
            }
            Datatype::Bool(_) => {
                let b = j.as_bool().ok_or_else(|| wrong_type("bool", json_kind(j)))?;
                self.validate(&Value::Bool(b))
            }
            Datatype::Enum(_) => {
                if let Some(i) = j.as_i64() {
                    self.validate(&Value::Int(i))
                } else if let Some(s) = j.as_str() {
                    self.validate(&Value::Str(s.to_string()))
                } else {
                    Err(wrong_type("enum (int or string)", json_kind(j)))
                }
            }
            Datatype::String(_) => {
                let s = j.as_str().ok_or_else(|| wrong_type("string", json_kind(j)))?;
                self.validate(&Value::Str(s.to_string()))
            }
            Datatype::Blob(_) => {
                let s = j.as_str().ok_or_else(|| wrong_type("base64 string", json_kind(j)))?;
                let bytes = B64
                    .decode(s)
                    .map_err(|e| bad_value(format!("invalid base64: {e}")))?;
                self.validate(&Value::Blob(bytes))
            }
            Datatype::Array(at) => {
                let arr = j.as_array().ok_or_else(|| wrong_type("array", json_kind(j)))?;
                let mut items = Vec::with_capacity(arr.len());
                for item in arr {
                    items.push(at.element.import_value(item)?);
                }
                self.validate(&Value::Array(items))
            }
            Datatype::Tuple(tt) => {
                let arr = j.as_array().ok_or_else(|| wrong_type("tuple", json_kind(j)))?;
                if arr.len() != tt.elements.len() {
                    return Err(bad_value(format!(
                        "tuple expects {} elements, got {}",
                        tt.elements.len(),
                        arr.len()
                    )));
                }
                let mut items = Vec::with_capacity(arr.len());
                for (dt, item) in tt.elements.iter().zip(arr) {
                    items.push(dt.import_value(item)?);
                }
                self.validate(&Value::Tuple(items))
            }
            Datatype::Status(status) => {
                let arr = j.as_array().ok_or_else(|| wrong_type("(code, text)", json_kind(j)))?;
                if arr.len() != 2 {
                    return Err(bad_value("status must be a 2-element array".to_string()));
                }
                let code = status.code_enum_datatype().import_value(&arr[0])?;
                let text = Datatype::String(StringType::text()).import_value(&arr[1])?;
                self.validate(&Value::Tuple(vec![code, text]))
            }
            Datatype::Limit(lt) => {
                let arr = j.as_array().ok_or_else(|| wrong_type("(lower, upper)", json_kind(j)))?;
                if arr.len() != 2 {
                    return Err(bad_value("limit must be a 2-element array".to_string()));
                }
                let lower = lt.element.import_value(&arr[0])?;
                let upper = lt.element.import_value(&arr[1])?;
                self.validate(&Value::Tuple(vec![lower, upper]))
            }
            Datatype::Struct(st) => {
                let obj = j.as_object().ok_or_else(|| wrong_type("struct", json_kind(j)))?;
                let mut fields = IndexMap::new();
                for (name, dt) in &st.members {
                    if let Some(raw) = obj.get(name) {
                        fields.insert(name.clone(), dt.import_value(raw)?);
                    }
                }
                self.validate(&Value::Struct(fields))
            }
            Datatype::Command(_) => Err(bad_value(
                "commands are not transported as values".to_string(),
            )),
        }
    }

    /// Render a [`Value`] into its wire-format JSON.
    #[must_use]
    pub fn export_value(&self, v: &Value) -> Json {
        match (self, v) {
            (Datatype::FloatRange(_), Value::Double(f)) => json_number(*f),
            (Datatype::Scaled(_), Value::Double(f)) => json_number(*f),
            (Datatype::IntRange(_), Value::Int(i)) => json!(i),
            (Datatype::Bool(_), Value::Bool(b)) => json!(b),
            (Datatype::Enum(_), Value::Enum(m)) => json!(m.value),
            (Datatype::String(_), Value::Str(s)) => json!(s),
            (Datatype::Blob(_), Value::Blob(bytes)) => json!(B64.encode(bytes)),
            (Datatype::Array(at), Value::Array(items)) => {
                Json::Array(items.iter().map(|it| at.element.export_value(it)).collect())
            }
            (Datatype::Tuple(tt), Value::Tuple(items)) => Json::Array(
                tt.elements
                    .iter()
                    .zip(items)
                    .map(|(dt, it)| dt.export_value(it))
                    .collect(),
            ),
            (Datatype::Status(status), Value::Tuple(items)) if items.len() == 2 => Json::Array(vec![
                status.code_enum_datatype().export_value(&items[0]),
                Datatype::String(StringType::text()).export_value(&items[1]),
            ]),
            (Datatype::Limit(lt), Value::Tuple(items)) if items.len() == 2 => {
                Json::Array(vec![lt.element.export_value(&items[0]), lt.element.export_value(&items[1])])
            }
            (Datatype::Struct(st), Value::Struct(fields)) => {
                let mut obj = serde_json::Map::new();
                for (name, dt) in &st.members {
                    if let Some(val) = fields.get(name) {
                        obj.insert(name.clone(), dt.export_value(val));
                    }
                }
                Json::Object(obj)
            }
            _ => Json::Null,
        }
    }

    /// The JSON `describe()` shape: a `"type"` discriminator plus every
    /// property that differs from its default.
    #[must_use]
    pub fn describe(&self) -> Json {
        match self {
            Datatype::FloatRange(ft) => describe_float("double", ft),
            Datatype::Scaled(st) => {
                let mut obj = describe_float("scaled", &FloatRange {
                    min: st.min,
                    max: st.max,
                    unit: st.unit.clone(),
                    fmtstr: st.fmtstr.clone(),
                    absolute_resolution: st.absolute_resolution,
                    relative_resolution: st.relative_resolution,
                });
                obj["scale"] = json!(st.scale);
                obj
            }
            Datatype::IntRange(it) => json!({"type": "int", "min": it.min, "max": it.max}),
            Datatype::Bool(_) => json!({"type": "bool"}),
            Datatype::Enum(et) => {
                let members: IndexMap<&str, i64> = et.members().collect();
                json!({"type": "enum", "members": members})
            }
            Datatype::String(s) => {
                json!({"type": "string", "minchars": s.min_chars, "maxchars": s.max_chars, "isUTF8": s.is_utf8})
            }
            Datatype::Blob(b) => json!({"type": "blob", "minbytes": b.min_bytes, "maxbytes": b.max_bytes}),
            Datatype::Array(at) => {
                json!({"type": "array", "members": at.element.describe(), "minlen": at.min_len, "maxlen": at.max_len})
            }
            Datatype::Tuple(tt) => {
                json!({"type": "tuple", "members": tt.elements.iter().map(Datatype::describe).collect::<Vec<_>>()})
            }
            Datatype::Struct(st) => {
                let members: IndexMap<&str, Json> =
                    st.members.iter().map(|(k, v)| (k.as_str(), v.describe())).collect();
                json!({"type": "struct", "members": members, "optional": st.optional})
            }
            Datatype::Command(ct) => json!({
                "type": "command",
                "argument": ct.argument.as_ref().map(|d| d.describe()),
                "result": ct.result.as_ref().map(|d| d.describe()),
            }),
            Datatype::Status(status) => json!({
                "type": "tuple",
                "members": [status.code_enum_datatype().describe(), Datatype::String(StringType::text()).describe()],
            }),
            Datatype::Limit(lt) => json!({"type": "limit", "members": lt.element.describe()}),
        }
    }

    /// The statically-known zero/empty value for this datatype, used as a
    /// placeholder cache entry while a parameter is "not initialised".
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            Datatype::FloatRange(ft) => Value::Double(0.0f64.clamp(ft.min, ft.max)),
            Datatype::Scaled(st) => Value::Double(0.0f64.clamp(st.min, st.max)),
            Datatype::IntRange(it) => Value::Int(0i64.clamp(it.min, it.max)),
            Datatype::Bool(_) => Value::Bool(false),
            Datatype::Enum(et) => et
                .members()
                .next()
                .map(|(label, value)| Value::Enum(EnumMember {
                    label: label.to_string(),
                    value,
                }))
                .unwrap_or(Value::Int(0)),
            Datatype::String(_) => Value::Str(String::new()),
            Datatype::Blob(_) => Value::Blob(Vec::new()),
            Datatype::Array(_) => Value::Array(Vec::new()),
            Datatype::Tuple(tt) => Value::Tuple(tt.elements.iter().map(Datatype::default_value).collect()),
            Datatype::Struct(st) => Value::Struct(
                st.members
                    .iter()
                    .map(|(k, v)| (k.clone(), v.default_value()))
                    .collect(),
            ),
            Datatype::Command(_) => Value::Tuple(vec![]),
            Datatype::Status(status) => Value::Tuple(vec![
                status.code_enum_datatype().default_value(),
                Value::Str(String::new()),
            ]),
            Datatype::Limit(lt) => Value::Tuple(vec![lt.element.default_value(), lt.element.default_value()]),
        }
    }

    /// Parse a user-facing textual form, as used by config assignment and
    /// a CLI collaborator. Composite types use a small comma/brace grammar;
    /// scalars parse directly.
    pub fn from_string(&self, s: &str) -> Result<Value, ValidationError> {
        let s = s.trim();
        match self {
            Datatype::FloatRange(_) | Datatype::Scaled(_) => {
                let f: f64 = s
                    .parse()
                    .map_err(|_| bad_value(format!("{s:?} is not a number")))?;
                self.validate(&Value::Double(f))
            }
            Datatype::IntRange(_) => {
                let i: i64 = s
                    .parse()
                    .map_err(|_| bad_value(format!("{s:?} is not an integer")))?;
                self.validate(&Value::Int(i))
            }
            Datatype::Bool(_) => self.validate(&Value::Str(s.to_string())),
            Datatype::Enum(_) => {
                if let Ok(i) = s.parse::<i64>() {
                    self.validate(&Value::Int(i))
                } else {
                    self.validate(&Value::Str(s.to_string()))
                }
            }
            Datatype::String(_) => self.validate(&Value::Str(s.to_string())),
            Datatype::Array(at) => {
                let inner = strip_braces(s, '[', ']').unwrap_or(s);
                let mut items = Vec::new();
                for part in split_top_level(inner) {
                    items.push(at.element.from_string(part.trim())?);
                }
                self.validate(&Value::Array(items))
            }
            Datatype::Tuple(tt) => {
                let inner = strip_braces(s, '(', ')').unwrap_or(s);
                let parts: Vec<&str> = split_top_level(inner);
                if parts.len() != tt.elements.len() {
                    return Err(bad_value(format!(
                        "expected {} comma-separated values, got {}",
                        tt.elements.len(),
                        parts.len()
                    )));
                }
                let mut items = Vec::new();
                for (dt, part) in tt.elements.iter().zip(parts) {
                    items.push(dt.from_string(part.trim())?);
                }
                self.validate(&Value::Tuple(items))
            }
            _ => Err(bad_value(
                "this datatype does not support textual parsing".to_string(),
            )),
        }
    }

    /// Can every value representable by `self` also be represented by
    /// `other`? Used to check that an overriding declaration narrows,
    /// never widens, an inherited parameter's datatype.
    #[must_use]
    pub fn compatible(&self, other: &Datatype) -> bool {
        match (self, other) {
            (Datatype::FloatRange(a), Datatype::FloatRange(b)) => a.min >= b.min && a.max <= b.max,
            (Datatype::FloatRange(a), Datatype::Scaled(b)) => {
                a.min >= b.min && a.max <= b.max && a.absolute_resolution >= b.scale
            }
            (Datatype::Scaled(a), Datatype::Scaled(b)) => a.min >= b.min && a.max <= b.max,
            (Datatype::Scaled(a), Datatype::FloatRange(b)) => a.min >= b.min && a.max <= b.max,
            (Datatype::IntRange(a), Datatype::IntRange(b)) => a.min >= b.min && a.max <= b.max,
            (Datatype::IntRange(a), Datatype::FloatRange(b)) => {
                (a.min as f64) >= b.min && (a.max as f64) <= b.max
            }
            (Datatype::IntRange(a), Datatype::Scaled(b)) => {
                (a.min as f64) >= b.min && (a.max as f64) <= b.max
            }
            (Datatype::IntRange(_), Datatype::Enum(_) | Datatype::Bool(_)) => true,
            (Datatype::Bool(_), Datatype::Bool(_)) => true,
            (Datatype::Enum(a), Datatype::Enum(b)) => {
                a.members().all(|(label, value)| b.by_label(label).map(|m| m.value) == Some(value))
            }
            (Datatype::String(a), Datatype::String(b)) => a.max_chars <= b.max_chars,
            (Datatype::Blob(a), Datatype::Blob(b)) => a.max_bytes <= b.max_bytes,
            (a, b) => a == b,
        }
    }
}

fn validate_string(s: &StringType, text: &str) -> Result<Value, ValidationError> {
    if text.contains('\0') {
        return Err(bad_value("string must not contain NUL".to_string()));
    }
    if !s.is_utf8 && !text.is_ascii() {
        return Err(bad_value("string is not ASCII".to_string()));
    }
    let len = text.chars().count();
    if len < s.min_chars || len > s.max_chars {
        return Err(range_error(len, format!("[{}, {}] chars", s.min_chars, s.max_chars)));
    }
    Ok(Value::Str(text.to_string()))
}

fn validate_tuple(elements: &[Datatype], items: &[Value]) -> Result<Value, ValidationError> {
    if elements.len() != items.len() {
        return Err(bad_value(format!(
            "tuple expects {} elements, got {}",
            elements.len(),
            items.len()
        )));
    }
    let mut out = Vec::with_capacity(items.len());
    for (dt, item) in elements.iter().zip(items) {
        out.push(dt.validate(item)?);
    }
    Ok(Value::Tuple(out))
}

fn validate_struct(st: &StructType, fields: &IndexMap<String, Value>) -> Result<Value, ValidationError> {
    for key in fields.keys() {
        if !st.members.contains_key(key) {
            return Err(bad_value(format!("struct has no member {key:?}")));
        }
    }
    let mut out = IndexMap::new();
    for (name, dt) in &st.members {
        match fields.get(name) {
            Some(v) => {
                out.insert(name.clone(), dt.validate(v)?);
            }
            None => {
                if !st.optional.iter().any(|o| o == name) {
                    return Err(bad_value(format!("struct is missing mandatory member {name:?}")));
                }
            }
        }
    }
    Ok(Value::Struct(out))
}

fn describe_float(type_name: &str, ft: &FloatRange) -> Json {
    let mut obj = json!({"type": type_name});
    if ft.min.is_finite() {
        obj["min"] = json!(ft.min);
    }
    if ft.max.is_finite() {
        obj["max"] = json!(ft.max);
    }
    if !ft.unit.is_empty() {
        obj["unit"] = json!(ft.unit);
    }
    if ft.fmtstr != "%g" {
        obj["fmtstr"] = json!(ft.fmtstr);
    }
    if ft.absolute_resolution != 0.0 {
        obj["absolute_resolution"] = json!(ft.absolute_resolution);
    }
    obj
}

fn json_number(f: f64) -> Json {
    serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number)
}

fn json_kind(j: &Json) -> &'static str {
    match j {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn strip_braces(s: &str, open: char, close: char) -> Option<&str> {
    let s = s.trim();
    if s.starts_with(open) && s.ends_with(close) && s.len() >= 2 {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

/// Split on top-level commas only (brace/bracket nesting is respected).
fn split_top_level(s: &str) -> Vec<&str> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

impl StatusType {
    fn code_enum_datatype(&self) -> Datatype {
        Datatype::Enum(self.code_enum.clone())
    }
}

/// Reconstruct a [`Datatype`] from its own [`Datatype::describe`] output.
/// Used by the configuration loader to parse datatype overrides written as
/// descriptive JSON rather than the shorthand `from_string` grammar.
pub fn get_datatype(j: &Json) -> Result<Datatype, ValidationError> {
    let obj = j.as_object().ok_or_else(|| wrong_type("datatype description (object)", json_kind(j)))?;
    let type_name = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| bad_value("datatype description is missing a \"type\" tag".to_string()))?;
    let num = |key: &str, default: f64| obj.get(key).and_then(Json::as_f64).unwrap_or(default);
    let int = |key: &str, default: i64| obj.get(key).and_then(Json::as_i64).unwrap_or(default);
    let text = |key: &str| obj.get(key).and_then(Json::as_str).map(str::to_string).unwrap_or_default();
    match type_name {
        "double" => Ok(Datatype::FloatRange(FloatRange {
            min: num("min", f64::NEG_INFINITY),
            max: num("max", f64::INFINITY),
            unit: text("unit"),
            fmtstr: if obj.contains_key("fmtstr") { text("fmtstr") } else { "%g".to_string() },
            absolute_resolution: num("absolute_resolution", 0.0),
            relative_resolution: 1.2e-7,
        })),
        "scaled" => Ok(Datatype::Scaled(ScaledInteger {
            scale: num("scale", 1.0),
            min: num("min", f64::NEG_INFINITY),
            max: num("max", f64::INFINITY),
            unit: text("unit"),
            fmtstr: if obj.contains_key("fmtstr") { text("fmtstr") } else { "%g".to_string() },
            absolute_resolution: num("absolute_resolution", 0.0),
            relative_resolution: 1.2e-7,
        })),
        "int" => Ok(Datatype::IntRange(IntRange {
            min: int("min", crate::types::DEFAULT_MIN_INT),
            max: int("max", crate::types::DEFAULT_MAX_INT),
        })),
        "bool" => Ok(Datatype::Bool(BoolType)),
        "enum" => {
            let members = obj
                .get("members")
                .and_then(Json::as_object)
                .ok_or_else(|| bad_value("enum description is missing \"members\"".to_string()))?;
            let mut et = EnumType::new("");
            for (label, value) in members {
                let value = value.as_i64().ok_or_else(|| wrong_type("int", json_kind(value)))?;
                et.declare(label, value)?;
            }
            Ok(Datatype::Enum(et))
        }
        "string" => Ok(Datatype::String(StringType {
            min_chars: obj.get("minchars").and_then(Json::as_u64).unwrap_or(0) as usize,
            max_chars: obj.get("maxchars").and_then(Json::as_u64).unwrap_or(255) as usize,
            is_utf8: obj.get("isUTF8").and_then(Json::as_bool).unwrap_or(false),
        })),
        "blob" => Ok(Datatype::Blob(BlobType {
            min_bytes: obj.get("minbytes").and_then(Json::as_u64).unwrap_or(0) as usize,
            max_bytes: obj.get("maxbytes").and_then(Json::as_u64).unwrap_or(255) as usize,
        })),
        "array" => {
            let element = obj.get("members").ok_or_else(|| bad_value("array description is missing \"members\"".to_string()))?;
            Ok(Datatype::Array(ArrayType {
                element: Box::new(get_datatype(element)?),
                min_len: obj.get("minlen").and_then(Json::as_u64).unwrap_or(0) as usize,
                max_len: obj.get("maxlen").and_then(Json::as_u64).unwrap_or(usize::MAX as u64) as usize,
            }))
        }
        "tuple" => {
            let members = obj
                .get("members")
                .and_then(Json::as_array)
                .ok_or_else(|| bad_value("tuple description is missing \"members\"".to_string()))?;
            let elements = members.iter().map(get_datatype).collect::<Result<Vec<_>, _>>()?;
            Ok(Datatype::Tuple(TupleType { elements }))
        }
        "struct" => {
            let members = obj
                .get("members")
                .and_then(Json::as_object)
                .ok_or_else(|| bad_value("struct description is missing \"members\"".to_string()))?;
            let mut out = IndexMap::new();
            for (name, dt) in members {
                out.insert(name.clone(), get_datatype(dt)?);
            }
            let optional = obj
                .get("optional")
                .and_then(Json::as_array)
                .map(|arr| arr.iter().filter_map(Json::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            Ok(Datatype::Struct(StructType { members: out, optional }))
        }
        "command" => {
            let argument = match obj.get("argument") {
                Some(Json::Null) | None => None,
                Some(v) => Some(Box::new(get_datatype(v)?)),
            };
            let result = match obj.get("result") {
                Some(Json::Null) | None => None,
                Some(v) => Some(Box::new(get_datatype(v)?)),
            };
            Ok(Datatype::Command(CommandType { argument, result }))
        }
        "limit" => {
            let element = obj.get("members").ok_or_else(|| bad_value("limit description is missing \"members\"".to_string()))?;
            Ok(Datatype::Limit(LimitType { element: Box::new(get_datatype(element)?) }))
        }
        other => Err(bad_value(format!("unknown datatype tag {other:?}"))),
    }
}

#[cfg(test)]
mod get_datatype_tests {
    use super::*;
    use crate::types::IntRange;

    #[test]
    fn float_range_round_trips_through_describe() {
        let dt = Datatype::FloatRange(FloatRange::new(0.0, 100.0).with_unit("K"));
        let rebuilt = get_datatype(&dt.describe()).unwrap();
        assert_eq!(rebuilt, dt);
    }

    #[test]
    fn int_range_round_trips_through_describe() {
        let dt = Datatype::IntRange(IntRange::new(-5, 5));
        assert_eq!(get_datatype(&dt.describe()).unwrap(), dt);
    }

    #[test]
    fn struct_round_trips_with_optional_members() {
        let mut members = IndexMap::new();
        members.insert("a".to_string(), Datatype::Bool(BoolType));
        members.insert("b".to_string(), Datatype::IntRange(IntRange::default()));
        let dt = Datatype::Struct(StructType::new(members).with_optional(["b"]));
        assert_eq!(get_datatype(&dt.describe()).unwrap(), dt);
    }

    #[test]
    fn unknown_type_tag_is_a_bad_value_error() {
        let err = get_datatype(&json!({"type": "frobnicate"})).unwrap_err();
        assert!(matches!(err, ValidationError::BadValue(_)));
    }
}
