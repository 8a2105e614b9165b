//! Concrete datatype payloads. Each struct here is one variant's
//! properties; [`crate::Datatype`] is the tagged union over all of them.

use indexmap::IndexMap;

use crate::EnumType;

/// Default lower bound for an unconstrained [`IntRange`], matching the
/// original implementation's `DEFAULT_MIN_INT`.
pub const DEFAULT_MIN_INT: i64 = -16_777_216;
/// Default upper bound for an unconstrained [`IntRange`], matching the
/// original implementation's `DEFAULT_MAX_INT`.
pub const DEFAULT_MAX_INT: i64 = 16_777_216;

/// A floating point value with optional bounds and tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub fmtstr: String,
    pub absolute_resolution: f64,
    pub relative_resolution: f64,
}

impl Default for FloatRange {
    fn default() -> Self {
        FloatRange {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            unit: String::new(),
            fmtstr: "%g".to_string(),
            absolute_resolution: 0.0,
            relative_resolution: 1.2e-7,
        }
    }
}

impl FloatRange {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        FloatRange {
            min,
            max,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, absolute: f64, relative: f64) -> Self {
        self.absolute_resolution = absolute;
        self.relative_resolution = relative;
        self
    }

    /// `epsilon = max(|v|*relative_resolution, absolute_resolution)`.
    #[must_use]
    pub fn tolerance(&self, v: f64) -> f64 {
        (v.abs() * self.relative_resolution).max(self.absolute_resolution)
    }
}

/// An integer value with bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntRange {
    pub min: i64,
    pub max: i64,
}

impl Default for IntRange {
    fn default() -> Self {
        IntRange {
            min: DEFAULT_MIN_INT,
            max: DEFAULT_MAX_INT,
        }
    }
}

impl IntRange {
    #[must_use]
    pub fn new(min: i64, max: i64) -> Self {
        IntRange { min, max }
    }
}

/// A fixed-point float, transported on the wire as a scaled integer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledInteger {
    pub scale: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub fmtstr: String,
    pub absolute_resolution: f64,
    pub relative_resolution: f64,
}

impl ScaledInteger {
    #[must_use]
    pub fn new(scale: f64, min: f64, max: f64) -> Self {
        ScaledInteger {
            scale,
            min,
            max,
            unit: String::new(),
            fmtstr: "%g".to_string(),
            // absolute_resolution defaults to scale unless explicitly overridden
            absolute_resolution: scale,
            relative_resolution: 1.2e-7,
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// `epsilon = max(|v|*relative_resolution, absolute_resolution, scale)`.
    #[must_use]
    pub fn tolerance(&self, v: f64) -> f64 {
        (v.abs() * self.relative_resolution)
            .max(self.absolute_resolution)
            .max(self.scale)
    }

    /// Round-half-up to the nearest multiple of `scale`, as SECoP's scaled-integer encoding
    /// does via `floor((value/scale) + 0.5)`.
    #[must_use]
    pub fn round_to_scale(&self, v: f64) -> f64 {
        let n = ((v / self.scale) + 0.5).floor();
        n * self.scale
    }

    /// The integer actually transported on the wire for a physical value.
    #[must_use]
    pub fn to_raw(&self, v: f64) -> i64 {
        ((v / self.scale) + 0.5).floor() as i64
    }

    #[must_use]
    pub fn from_raw(&self, raw: i64) -> f64 {
        raw as f64 * self.scale
    }
}

/// A boolean, accepting a handful of legacy textual/numeric spellings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoolType;

/// A UTF-8 (or ASCII-only) string with bounds. `max_chars = usize::MAX`
/// and `is_utf8 = true` models SECoP's separate, longer-form
/// `TextType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringType {
    pub min_chars: usize,
    pub max_chars: usize,
    pub is_utf8: bool,
}

impl Default for StringType {
    fn default() -> Self {
        StringType {
            min_chars: 0,
            max_chars: 255,
            is_utf8: false,
        }
    }
}

impl StringType {
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        StringType {
            max_chars,
            ..Default::default()
        }
    }

    /// A long-form, unbounded, UTF-8 text field.
    #[must_use]
    pub fn text() -> Self {
        StringType {
            min_chars: 0,
            max_chars: usize::MAX,
            is_utf8: true,
        }
    }
}

/// Raw bytes with bounds (base64 on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobType {
    pub min_bytes: usize,
    pub max_bytes: usize,
}

impl Default for BlobType {
    fn default() -> Self {
        BlobType {
            min_bytes: 0,
            max_bytes: 255,
        }
    }
}

impl BlobType {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        BlobType {
            max_bytes,
            ..Default::default()
        }
    }
}

/// A homogeneous, bounded-length sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub element: Box<crate::Datatype>,
    pub min_len: usize,
    pub max_len: usize,
}

impl ArrayType {
    #[must_use]
    pub fn new(element: crate::Datatype, max_len: usize) -> Self {
        ArrayType {
            element: Box::new(element),
            min_len: 0,
            max_len,
        }
    }
}

/// A fixed-length, heterogeneous, positional sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleType {
    pub elements: Vec<crate::Datatype>,
}

impl TupleType {
    #[must_use]
    pub fn new(elements: Vec<crate::Datatype>) -> Self {
        TupleType { elements }
    }
}

/// A named-member record type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub members: IndexMap<String, crate::Datatype>,
    pub optional: Vec<String>,
}

impl StructType {
    #[must_use]
    pub fn new(members: IndexMap<String, crate::Datatype>) -> Self {
        StructType {
            members,
            optional: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_optional(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.optional = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A command's argument/result shape. Commands are never themselves
/// transported as a value: calling `validate`/`export_value` on one is a
/// programming error.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandType {
    pub argument: Option<Box<crate::Datatype>>,
    pub result: Option<Box<crate::Datatype>>,
}

impl CommandType {
    #[must_use]
    pub fn new(argument: Option<crate::Datatype>, result: Option<crate::Datatype>) -> Self {
        CommandType {
            argument: argument.map(Box::new),
            result: result.map(Box::new),
        }
    }
}

/// `(code, text)` — a Tuple specialisation used by every Readable/Drivable
/// module's `status` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusType {
    pub code_enum: EnumType,
}

impl StatusType {
    #[must_use]
    pub fn new(code_enum: EnumType) -> Self {
        StatusType { code_enum }
    }

    /// The standard Readable/Drivable status enum.
    #[must_use]
    pub fn standard() -> Self {
        StatusType::new(crate::status::standard_status_enum())
    }
}

/// `(lower, upper)` with `lower <= upper`, both of the same element type.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitType {
    pub element: Box<crate::Datatype>,
}

impl LimitType {
    #[must_use]
    pub fn new(element: crate::Datatype) -> Self {
        LimitType {
            element: Box::new(element),
        }
    }
}
