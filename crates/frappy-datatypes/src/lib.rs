//! The SECoP type system: datatype instances that validate values, import
//! and export them to/from JSON, and describe themselves for the
//! `describe` wire message.

mod datatype;
mod enum_type;
mod error;
pub mod int_aliases;
pub mod status;
mod types;
mod value;

pub use datatype::{get_datatype, Datatype};
pub use enum_type::EnumType;
pub use error::ValidationError;
pub use types::{
    ArrayType, BlobType, BoolType, CommandType, FloatRange, IntRange, LimitType, ScaledInteger,
    StatusType, StringType, StructType, TupleType, DEFAULT_MAX_INT, DEFAULT_MIN_INT,
};
pub use value::{EnumMember, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enum_round_trip_s1() {
        let et = EnumType::from_members("Status", &[("IDLE", 100), ("BUSY", 300)]);
        let dt = Datatype::Enum(et);

        let exported = dt.export_value(&Value::Enum(EnumMember {
            label: "BUSY".into(),
            value: 300,
        }));
        assert_eq!(exported, json!(300));

        let imported = dt.import_value(&json!(300)).unwrap();
        assert_eq!(
            imported,
            Value::Enum(EnumMember {
                label: "BUSY".into(),
                value: 300
            })
        );

        let err = dt.validate(&Value::Str("busy".into())).unwrap_err();
        assert_eq!(err.kind(), "BadValue");
    }

    #[test]
    fn scaled_write_s2() {
        let dt = Datatype::Scaled(ScaledInteger::new(0.01, 0.0, 100.0));
        let validated = dt.validate(&Value::Double(1.234)).unwrap();
        assert_eq!(validated, Value::Double(1.23));
        let exported = dt.export_value(&validated);
        assert!((exported.as_f64().unwrap() - 1.23).abs() < 1e-9);
    }

    #[test]
    fn float_range_clamps_and_tolerates() {
        let dt = Datatype::FloatRange(FloatRange::new(0.0, 10.0).with_resolution(1e-6, 0.0));
        assert_eq!(dt.validate(&Value::Double(5.0)).unwrap(), Value::Double(5.0));
        // just inside tolerance of the upper bound
        assert!(dt.validate(&Value::Double(10.0 + 5e-7)).is_ok());
        assert!(dt.validate(&Value::Double(11.0)).is_err());
    }

    #[test]
    fn int_range_default_bounds() {
        let dt = Datatype::IntRange(IntRange::default());
        assert!(dt.validate(&Value::Int(DEFAULT_MAX_INT)).is_ok());
        assert!(dt.validate(&Value::Int(DEFAULT_MAX_INT + 1)).is_err());
    }

    #[test]
    fn bool_accepts_legacy_spellings() {
        let dt = Datatype::Bool(BoolType);
        assert_eq!(dt.validate(&Value::Str("yes".into())).unwrap(), Value::Bool(true));
        assert_eq!(dt.validate(&Value::Str("off".into())).unwrap(), Value::Bool(false));
        assert!(dt.validate(&Value::Str("maybe".into())).is_err());
    }

    #[test]
    fn string_rejects_nul_and_enforces_ascii() {
        let dt = Datatype::String(StringType::new(10));
        assert!(dt.validate(&Value::Str("ok".into())).is_ok());
        assert!(dt.validate(&Value::Str("a\0b".into())).is_err());
        assert!(dt.validate(&Value::Str("café".into())).is_err());
        let utf8 = Datatype::String(StringType::text());
        assert!(utf8.validate(&Value::Str("café".into())).is_ok());
    }

    #[test]
    fn blob_base64_round_trip() {
        let dt = Datatype::Blob(BlobType::new(16));
        let v = Value::Blob(vec![1, 2, 3]);
        let exported = dt.export_value(&v);
        let imported = dt.import_value(&exported).unwrap();
        assert_eq!(imported, v);
    }

    #[test]
    fn array_validates_each_element_and_bounds() {
        let dt = Datatype::Array(ArrayType::new(Datatype::IntRange(IntRange::new(0, 10)), 3));
        let ok = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert!(dt.validate(&ok).is_ok());
        let too_long = Value::Array(vec![Value::Int(1); 4]);
        assert!(dt.validate(&too_long).is_err());
        let bad_element = Value::Array(vec![Value::Int(99)]);
        assert!(dt.validate(&bad_element).is_err());
    }

    #[test]
    fn struct_requires_mandatory_members_only() {
        let mut members = indexmap::IndexMap::new();
        members.insert("p".to_string(), Datatype::FloatRange(FloatRange::default()));
        members.insert("i".to_string(), Datatype::FloatRange(FloatRange::default()));
        let dt = Datatype::Struct(StructType::new(members).with_optional(["i"]));

        let mut fields = indexmap::IndexMap::new();
        fields.insert("p".to_string(), Value::Double(1.0));
        assert!(dt.validate(&Value::Struct(fields.clone())).is_ok());

        fields.remove("p");
        assert!(dt.validate(&Value::Struct(fields)).is_err());
    }

    #[test]
    fn struct_rejects_unknown_member() {
        let mut members = indexmap::IndexMap::new();
        members.insert("p".to_string(), Datatype::FloatRange(FloatRange::default()));
        let dt = Datatype::Struct(StructType::new(members));

        let mut fields = indexmap::IndexMap::new();
        fields.insert("p".to_string(), Value::Double(1.0));
        fields.insert("extra".to_string(), Value::Double(2.0));
        assert!(dt.validate(&Value::Struct(fields)).is_err());
    }

    #[test]
    fn status_is_a_tuple_of_enum_and_string() {
        let dt = Datatype::Status(StatusType::standard());
        let v = Value::Tuple(vec![
            Value::Enum(EnumMember {
                label: "IDLE".into(),
                value: 100,
            }),
            Value::Str(String::new()),
        ]);
        assert!(dt.validate(&v).is_ok());
        let exported = dt.export_value(&v);
        assert_eq!(exported, json!([100, ""]));
    }

    #[test]
    fn limit_enforces_lower_le_upper() {
        let dt = Datatype::Limit(LimitType::new(Datatype::FloatRange(FloatRange::default())));
        let ok = Value::Tuple(vec![Value::Double(0.0), Value::Double(10.0)]);
        assert!(dt.validate(&ok).is_ok());
        let bad = Value::Tuple(vec![Value::Double(10.0), Value::Double(0.0)]);
        assert!(dt.validate(&bad).is_err());
    }

    #[test]
    fn from_string_parses_tuples_and_arrays() {
        let dt = Datatype::Tuple(TupleType::new(vec![
            Datatype::IntRange(IntRange::default()),
            Datatype::String(StringType::default()),
        ]));
        let v = dt.from_string("(1, hello)").unwrap();
        assert_eq!(v, Value::Tuple(vec![Value::Int(1), Value::Str("hello".into())]));
    }

    #[test]
    fn compatible_checks_narrowing() {
        let wide = Datatype::FloatRange(FloatRange::new(-100.0, 100.0));
        let narrow = Datatype::FloatRange(FloatRange::new(0.0, 10.0));
        assert!(narrow.compatible(&wide));
        assert!(!wide.compatible(&narrow));
    }

    #[test]
    fn describe_round_trips_through_datatype_shape() {
        let dt = Datatype::Enum(EnumType::from_members("Visibility", &[("user", 1), ("expert", 3)]));
        let json = dt.describe();
        assert_eq!(json["type"], "enum");
    }
}
