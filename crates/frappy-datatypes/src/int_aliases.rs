//! Named bit-width convenience constructors for [`crate::Datatype::IntRange`],
//! matching SECoP's `Int8`..`Int64`/`UInt8`..`UInt64`
//! shorthands. These are plain functions, not additional enum variants: an
//! `Int16` parameter is, on the wire and in `describe()`, an ordinary `int`
//! with the matching bounds.

use crate::types::IntRange;
use crate::Datatype;

macro_rules! signed_alias {
    ($name:ident, $ty:ty) => {
        #[must_use]
        pub fn $name() -> Datatype {
            Datatype::IntRange(IntRange::new(<$ty>::MIN as i64, <$ty>::MAX as i64))
        }
    };
}

macro_rules! unsigned_alias {
    ($name:ident, $ty:ty) => {
        #[must_use]
        pub fn $name() -> Datatype {
            Datatype::IntRange(IntRange::new(0, <$ty>::MAX as i64))
        }
    };
}

signed_alias!(int8, i8);
signed_alias!(int16, i16);
signed_alias!(int32, i32);
signed_alias!(int64, i64);
unsigned_alias!(uint8, u8);
unsigned_alias!(uint16, u16);
unsigned_alias!(uint32, u32);
// u64's full range does not fit in i64; this caps at i64::MAX.
#[must_use]
pub fn uint64() -> Datatype {
    Datatype::IntRange(IntRange::new(0, i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn int8_matches_signed_byte_bounds() {
        let dt = int8();
        assert!(dt.validate(&Value::Int(-128)).is_ok());
        assert!(dt.validate(&Value::Int(127)).is_ok());
        assert!(dt.validate(&Value::Int(128)).is_err());
    }

    #[test]
    fn uint16_rejects_negative_values() {
        let dt = uint16();
        assert!(dt.validate(&Value::Int(0)).is_ok());
        assert!(dt.validate(&Value::Int(65535)).is_ok());
        assert!(dt.validate(&Value::Int(-1)).is_err());
    }
}
