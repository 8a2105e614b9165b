//! The wire-protocol error kind for a [`SecopError`], one of the fixed
//! strings `NoSuchModule`, `NoSuchParameter`, `NoSuchCommand`,
//! `ReadOnly`, `BadValue`, `CommFailed`, `IsBusy`, `IsError`, `Disabled`,
//! `Impossible`, `ProtocolError`, `Internal`. The mapping itself lives on
//! [`SecopError::kind`] (so the synchronous `error_<action>` reply path
//! here and the asynchronous `error_update` path in `dispatcher.rs` can
//! never disagree on a kind string); this module just re-exports it
//! under the wire-facing name call sites in this crate use.

use frappy_core::SecopError;

/// The wire-protocol error kind for `err`. See the module docs for the
/// fixed set of strings this returns.
#[must_use]
pub fn wire_kind(err: &SecopError) -> &'static str {
    err.kind()
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_datatypes::ValidationError;

    #[test]
    fn hardware_error_maps_to_is_error() {
        assert_eq!(wire_kind(&SecopError::HardwareError("stuck".into())), "IsError");
    }

    #[test]
    fn programming_error_is_reported_as_internal_to_clients() {
        assert_eq!(wire_kind(&SecopError::ProgrammingError("oops".into())), "Internal");
    }

    #[test]
    fn wrong_type_and_range_error_both_collapse_to_bad_value() {
        let wrong_type = SecopError::BadValue(ValidationError::WrongType {
            expected: "double".into(),
            got: "string".into(),
        });
        let range = SecopError::BadValue(ValidationError::RangeError {
            value: "11".into(),
            bounds: "[0,10]".into(),
        });
        assert_eq!(wire_kind(&wrong_type), "BadValue");
        assert_eq!(wire_kind(&range), "BadValue");
    }
}
