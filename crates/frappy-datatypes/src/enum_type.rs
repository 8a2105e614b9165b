use indexmap::IndexMap;

use crate::error::{bad_value, ValidationError};
use crate::value::EnumMember;

/// A named, ordered set of (label, integer) members.
///
/// Inheriting an enum (building a new one from an existing one plus more
/// members) must keep previously-assigned integers stable: re-declaring a
/// label with a different value is a construction error, not silently
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    by_label: IndexMap<String, i64>,
}

impl EnumType {
    /// An empty enum with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        EnumType {
            name: name.into(),
            by_label: IndexMap::new(),
        }
    }

    /// Build from an ordered list of `(label, value)` pairs. Panics on
    /// duplicate labels with differing values, since that can only happen
    /// from a programming error in the module declaration.
    #[must_use]
    pub fn from_members(name: impl Into<String>, members: &[(&str, i64)]) -> Self {
        let mut et = EnumType::new(name);
        for (label, value) in members {
            et.declare(label, *value)
                .expect("duplicate enum label with conflicting value");
        }
        et
    }

    /// Name of this enum, used in error messages and in `describe()`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare one member. Re-declaring an existing label with the *same*
    /// value is a no-op (inheritance extending a base enum); re-declaring
    /// with a different value is rejected.
    pub fn declare(&mut self, label: &str, value: i64) -> Result<(), ValidationError> {
        if let Some(&existing) = self.by_label.get(label) {
            if existing != value {
                return Err(bad_value(format!(
                    "enum {}: label '{label}' already assigned to {existing}, cannot reassign to {value}",
                    self.name
                )));
            }
            return Ok(());
        }
        self.by_label.insert(label.to_string(), value);
        Ok(())
    }

    /// Members in declaration order.
    pub fn members(&self) -> impl Iterator<Item = (&str, i64)> {
        self.by_label.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Resolve by label.
    #[must_use]
    pub fn by_label(&self, label: &str) -> Option<EnumMember> {
        self.by_label.get(label).map(|&value| EnumMember {
            label: label.to_string(),
            value,
        })
    }

    /// Resolve by integer value (first label with this value wins).
    #[must_use]
    pub fn by_value(&self, value: i64) -> Option<EnumMember> {
        self.by_label
            .iter()
            .find(|(_, &v)| v == value)
            .map(|(label, &value)| EnumMember {
                label: label.clone(),
                value,
            })
    }

    /// `true` if this enum has no declared members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}
