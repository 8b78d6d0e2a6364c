//! Serde helpers shared across the config model.

/// `skip_serializing_if` helper for plain booleans.
pub(crate) fn is_false(value: &bool) -> bool {
    !value
}
