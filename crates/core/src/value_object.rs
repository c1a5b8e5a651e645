//! Values without identity.

/// Marker for types compared by their contents (amounts, account ids, refs).
///
/// Such values are never mutated in place; a new amount replaces the old one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
