//! Field-by-field comparison of status snapshots.

use crate::status::StatusSnapshot;
use crate::value::Value;

/// A status field whose value differs from the previous snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Value in the newer snapshot.
    pub value: Value,
}

/// Lists the fields of `next` whose value differs from `previous`, in the
/// order `next` reports them.
///
/// Fields present only in `previous` produce no change.
#[must_use]
pub fn diff_snapshots(previous: &StatusSnapshot, next: &StatusSnapshot) -> Vec<FieldChange> {
    next.iter()
        .filter(|(field, value)| previous.get(field) != Some(*value))
        .map(|(field, value)| FieldChange {
            field: field.to_owned(),
            value: value.clone(),
        })
        .collect()
}
