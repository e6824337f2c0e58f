//! Replays decoded changes against a live document.

use tracing::{debug, warn};

use crate::change::Change;
use crate::document::{Document, DocumentError};

/// A change the document refused.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyFailure {
    /// Position of the change in the applied batch.
    pub index: usize,
    pub change: Change,
    pub error: DocumentError,
}

/// Outcome of applying a batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies one change.
pub fn apply_one(document: &mut dyn Document, change: &Change) -> Result<(), DocumentError> {
    match change {
        Change::CreateShape { shape, .. } => document.create_shape(shape.clone()),
        Change::UpdateShape { shape, .. } => document.update_shape(shape.clone()),
        Change::DeleteShape { shape_id, .. } => document.delete_shape(shape_id),
        Change::CreateBinding { binding, .. } => document.create_binding(binding.clone()),
        Change::DeleteBinding { binding_id, .. } => document.delete_binding(binding_id),
    }
}

/// Applies `changes` strictly in order.
///
/// A rejected change is logged and recorded; it never stops the changes
/// after it.
pub fn apply(document: &mut dyn Document, changes: &[Change]) -> ApplyReport {
    let mut report = ApplyReport::default();
    for (index, change) in changes.iter().enumerate() {
        match apply_one(document, change) {
            Ok(()) => report.applied += 1,
            Err(error) => {
                warn!(
                    index,
                    kind = change.kind(),
                    id = change.target(),
                    %error,
                    "change rejected by document"
                );
                report.failures.push(ApplyFailure {
                    index,
                    change: change.clone(),
                    error,
                });
            }
        }
    }
    debug!(
        applied = report.applied,
        failed = report.failures.len(),
        version = document.version(),
        "changes applied"
    );
    report
}
