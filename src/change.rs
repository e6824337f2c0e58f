use serde::{Deserialize, Serialize};

use crate::shape::{BindingId, BindingRecord, ShapeId, ShapePatch, ShapeRecord};

/// A concrete document mutation decoded from a model event.
///
/// `description` carries the intent of the event it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Change {
    CreateShape {
        description: String,
        shape: ShapeRecord,
    },
    UpdateShape {
        description: String,
        shape: ShapePatch,
    },
    #[serde(rename_all = "camelCase")]
    DeleteShape {
        description: String,
        shape_id: ShapeId,
    },
    CreateBinding {
        description: String,
        binding: BindingRecord,
    },
    #[serde(rename_all = "camelCase")]
    DeleteBinding {
        description: String,
        binding_id: BindingId,
    },
}

impl Change {
    pub fn description(&self) -> &str {
        match self {
            Change::CreateShape { description, .. }
            | Change::UpdateShape { description, .. }
            | Change::DeleteShape { description, .. }
            | Change::CreateBinding { description, .. }
            | Change::DeleteBinding { description, .. } => description,
        }
    }

    /// Wire name of the change type.
    pub fn kind(&self) -> &'static str {
        match self {
            Change::CreateShape { .. } => "createShape",
            Change::UpdateShape { .. } => "updateShape",
            Change::DeleteShape { .. } => "deleteShape",
            Change::CreateBinding { .. } => "createBinding",
            Change::DeleteBinding { .. } => "deleteBinding",
        }
    }

    /// Id of the shape or binding this change touches.
    pub fn target(&self) -> &str {
        match self {
            Change::CreateShape { shape, .. } => shape.id.as_str(),
            Change::UpdateShape { shape, .. } => shape.id.as_str(),
            Change::DeleteShape { shape_id, .. } => shape_id.as_str(),
            Change::CreateBinding { binding, .. } => binding.id.as_str(),
            Change::DeleteBinding { binding_id, .. } => binding_id.as_str(),
        }
    }
}

/// Changes produced by one `generate` call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerateResult {
    pub changes: Vec<Change>,
}
