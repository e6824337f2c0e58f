use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shape::{BindingRecord, ShapeRecord};

/// Axis-aligned rectangle in canvas coordinates.
///
/// The default is the fixed `0, 0, 1000, 1000` frame used whenever a caller
/// does not supply bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Bounds {
    pub const DEFAULT_FRAME: Bounds = Bounds {
        x: 0.0,
        y: 0.0,
        w: 1000.0,
        h: 1000.0,
    };

    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Whether the two rectangles overlap or touch.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x <= other.x + other.w
            && other.x <= self.x + self.w
            && self.y <= other.y + other.h
            && other.y <= self.y + self.h
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.w).max(other.x + other.w);
        let bottom = (self.y + self.h).max(other.y + other.h);
        Bounds::new(x, y, right - x, bottom - y)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::DEFAULT_FRAME
    }
}

/// Records visible to the model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasContent {
    #[serde(default)]
    pub shapes: Vec<ShapeRecord>,
    #[serde(default)]
    pub bindings: Vec<BindingRecord>,
    #[serde(default)]
    pub assets: Vec<Value>,
}

impl CanvasContent {
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty() && self.bindings.is_empty() && self.assets.is_empty()
    }

    pub fn shape(&self, id: &crate::ShapeId) -> Option<&ShapeRecord> {
        self.shapes.iter().find(|s| &s.id == id)
    }

    pub fn has_binding(&self, id: &crate::BindingId) -> bool {
        self.bindings.iter().any(|b| &b.id == id)
    }
}

/// One request to the model: text, optional canvas image, frames and content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    #[serde(default)]
    pub message: String,
    /// Rasterized canvas as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub prompt_bounds: Bounds,
    #[serde(default)]
    pub context_bounds: Bounds,
    #[serde(default)]
    pub canvas_content: CanvasContent,
}

impl Prompt {
    /// Text-only prompt over the default frame.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Body accepted by the unified `/process` route.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub drawing_image: Option<String>,
    /// Accepted for compatibility; the unified route never streams.
    #[serde(default)]
    pub stream: bool,
}

impl From<ProcessRequest> for Prompt {
    fn from(req: ProcessRequest) -> Self {
        Prompt {
            message: req.message,
            image: req.drawing_image.filter(|s| !s.is_empty()),
            ..Prompt::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_bounds_default_to_fixed_frame() {
        let p: Prompt = serde_json::from_value(json!({ "message": "hi" })).unwrap();
        assert_eq!(p.prompt_bounds, Bounds::DEFAULT_FRAME);
        assert_eq!(p.context_bounds, Bounds::DEFAULT_FRAME);
        assert!(p.canvas_content.is_empty());
    }

    #[test]
    fn process_request_builds_default_prompt() {
        let req: ProcessRequest =
            serde_json::from_value(json!({ "message": "draw", "drawingImage": "" })).unwrap();
        let prompt = Prompt::from(req);
        assert_eq!(prompt.message, "draw");
        assert_eq!(prompt.image, None);
        assert_eq!(prompt.prompt_bounds, Bounds::new(0.0, 0.0, 1000.0, 1000.0));
    }

    #[test]
    fn intersection_includes_touching_edges() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Bounds::new(10.0, 10.0, 5.0, 5.0)));
        assert!(!a.intersects(&Bounds::new(11.0, 0.0, 5.0, 5.0)));
        assert_eq!(a.union(&Bounds::new(20.0, 5.0, 5.0, 10.0)), Bounds::new(0.0, 0.0, 25.0, 15.0));
    }
}
