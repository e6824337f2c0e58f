//! Simple Events: the drawing vocabulary the model emits.
//!
//! These types mirror the loose JSON the model writes. Unknown tags land in
//! explicit `Unknown` arms so the decoder can skip them without failing.

use serde::Deserialize;

use crate::shape::{Color, Fill, TextAlign, Terminal};

/// One drawing intent emitted by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SimpleEvent {
    Think {
        #[serde(default)]
        intent: String,
        #[serde(default)]
        text: String,
    },
    Create {
        #[serde(default)]
        intent: String,
        #[serde(default)]
        shape: Option<ShapeDescriptor>,
        #[serde(default)]
        binding: Option<BindingDescriptor>,
    },
    Update {
        #[serde(default)]
        intent: String,
        #[serde(default)]
        shape: Option<ShapeDescriptor>,
        #[serde(default)]
        binding: Option<BindingDescriptor>,
    },
    Move {
        #[serde(default)]
        intent: String,
        #[serde(rename = "shapeId", alias = "id")]
        shape_id: String,
        x: f64,
        y: f64,
    },
    Delete {
        #[serde(default)]
        intent: String,
        #[serde(default, rename = "shapeId", alias = "id")]
        shape_id: Option<String>,
        #[serde(default, rename = "bindingId")]
        binding_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl SimpleEvent {
    pub fn intent(&self) -> &str {
        match self {
            SimpleEvent::Think { intent, .. }
            | SimpleEvent::Create { intent, .. }
            | SimpleEvent::Update { intent, .. }
            | SimpleEvent::Move { intent, .. }
            | SimpleEvent::Delete { intent, .. } => intent,
            SimpleEvent::Unknown => "",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SimpleEvent::Think { .. } => "think",
            SimpleEvent::Create { .. } => "create",
            SimpleEvent::Update { .. } => "update",
            SimpleEvent::Move { .. } => "move",
            SimpleEvent::Delete { .. } => "delete",
            SimpleEvent::Unknown => "unknown",
        }
    }
}

/// Flat shape description as written by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeDescriptor {
    Rectangle(BoxShape),
    Ellipse(BoxShape),
    Cloud(BoxShape),
    Text(TextShape),
    Note(NoteShape),
    Line(SegmentShape),
    Arrow(ArrowShape),
    #[serde(other)]
    Unknown,
}

impl ShapeDescriptor {
    /// Raw model id, if one was given.
    pub fn shape_id(&self) -> Option<&str> {
        match self {
            ShapeDescriptor::Rectangle(s)
            | ShapeDescriptor::Ellipse(s)
            | ShapeDescriptor::Cloud(s) => s.shape_id.as_deref(),
            ShapeDescriptor::Text(s) => s.shape_id.as_deref(),
            ShapeDescriptor::Note(s) => s.shape_id.as_deref(),
            ShapeDescriptor::Line(s) => s.shape_id.as_deref(),
            ShapeDescriptor::Arrow(s) => s.segment.shape_id.as_deref(),
            ShapeDescriptor::Unknown => None,
        }
    }

    /// Free-text note attached to the shape.
    pub fn note(&self) -> Option<&str> {
        let note = match self {
            ShapeDescriptor::Rectangle(s)
            | ShapeDescriptor::Ellipse(s)
            | ShapeDescriptor::Cloud(s) => &s.note,
            ShapeDescriptor::Text(s) => &s.note,
            ShapeDescriptor::Note(s) => &s.note,
            ShapeDescriptor::Line(s) => &s.note,
            ShapeDescriptor::Arrow(s) => &s.segment.note,
            ShapeDescriptor::Unknown => &None,
        };
        note.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Rectangle, ellipse or cloud.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxShape {
    #[serde(default, alias = "id")]
    pub shape_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub fill: Fill,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextShape {
    #[serde(default, alias = "id")]
    pub shape_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub text_align: TextAlign,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteShape {
    #[serde(default, alias = "id")]
    pub shape_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub text: String,
}

/// Straight line between two absolute points.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentShape {
    #[serde(default, alias = "id")]
    pub shape_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(default)]
    pub color: Color,
}

/// Segment with an arrowhead, optionally attached to shapes at either end.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowShape {
    #[serde(flatten)]
    pub segment: SegmentShape,
    #[serde(default)]
    pub from_id: Option<String>,
    #[serde(default)]
    pub to_id: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Explicit binding between an arrow end and a shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingDescriptor {
    #[serde(default, alias = "id")]
    pub binding_id: Option<String>,
    pub from_id: String,
    pub to_id: String,
    #[serde(default)]
    pub terminal: Terminal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tags_decode_to_unknown() {
        let ev: SimpleEvent = serde_json::from_value(json!({ "type": "explode" })).unwrap();
        assert_eq!(ev, SimpleEvent::Unknown);
        let shape: ShapeDescriptor =
            serde_json::from_value(json!({ "type": "hexagon", "x": 1 })).unwrap();
        assert_eq!(shape, ShapeDescriptor::Unknown);
    }

    #[test]
    fn arrow_flattens_segment_fields() {
        let shape: ShapeDescriptor = serde_json::from_value(json!({
            "type": "arrow",
            "shapeId": "a1",
            "x1": 0, "y1": 0, "x2": 10, "y2": 5,
            "fromId": "box",
            "color": "light-blue"
        }))
        .unwrap();
        let ShapeDescriptor::Arrow(arrow) = shape else {
            panic!("expected arrow");
        };
        assert_eq!(arrow.segment.shape_id.as_deref(), Some("a1"));
        assert_eq!(arrow.segment.color, Color::LightBlue);
        assert_eq!(arrow.from_id.as_deref(), Some("box"));
        assert_eq!(arrow.to_id, None);
    }

    #[test]
    fn missing_geometry_is_an_error() {
        let res = serde_json::from_value::<ShapeDescriptor>(json!({
            "type": "rectangle", "x": 1, "y": 2
        }));
        assert!(res.is_err());
    }

    #[test]
    fn move_accepts_id_alias() {
        let ev: SimpleEvent = serde_json::from_value(json!({
            "type": "move", "id": "box", "x": 3, "y": 4, "intent": "nudge"
        }))
        .unwrap();
        assert_eq!(ev.kind(), "move");
        assert_eq!(ev.intent(), "nudge");
    }
}
