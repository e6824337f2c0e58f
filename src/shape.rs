//! Typed shape and binding records as stored by the document.
//!
//! The model speaks in loose, flat property bags (see [`crate::event`]); the
//! document only accepts the closed records defined here. Geometry uses the
//! canvas frame: origin top-left, `x` grows rightward, `y` grows downward.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::prompt::Bounds;

/// Identifier of a shape, always namespaced as `shape:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    const PREFIX: &'static str = "shape:";

    /// Builds an id from a model supplied name, adding the namespace if missing.
    ///
    /// ```
    /// use sketch_tutor::ShapeId;
    /// assert_eq!(ShapeId::new("box").as_str(), "shape:box");
    /// assert_eq!(ShapeId::new("shape:box").as_str(), "shape:box");
    /// ```
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        if raw.starts_with(Self::PREFIX) {
            Self(raw.to_string())
        } else {
            Self(format!("{}{raw}", Self::PREFIX))
        }
    }

    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a binding, always namespaced as `binding:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(String);

impl BindingId {
    const PREFIX: &'static str = "binding:";

    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        if raw.starts_with(Self::PREFIX) {
            Self(raw.to_string())
        } else {
            Self(format!("{}{raw}", Self::PREFIX))
        }
    }

    /// Deterministic id of the binding attaching one end of `arrow`.
    ///
    /// Decoding the same arrow twice yields the same binding ids.
    pub fn for_terminal(arrow: &ShapeId, terminal: Terminal) -> Self {
        let name = arrow.as_str().trim_start_matches(ShapeId::PREFIX);
        Self(format!("{}{name}-{}", Self::PREFIX, terminal.as_str()))
    }

    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed palette the model may draw with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Color {
    Red,
    LightRed,
    Green,
    LightGreen,
    Blue,
    LightBlue,
    Orange,
    Yellow,
    #[default]
    Black,
    Violet,
    LightViolet,
    Grey,
    White,
}

impl Color {
    /// Hex value used by the SVG rasterizer.
    pub fn hex(self) -> &'static str {
        match self {
            Color::Red => "#e03131",
            Color::LightRed => "#ff8787",
            Color::Green => "#099268",
            Color::LightGreen => "#40c057",
            Color::Blue => "#4465e9",
            Color::LightBlue => "#4ba1f1",
            Color::Orange => "#e16919",
            Color::Yellow => "#f1ac4b",
            Color::Black => "#1d1d1d",
            Color::Violet => "#ae3ec9",
            Color::LightViolet => "#e085f4",
            Color::Grey => "#9fa8b2",
            Color::White => "#ffffff",
        }
    }
}

/// How the interior of a closed shape is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    #[default]
    None,
    Tint,
    Semi,
    Solid,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Start,
    #[default]
    Middle,
    End,
}

impl TextAlign {
    fn svg_anchor(self) -> &'static str {
        match self {
            TextAlign::Start => "start",
            TextAlign::Middle => "middle",
            TextAlign::End => "end",
        }
    }
}

/// Outline drawn by a geo shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoKind {
    Rectangle,
    Ellipse,
    Cloud,
}

impl GeoKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GeoKind::Rectangle => "rectangle",
            GeoKind::Ellipse => "ellipse",
            GeoKind::Cloud => "cloud",
        }
    }
}

/// Which end of an arrow a binding attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    Start,
    #[default]
    End,
}

impl Terminal {
    pub fn as_str(self) -> &'static str {
        match self {
            Terminal::Start => "start",
            Terminal::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Type specific properties of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeProps {
    Geo {
        geo: GeoKind,
        w: f64,
        h: f64,
        #[serde(default)]
        color: Color,
        #[serde(default)]
        fill: Fill,
        #[serde(default)]
        text: String,
    },
    Text {
        #[serde(default)]
        color: Color,
        #[serde(default)]
        text: String,
        #[serde(default)]
        align: TextAlign,
    },
    /// Straight segment; endpoints are relative to the record position.
    Line {
        start: Point,
        end: Point,
        #[serde(default)]
        color: Color,
    },
    /// Arrow; endpoints are relative to the record position.
    Arrow {
        start: Point,
        end: Point,
        #[serde(default)]
        color: Color,
        #[serde(default)]
        text: String,
    },
    Note {
        #[serde(default)]
        color: Color,
        #[serde(default)]
        text: String,
    },
}

impl ShapeProps {
    /// Name of the record type, as used on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeProps::Geo { .. } => "geo",
            ShapeProps::Text { .. } => "text",
            ShapeProps::Line { .. } => "line",
            ShapeProps::Arrow { .. } => "arrow",
            ShapeProps::Note { .. } => "note",
        }
    }

    /// Name of the matching model descriptor type (`rectangle`, `arrow`, ...).
    pub fn descriptor_name(&self) -> &'static str {
        match self {
            ShapeProps::Geo { geo, .. } => geo.as_str(),
            other => other.type_name(),
        }
    }
}

/// Free-form metadata kept alongside a shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShapeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

/// A complete shape as stored in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub id: ShapeId,
    pub x: f64,
    pub y: f64,
    pub props: ShapeProps,
    #[serde(default)]
    pub meta: ShapeMeta,
}

const NOTE_SIZE: f64 = 200.0;
const TEXT_LINE_HEIGHT: f64 = 24.0;
const TEXT_CHAR_WIDTH: f64 = 10.0;

impl ShapeRecord {
    /// Axis-aligned page bounds, estimated for auto-sized text.
    pub fn bounds(&self) -> Bounds {
        match &self.props {
            ShapeProps::Geo { w, h, .. } => Bounds::new(self.x, self.y, *w, *h),
            ShapeProps::Note { .. } => Bounds::new(self.x, self.y, NOTE_SIZE, NOTE_SIZE),
            ShapeProps::Text { text, .. } => {
                let lines = text.lines().count().max(1);
                let widest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
                Bounds::new(
                    self.x,
                    self.y,
                    widest.max(1) as f64 * TEXT_CHAR_WIDTH,
                    lines as f64 * TEXT_LINE_HEIGHT,
                )
            }
            ShapeProps::Line { start, end, .. } | ShapeProps::Arrow { start, end, .. } => {
                let min_x = start.x.min(end.x);
                let min_y = start.y.min(end.y);
                Bounds::new(
                    self.x + min_x,
                    self.y + min_y,
                    (start.x - end.x).abs(),
                    (start.y - end.y).abs(),
                )
            }
        }
    }

    /// Renders this shape as an SVG fragment.
    pub(crate) fn to_svg(&self) -> String {
        match &self.props {
            ShapeProps::Geo {
                geo,
                w,
                h,
                color,
                fill,
                text,
            } => {
                let paint = match fill {
                    Fill::None => "none",
                    _ => color.hex(),
                };
                let opacity = match fill {
                    Fill::Tint | Fill::Pattern => 0.3,
                    Fill::Semi => 0.6,
                    _ => 1.0,
                };
                let outline = match geo {
                    GeoKind::Rectangle => format!(
                        r#"<rect x="{}" y="{}" width="{w}" height="{h}" stroke="{}" fill="{paint}" fill-opacity="{opacity}"/>"#,
                        self.x,
                        self.y,
                        color.hex()
                    ),
                    GeoKind::Ellipse | GeoKind::Cloud => format!(
                        r#"<ellipse cx="{}" cy="{}" rx="{}" ry="{}" stroke="{}" fill="{paint}" fill-opacity="{opacity}"/>"#,
                        self.x + w / 2.0,
                        self.y + h / 2.0,
                        w / 2.0,
                        h / 2.0,
                        color.hex()
                    ),
                };
                format!(
                    "{outline}{}",
                    svg_label(self.x + w / 2.0, self.y + h / 2.0, text, "middle")
                )
            }
            ShapeProps::Text { color, text, align } => format!(
                r#"<text x="{}" y="{}" fill="{}" text-anchor="{}">{}</text>"#,
                self.x,
                self.y + TEXT_LINE_HEIGHT,
                color.hex(),
                align.svg_anchor(),
                escape_xml(text)
            ),
            ShapeProps::Note { color, text } => format!(
                r#"<rect x="{}" y="{}" width="{NOTE_SIZE}" height="{NOTE_SIZE}" fill="{}"/>{}"#,
                self.x,
                self.y,
                color.hex(),
                svg_label(
                    self.x + NOTE_SIZE / 2.0,
                    self.y + NOTE_SIZE / 2.0,
                    text,
                    "middle"
                )
            ),
            ShapeProps::Line { start, end, color } => format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}"/>"#,
                self.x + start.x,
                self.y + start.y,
                self.x + end.x,
                self.y + end.y,
                color.hex()
            ),
            ShapeProps::Arrow {
                start,
                end,
                color,
                text,
            } => format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" marker-end="url(#arrowhead)"/>{}"#,
                self.x + start.x,
                self.y + start.y,
                self.x + end.x,
                self.y + end.y,
                color.hex(),
                svg_label(
                    self.x + (start.x + end.x) / 2.0,
                    self.y + (start.y + end.y) / 2.0,
                    text,
                    "middle"
                )
            ),
        }
    }
}

fn svg_label(x: f64, y: f64, text: &str, anchor: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!(
        r#"<text x="{x}" y="{y}" text-anchor="{anchor}">{}</text>"#,
        escape_xml(text)
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Partial update of an existing shape.
///
/// Absent fields are left untouched by the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePatch {
    pub id: ShapeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<ShapeProps>,
}

/// Anchors one end of an arrow (`from_id`) to another shape (`to_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingRecord {
    pub id: BindingId,
    pub from_id: ShapeId,
    pub to_id: ShapeId,
    #[serde(default)]
    pub terminal: Terminal,
}
