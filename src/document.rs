//! The canvas document as seen by the AI pipeline.
//!
//! Real canvas engines implement [`Document`]; [`InMemoryDocument`] is a
//! small engine with the same rules, used by sessions and tests.

use indexmap::IndexMap;
use tracing::trace;

use crate::prompt::Bounds;
use crate::shape::{BindingId, BindingRecord, ShapeId, ShapePatch, ShapeProps, ShapeRecord};

/// Rejection of a single mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    #[error("shape {0} does not exist")]
    ShapeNotFound(ShapeId),
    #[error("shape {0} already exists")]
    DuplicateShape(ShapeId),
    #[error("binding {0} does not exist")]
    BindingNotFound(BindingId),
    #[error("binding {0} already exists")]
    DuplicateBinding(BindingId),
    #[error("binding {binding} references missing shape {shape}")]
    DanglingBinding { binding: BindingId, shape: ShapeId },
    #[error("shape {id} is a {actual} shape, expected {expected}")]
    TypeMismatch {
        id: ShapeId,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("rasterization failed: {0}")]
    Raster(String),
}

/// Encoded picture of part of the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Mutation and query surface of a canvas document.
pub trait Document: Send {
    fn create_shape(&mut self, shape: ShapeRecord) -> Result<(), DocumentError>;
    fn update_shape(&mut self, patch: ShapePatch) -> Result<(), DocumentError>;
    /// Deletes a shape along with every binding attached to it.
    fn delete_shape(&mut self, id: &ShapeId) -> Result<(), DocumentError>;
    fn create_binding(&mut self, binding: BindingRecord) -> Result<(), DocumentError>;
    fn delete_binding(&mut self, id: &BindingId) -> Result<(), DocumentError>;
    fn shapes(&self) -> Vec<ShapeRecord>;
    fn bindings(&self) -> Vec<BindingRecord>;
    /// Renders the given shapes to an image.
    fn rasterize(&self, shapes: &[ShapeId]) -> Result<RasterImage, DocumentError>;
    /// Monotonic counter bumped by every successful mutation.
    fn version(&self) -> u64;

    fn shape(&self, id: &ShapeId) -> Option<ShapeRecord> {
        self.shapes().into_iter().find(|s| &s.id == id)
    }
}

/// Insertion-ordered document held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    shapes: IndexMap<ShapeId, ShapeRecord>,
    bindings: IndexMap<BindingId, BindingRecord>,
    version: u64,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    fn bump(&mut self) {
        self.version += 1;
        trace!(version = self.version, "document mutated");
    }
}

impl Document for InMemoryDocument {
    fn create_shape(&mut self, shape: ShapeRecord) -> Result<(), DocumentError> {
        if self.shapes.contains_key(&shape.id) {
            return Err(DocumentError::DuplicateShape(shape.id));
        }
        self.shapes.insert(shape.id.clone(), shape);
        self.bump();
        Ok(())
    }

    fn update_shape(&mut self, patch: ShapePatch) -> Result<(), DocumentError> {
        let existing = self
            .shapes
            .get_mut(&patch.id)
            .ok_or_else(|| DocumentError::ShapeNotFound(patch.id.clone()))?;
        if let Some(props) = &patch.props {
            if props.type_name() != existing.props.type_name() {
                return Err(DocumentError::TypeMismatch {
                    id: patch.id,
                    expected: existing.props.type_name(),
                    actual: props.type_name(),
                });
            }
        }
        if let Some(x) = patch.x {
            existing.x = x;
        }
        if let Some(y) = patch.y {
            existing.y = y;
        }
        if let Some(props) = patch.props {
            existing.props = props;
        }
        self.bump();
        Ok(())
    }

    fn delete_shape(&mut self, id: &ShapeId) -> Result<(), DocumentError> {
        if self.shapes.shift_remove(id).is_none() {
            return Err(DocumentError::ShapeNotFound(id.clone()));
        }
        self.bindings
            .retain(|_, b| &b.from_id != id && &b.to_id != id);
        self.bump();
        Ok(())
    }

    fn create_binding(&mut self, binding: BindingRecord) -> Result<(), DocumentError> {
        if self.bindings.contains_key(&binding.id) {
            return Err(DocumentError::DuplicateBinding(binding.id));
        }
        for end in [&binding.from_id, &binding.to_id] {
            if !self.shapes.contains_key(end) {
                return Err(DocumentError::DanglingBinding {
                    binding: binding.id.clone(),
                    shape: end.clone(),
                });
            }
        }
        if let Some(from) = self.shapes.get(&binding.from_id) {
            if !matches!(from.props, ShapeProps::Arrow { .. }) {
                return Err(DocumentError::TypeMismatch {
                    id: binding.from_id.clone(),
                    expected: "arrow",
                    actual: from.props.type_name(),
                });
            }
        }
        self.bindings.insert(binding.id.clone(), binding);
        self.bump();
        Ok(())
    }

    fn delete_binding(&mut self, id: &BindingId) -> Result<(), DocumentError> {
        if self.bindings.shift_remove(id).is_none() {
            return Err(DocumentError::BindingNotFound(id.clone()));
        }
        self.bump();
        Ok(())
    }

    fn shapes(&self) -> Vec<ShapeRecord> {
        self.shapes.values().cloned().collect()
    }

    fn bindings(&self) -> Vec<BindingRecord> {
        self.bindings.values().cloned().collect()
    }

    fn shape(&self, id: &ShapeId) -> Option<ShapeRecord> {
        self.shapes.get(id).cloned()
    }

    /// Produces an SVG picture of the requested shapes.
    fn rasterize(&self, shapes: &[ShapeId]) -> Result<RasterImage, DocumentError> {
        let records = shapes
            .iter()
            .map(|id| {
                self.shapes
                    .get(id)
                    .ok_or_else(|| DocumentError::ShapeNotFound(id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let frame = records
            .iter()
            .map(|r| r.bounds())
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| DocumentError::Raster("nothing to rasterize".into()))?;
        let frame = Bounds::new(frame.x - 10.0, frame.y - 10.0, frame.w + 20.0, frame.h + 20.0);
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{} {} {} {}"><defs><marker id="arrowhead" markerWidth="10" markerHeight="7" refX="10" refY="3.5" orient="auto"><polygon points="0 0, 10 3.5, 0 7"/></marker></defs>"#,
            frame.x, frame.y, frame.w, frame.h
        );
        for record in records {
            svg.push_str(&record.to_svg());
        }
        svg.push_str("</svg>");
        Ok(RasterImage {
            mime: "image/svg+xml".into(),
            bytes: svg.into_bytes(),
        })
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Color, Fill, GeoKind, Point, ShapeMeta, Terminal};

    fn rect(id: &str) -> ShapeRecord {
        ShapeRecord {
            id: ShapeId::new(id),
            x: 0.0,
            y: 0.0,
            props: ShapeProps::Geo {
                geo: GeoKind::Rectangle,
                w: 10.0,
                h: 10.0,
                color: Color::Red,
                fill: Fill::Solid,
                text: String::new(),
            },
            meta: ShapeMeta::default(),
        }
    }

    fn arrow(id: &str) -> ShapeRecord {
        ShapeRecord {
            id: ShapeId::new(id),
            x: 0.0,
            y: 0.0,
            props: ShapeProps::Arrow {
                start: Point::new(0.0, 0.0),
                end: Point::new(50.0, 0.0),
                color: Color::Black,
                text: String::new(),
            },
            meta: ShapeMeta::default(),
        }
    }

    fn binding(arrow: &str, to: &str, terminal: Terminal) -> BindingRecord {
        BindingRecord {
            id: BindingId::for_terminal(&ShapeId::new(arrow), terminal),
            from_id: ShapeId::new(arrow),
            to_id: ShapeId::new(to),
            terminal,
        }
    }

    #[test]
    fn rejects_duplicate_and_missing_shapes() {
        let mut doc = InMemoryDocument::new();
        doc.create_shape(rect("a")).unwrap();
        assert_eq!(
            doc.create_shape(rect("a")),
            Err(DocumentError::DuplicateShape(ShapeId::new("a")))
        );
        let patch = ShapePatch {
            id: ShapeId::new("missing"),
            x: Some(1.0),
            y: None,
            props: None,
        };
        assert!(matches!(
            doc.update_shape(patch),
            Err(DocumentError::ShapeNotFound(_))
        ));
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn patch_moves_without_touching_props() {
        let mut doc = InMemoryDocument::new();
        doc.create_shape(rect("a")).unwrap();
        doc.update_shape(ShapePatch {
            id: ShapeId::new("a"),
            x: Some(40.0),
            y: Some(60.0),
            props: None,
        })
        .unwrap();
        let shape = doc.shape(&ShapeId::new("a")).unwrap();
        assert_eq!((shape.x, shape.y), (40.0, 60.0));
        assert_eq!(shape.props, rect("a").props);
    }

    #[test]
    fn patch_cannot_change_shape_type() {
        let mut doc = InMemoryDocument::new();
        doc.create_shape(rect("a")).unwrap();
        let err = doc
            .update_shape(ShapePatch {
                id: ShapeId::new("a"),
                x: None,
                y: None,
                props: Some(arrow("a").props),
            })
            .unwrap_err();
        assert!(matches!(err, DocumentError::TypeMismatch { .. }));
    }

    #[test]
    fn bindings_need_both_shapes_and_an_arrow() {
        let mut doc = InMemoryDocument::new();
        doc.create_shape(arrow("arr")).unwrap();
        let err = doc
            .create_binding(binding("arr", "box", Terminal::End))
            .unwrap_err();
        assert!(matches!(err, DocumentError::DanglingBinding { .. }));

        doc.create_shape(rect("box")).unwrap();
        doc.create_binding(binding("arr", "box", Terminal::End)).unwrap();
        assert_eq!(doc.binding_count(), 1);

        let err = doc
            .create_binding(binding("box", "arr", Terminal::Start))
            .unwrap_err();
        assert!(matches!(err, DocumentError::TypeMismatch { .. }));
    }

    #[test]
    fn deleting_a_shape_drops_its_bindings() {
        let mut doc = InMemoryDocument::new();
        doc.create_shape(arrow("arr")).unwrap();
        doc.create_shape(rect("box")).unwrap();
        doc.create_binding(binding("arr", "box", Terminal::End)).unwrap();
        doc.delete_shape(&ShapeId::new("box")).unwrap();
        assert_eq!(doc.binding_count(), 0);
        assert_eq!(doc.shape_count(), 1);
    }

    #[test]
    fn rasterizes_to_svg() {
        let mut doc = InMemoryDocument::new();
        doc.create_shape(rect("a")).unwrap();
        let image = doc.rasterize(&[ShapeId::new("a")]).unwrap();
        assert_eq!(image.mime, "image/svg+xml");
        let svg = String::from_utf8(image.bytes).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("<rect"));
        assert!(doc.rasterize(&[]).is_err());
    }
}
