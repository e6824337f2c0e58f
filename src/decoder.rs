//! Turns Simple Events into concrete document changes.
//!
//! Decoding is total: an event that cannot be understood is logged and
//! produces no changes, and never affects its neighbours. The decoder does
//! not look at the live document; references are checked when applied.

use serde_json::Value;
use tracing::{debug, warn};

use crate::change::Change;
use crate::event::{BindingDescriptor, BoxShape, ShapeDescriptor, SimpleEvent};
use crate::prompt::Prompt;
use crate::shape::{
    BindingId, BindingRecord, GeoKind, Point, ShapeId, ShapeMeta, ShapePatch, ShapeProps,
    ShapeRecord, Terminal,
};

/// Decodes a single raw event.
pub fn decode(prompt: &Prompt, event: &Value) -> Vec<Change> {
    decode_event(prompt, None, event)
}

/// Decodes the event at `index` of the model's event list.
pub fn decode_at(prompt: &Prompt, index: usize, event: &Value) -> Vec<Change> {
    decode_event(prompt, Some(index), event)
}

/// Decodes a batch of events, keeping their relative order.
pub fn decode_all(prompt: &Prompt, events: &[Value]) -> Vec<Change> {
    events
        .iter()
        .enumerate()
        .flat_map(|(i, ev)| decode_event(prompt, Some(i), ev))
        .collect()
}

fn decode_event(prompt: &Prompt, index: Option<usize>, raw: &Value) -> Vec<Change> {
    let tag = raw.get("type").and_then(Value::as_str).unwrap_or("<missing>");
    let (value, untyped) = fill_update_type(prompt, raw);
    let event = match serde_json::from_value::<SimpleEvent>(value) {
        Ok(ev) => ev,
        Err(e) => {
            warn!(?index, event_type = tag, error = %e, "skipping malformed event");
            return Vec::new();
        }
    };

    let description = event.intent().to_string();
    match event {
        SimpleEvent::Think { text, .. } => {
            debug!(?index, %text, "model thought");
            Vec::new()
        }
        SimpleEvent::Create { shape, binding, .. } => {
            let mut out = Vec::new();
            if shape.is_none() && binding.is_none() {
                warn!(?index, "create event names no shape or binding");
            }
            if let Some(shape) = shape {
                out.extend(create_shape(index, &description, shape));
            }
            if let Some(binding) = binding {
                out.push(Change::CreateBinding {
                    description: description.clone(),
                    binding: binding_record(binding),
                });
            }
            out
        }
        SimpleEvent::Update { shape, binding, .. } => {
            let mut out = Vec::new();
            if shape.is_none() && binding.is_none() && untyped.is_none() {
                warn!(?index, "update event names no shape or binding");
            }
            if let Some(patch) = untyped {
                debug!(
                    ?index,
                    shape = %patch.id,
                    "untyped update of a shape outside the snapshot"
                );
                out.push(Change::UpdateShape {
                    description: description.clone(),
                    shape: patch,
                });
            }
            if let Some(shape) = shape {
                out.extend(update_shape(prompt, index, &description, shape));
            }
            if let Some(binding) = binding {
                let record = binding_record(binding);
                out.extend(rebind(prompt, &description, record));
            }
            out
        }
        SimpleEvent::Move { shape_id, x, y, .. } => vec![Change::UpdateShape {
            description,
            shape: ShapePatch {
                id: ShapeId::new(shape_id),
                x: Some(x),
                y: Some(y),
                props: None,
            },
        }],
        SimpleEvent::Delete {
            shape_id,
            binding_id,
            ..
        } => {
            let mut out = Vec::new();
            if let Some(id) = shape_id {
                out.push(Change::DeleteShape {
                    description: description.clone(),
                    shape_id: ShapeId::new(id),
                });
            }
            if let Some(id) = binding_id {
                out.push(Change::DeleteBinding {
                    description: description.clone(),
                    binding_id: BindingId::new(id),
                });
            }
            if out.is_empty() {
                warn!(?index, "delete event names no shape or binding");
            }
            out
        }
        SimpleEvent::Unknown => {
            warn!(?index, event_type = tag, "skipping unknown event type");
            Vec::new()
        }
    }
}

/// An `update` whose shape omits its type borrows it from the snapshot.
///
/// When the snapshot does not hold the shape either, the shape is lifted out
/// of the event and returned as a position-only patch so the document can
/// reject the dangling id when it is applied.
fn fill_update_type(prompt: &Prompt, raw: &Value) -> (Value, Option<ShapePatch>) {
    let mut value = raw.clone();
    if raw.get("type").and_then(Value::as_str) != Some("update") {
        return (value, None);
    }
    let Some(event) = value.as_object_mut() else {
        return (value, None);
    };
    let Some(shape) = event.get_mut("shape").and_then(Value::as_object_mut) else {
        return (value, None);
    };
    if shape.contains_key("type") {
        return (value, None);
    }
    let Some(id) = shape
        .get("shapeId")
        .or_else(|| shape.get("id"))
        .and_then(Value::as_str)
        .map(ShapeId::new)
    else {
        return (value, None);
    };
    if let Some(existing) = prompt.canvas_content.shape(&id) {
        shape.insert(
            "type".into(),
            Value::String(existing.props.descriptor_name().to_string()),
        );
        return (value, None);
    }
    let patch = ShapePatch {
        id,
        x: shape.get("x").and_then(Value::as_f64),
        y: shape.get("y").and_then(Value::as_f64),
        props: None,
    };
    event.remove("shape");
    (value, Some(patch))
}

fn create_shape(index: Option<usize>, description: &str, shape: ShapeDescriptor) -> Vec<Change> {
    let id = shape
        .shape_id()
        .map(ShapeId::new)
        .unwrap_or_else(ShapeId::generate);
    let intent = shape
        .note()
        .map(str::to_string)
        .or_else(|| (!description.is_empty()).then(|| description.to_string()));
    let Some(decoded) = describe(shape) else {
        warn!(?index, "skipping create with unknown shape type");
        return Vec::new();
    };

    let mut out = Vec::with_capacity(1 + decoded.ends.len());
    out.push(Change::CreateShape {
        description: description.to_string(),
        shape: ShapeRecord {
            id: id.clone(),
            x: decoded.x,
            y: decoded.y,
            props: decoded.props,
            meta: ShapeMeta { intent },
        },
    });
    out.extend(decoded.ends.into_iter().map(|(terminal, target)| Change::CreateBinding {
        description: description.to_string(),
        binding: BindingRecord {
            id: BindingId::for_terminal(&id, terminal),
            from_id: id.clone(),
            to_id: ShapeId::new(target),
            terminal,
        },
    }));
    out
}

fn update_shape(
    prompt: &Prompt,
    index: Option<usize>,
    description: &str,
    shape: ShapeDescriptor,
) -> Vec<Change> {
    let Some(id) = shape.shape_id().map(ShapeId::new) else {
        warn!(?index, "skipping update without shapeId");
        return Vec::new();
    };
    let Some(decoded) = describe(shape) else {
        warn!(?index, shape = %id, "skipping update with unknown shape type");
        return Vec::new();
    };

    let mut out = vec![Change::UpdateShape {
        description: description.to_string(),
        shape: ShapePatch {
            id: id.clone(),
            x: Some(decoded.x),
            y: Some(decoded.y),
            props: Some(decoded.props),
        },
    }];
    for (terminal, target) in decoded.ends {
        let binding = BindingRecord {
            id: BindingId::for_terminal(&id, terminal),
            from_id: id.clone(),
            to_id: ShapeId::new(target),
            terminal,
        };
        out.extend(rebind(prompt, description, binding));
    }
    out
}

/// Re-attaching an end replaces the binding the snapshot shows holding it.
fn rebind(prompt: &Prompt, description: &str, binding: BindingRecord) -> Vec<Change> {
    let mut out = Vec::with_capacity(2);
    if prompt.canvas_content.has_binding(&binding.id) {
        out.push(Change::DeleteBinding {
            description: description.to_string(),
            binding_id: binding.id.clone(),
        });
    }
    out.push(Change::CreateBinding {
        description: description.to_string(),
        binding,
    });
    out
}

fn binding_record(desc: BindingDescriptor) -> BindingRecord {
    let from_id = ShapeId::new(desc.from_id);
    let id = desc
        .binding_id
        .map(BindingId::new)
        .unwrap_or_else(|| BindingId::for_terminal(&from_id, desc.terminal));
    BindingRecord {
        id,
        from_id,
        to_id: ShapeId::new(desc.to_id),
        terminal: desc.terminal,
    }
}

struct Decoded {
    x: f64,
    y: f64,
    props: ShapeProps,
    /// Arrow attachments, start before end.
    ends: Vec<(Terminal, String)>,
}

fn geo(kind: GeoKind, b: BoxShape) -> Decoded {
    Decoded {
        x: b.x,
        y: b.y,
        props: ShapeProps::Geo {
            geo: kind,
            w: b.width,
            h: b.height,
            color: b.color,
            fill: b.fill,
            text: b.text,
        },
        ends: Vec::new(),
    }
}

fn describe(shape: ShapeDescriptor) -> Option<Decoded> {
    let decoded = match shape {
        ShapeDescriptor::Rectangle(b) => geo(GeoKind::Rectangle, b),
        ShapeDescriptor::Ellipse(b) => geo(GeoKind::Ellipse, b),
        ShapeDescriptor::Cloud(b) => geo(GeoKind::Cloud, b),
        ShapeDescriptor::Text(t) => Decoded {
            x: t.x,
            y: t.y,
            props: ShapeProps::Text {
                color: t.color,
                text: t.text,
                align: t.text_align,
            },
            ends: Vec::new(),
        },
        ShapeDescriptor::Note(n) => Decoded {
            x: n.x,
            y: n.y,
            props: ShapeProps::Note {
                color: n.color,
                text: n.text,
            },
            ends: Vec::new(),
        },
        ShapeDescriptor::Line(s) => Decoded {
            x: s.x1,
            y: s.y1,
            props: ShapeProps::Line {
                start: Point::new(0.0, 0.0),
                end: Point::new(s.x2 - s.x1, s.y2 - s.y1),
                color: s.color,
            },
            ends: Vec::new(),
        },
        ShapeDescriptor::Arrow(a) => {
            let s = a.segment;
            let ends = [(Terminal::Start, a.from_id), (Terminal::End, a.to_id)]
                .into_iter()
                .filter_map(|(t, id)| id.filter(|id| !id.trim().is_empty()).map(|id| (t, id)))
                .collect();
            Decoded {
                x: s.x1,
                y: s.y1,
                props: ShapeProps::Arrow {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(s.x2 - s.x1, s.y2 - s.y1),
                    color: s.color,
                    text: a.text,
                },
                ends,
            }
        }
        ShapeDescriptor::Unknown => return None,
    };
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::apply;
    use crate::document::{Document, InMemoryDocument};
    use crate::shape::{Color, Fill};
    use serde_json::json;
    use tracing_test::traced_test;

    fn rect_event(id: &str) -> Value {
        json!({
            "type": "create",
            "intent": "draw a box",
            "shape": {
                "type": "rectangle", "shapeId": id,
                "x": 50, "y": 50, "width": 100, "height": 100,
                "color": "red", "fill": "solid"
            }
        })
    }

    #[test]
    fn create_rectangle_becomes_geo_record() {
        let changes = decode(&Prompt::default(), &rect_event("box"));
        assert_eq!(changes.len(), 1);
        let Change::CreateShape { description, shape } = &changes[0] else {
            panic!("expected createShape");
        };
        assert_eq!(description, "draw a box");
        assert_eq!(shape.id.as_str(), "shape:box");
        assert_eq!((shape.x, shape.y), (50.0, 50.0));
        assert_eq!(
            shape.props,
            ShapeProps::Geo {
                geo: GeoKind::Rectangle,
                w: 100.0,
                h: 100.0,
                color: Color::Red,
                fill: Fill::Solid,
                text: String::new(),
            }
        );
        assert_eq!(shape.meta.intent.as_deref(), Some("draw a box"));
    }

    #[test]
    fn arrow_bindings_follow_the_arrow() {
        let ev = json!({
            "type": "create",
            "intent": "connect",
            "shape": {
                "type": "arrow", "shapeId": "link",
                "x1": 10, "y1": 20, "x2": 110, "y2": 70,
                "fromId": "a", "toId": "b"
            }
        });
        let changes = decode(&Prompt::default(), &ev);
        let kinds: Vec<_> = changes.iter().map(Change::kind).collect();
        assert_eq!(kinds, ["createShape", "createBinding", "createBinding"]);
        let Change::CreateShape { shape, .. } = &changes[0] else {
            unreachable!()
        };
        assert_eq!((shape.x, shape.y), (10.0, 20.0));
        assert!(matches!(
            shape.props,
            ShapeProps::Arrow { end: Point { x, y }, .. } if x == 100.0 && y == 50.0
        ));
        let Change::CreateBinding { binding, .. } = &changes[1] else {
            unreachable!()
        };
        assert_eq!(binding.id.as_str(), "binding:link-start");
        assert_eq!(binding.from_id.as_str(), "shape:link");
        assert_eq!(binding.to_id.as_str(), "shape:a");
        assert_eq!(binding.terminal, Terminal::Start);
        assert_eq!(changes[2].target(), "binding:link-end");
    }

    #[test]
    fn same_event_decodes_to_same_binding_ids() {
        let ev = json!({
            "type": "create",
            "shape": { "type": "arrow", "shapeId": "l", "x1": 0, "y1": 0, "x2": 1, "y2": 1, "toId": "b" }
        });
        assert_eq!(decode(&Prompt::default(), &ev), decode(&Prompt::default(), &ev));
    }

    #[test]
    fn move_only_patches_position() {
        let ev = json!({ "type": "move", "shapeId": "box", "x": 5, "y": 6, "intent": "shift" });
        let changes = decode(&Prompt::default(), &ev);
        assert_eq!(
            changes,
            vec![Change::UpdateShape {
                description: "shift".into(),
                shape: ShapePatch {
                    id: ShapeId::new("box"),
                    x: Some(5.0),
                    y: Some(6.0),
                    props: None,
                },
            }]
        );
    }

    #[test]
    fn update_without_type_borrows_snapshot_type() {
        let mut prompt = Prompt::default();
        if let Some(Change::CreateShape { shape, .. }) =
            decode(&prompt, &rect_event("box")).into_iter().next()
        {
            prompt.canvas_content.shapes.push(shape);
        }
        let ev = json!({
            "type": "update",
            "shape": { "shapeId": "box", "x": 0, "y": 0, "width": 10, "height": 10, "color": "blue" }
        });
        let changes = decode(&prompt, &ev);
        let [Change::UpdateShape { shape, .. }] = changes.as_slice() else {
            panic!("expected one update, got {changes:?}");
        };
        assert!(matches!(
            shape.props,
            Some(ShapeProps::Geo { geo: GeoKind::Rectangle, color: Color::Blue, .. })
        ));
    }

    #[test]
    fn untyped_update_outside_snapshot_is_a_position_patch() {
        let ev = json!({
            "type": "update",
            "intent": "grow",
            "shape": { "shapeId": "missing", "x": 1, "y": 2, "width": 5, "height": 5 }
        });
        let changes = decode(&Prompt::default(), &ev);
        assert_eq!(
            changes,
            vec![Change::UpdateShape {
                description: "grow".into(),
                shape: ShapePatch {
                    id: ShapeId::new("missing"),
                    x: Some(1.0),
                    y: Some(2.0),
                    props: None,
                },
            }]
        );

        let mut doc = InMemoryDocument::new();
        let report = apply(&mut doc, &changes);
        assert_eq!(report.applied, 0);
        assert_eq!(report.failures.len(), 1);
    }

    fn arrow_prompt(with_binding: bool) -> Prompt {
        let mut prompt = Prompt::default();
        let events = [
            rect_event("a"),
            json!({
                "type": "create",
                "shape": { "type": "arrow", "shapeId": "l", "x1": 0, "y1": 0, "x2": 40, "y2": 40, "toId": "a" }
            }),
        ];
        for change in decode_all(&prompt, &events) {
            match change {
                Change::CreateShape { shape, .. } => prompt.canvas_content.shapes.push(shape),
                Change::CreateBinding { binding, .. } if with_binding => {
                    prompt.canvas_content.bindings.push(binding)
                }
                _ => {}
            }
        }
        prompt
    }

    fn reattach() -> Value {
        json!({
            "type": "update",
            "shape": { "type": "arrow", "shapeId": "l", "x1": 0, "y1": 0, "x2": 60, "y2": 60, "toId": "a" }
        })
    }

    #[test]
    fn reattaching_an_unbound_arrow_only_creates() {
        let prompt = arrow_prompt(false);
        let changes = decode(&prompt, &reattach());
        let kinds: Vec<_> = changes.iter().map(Change::kind).collect();
        assert_eq!(kinds, ["updateShape", "createBinding"]);

        let mut doc = InMemoryDocument::new();
        for shape in &prompt.canvas_content.shapes {
            doc.create_shape(shape.clone()).unwrap();
        }
        let report = apply(&mut doc, &changes);
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(doc.binding_count(), 1);
    }

    #[test]
    fn reattaching_a_bound_arrow_replaces_the_binding() {
        let prompt = arrow_prompt(true);
        let changes = decode(&prompt, &reattach());
        let kinds: Vec<_> = changes.iter().map(Change::kind).collect();
        assert_eq!(kinds, ["updateShape", "deleteBinding", "createBinding"]);
        assert_eq!(changes[1].target(), "binding:l-end");

        let mut doc = InMemoryDocument::new();
        for shape in &prompt.canvas_content.shapes {
            doc.create_shape(shape.clone()).unwrap();
        }
        for binding in &prompt.canvas_content.bindings {
            doc.create_binding(binding.clone()).unwrap();
        }
        assert!(apply(&mut doc, &changes).is_clean());
        assert_eq!(doc.binding_count(), 1);
    }

    #[traced_test]
    #[test]
    fn empty_create_and_update_are_reported() {
        assert!(decode(&Prompt::default(), &json!({ "type": "create", "intent": "x" })).is_empty());
        assert!(logs_contain("create event names no shape or binding"));
        assert!(decode(&Prompt::default(), &json!({ "type": "update" })).is_empty());
        assert!(logs_contain("update event names no shape or binding"));
    }

    #[test]
    fn delete_can_target_shape_and_binding() {
        let ev = json!({ "type": "delete", "shapeId": "a", "bindingId": "b" });
        let kinds: Vec<_> = decode(&Prompt::default(), &ev)
            .iter()
            .map(Change::kind)
            .collect();
        assert_eq!(kinds, ["deleteShape", "deleteBinding"]);
    }

    #[test]
    fn think_produces_nothing() {
        let ev = json!({ "type": "think", "text": "hmm" });
        assert!(decode(&Prompt::default(), &ev).is_empty());
    }

    #[traced_test]
    #[test]
    fn bad_events_are_skipped_in_isolation() {
        let events = vec![
            rect_event("one"),
            json!({ "type": "explode" }),
            json!({ "type": "create", "shape": { "type": "rectangle", "x": 1 } }),
            json!({ "type": "create", "shape": { "type": "hexagon", "x": 1, "y": 1 } }),
            json!({ "type": "create", "shape": { "type": "text", "x": 1, "y": 1, "color": "magenta" } }),
            rect_event("two"),
        ];
        let changes = decode_all(&Prompt::default(), &events);
        let targets: Vec<_> = changes.iter().map(Change::target).collect();
        assert_eq!(targets, ["shape:one", "shape:two"]);
        assert!(logs_contain("skipping unknown event type"));
        assert!(logs_contain("skipping malformed event"));
        assert!(logs_contain("skipping create with unknown shape type"));
    }
}
