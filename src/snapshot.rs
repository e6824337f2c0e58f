//! Captures the visible part of a document into a [`Prompt`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::document::Document;
use crate::prompt::{Bounds, CanvasContent, Prompt};
use crate::shape::ShapeId;

/// Builds a prompt for `message` from the shapes inside the context frame.
///
/// `context` defaults to the viewport. Shapes whose bounds touch the context
/// frame are included, and bindings only when both ends are included. The
/// rasterizer is skipped for an empty selection, and a rasterizer error only
/// drops the image. Never fails and never mutates the document.
pub fn encode_prompt(
    document: &dyn Document,
    message: impl Into<String>,
    viewport: Bounds,
    context: Option<Bounds>,
) -> Prompt {
    let context = context.unwrap_or(viewport);
    let shapes: Vec<_> = document
        .shapes()
        .into_iter()
        .filter(|s| s.bounds().intersects(&context))
        .collect();
    let visible: HashSet<&ShapeId> = shapes.iter().map(|s| &s.id).collect();
    let bindings: Vec<_> = document
        .bindings()
        .into_iter()
        .filter(|b| visible.contains(&b.from_id) && visible.contains(&b.to_id))
        .collect();

    let image = if shapes.is_empty() {
        None
    } else {
        let ids: Vec<ShapeId> = shapes.iter().map(|s| s.id.clone()).collect();
        match document.rasterize(&ids) {
            Ok(raster) => Some(format!("data:{};base64,{}", raster.mime, B64.encode(&raster.bytes))),
            Err(e) => {
                warn!(error = %e, shapes = ids.len(), "canvas rasterization failed; sending prompt without image");
                None
            }
        }
    };

    debug!(
        shapes = shapes.len(),
        bindings = bindings.len(),
        has_image = image.is_some(),
        "encoded canvas snapshot"
    );

    Prompt {
        message: message.into(),
        image,
        prompt_bounds: viewport,
        context_bounds: context,
        canvas_content: CanvasContent {
            shapes,
            bindings,
            assets: Vec::new(),
        },
    }
}
