//! Prompt text sent to the model and helpers to render it.

use once_cell::sync::Lazy;
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::error::AiError;
use crate::llm_client::ChatRequest;
use crate::prompt::{Bounds, Prompt};

const SHAPE_VOCABULARY: &str = r#"Coordinates are canvas pixels: 0,0 is the top-left corner, x grows to the right and y grows downward. Keep every new shape inside the viewport.

Colors: red, light-red, green, light-green, blue, light-blue, orange, yellow, black, violet, light-violet, grey, white.
Fills: none, tint, semi, solid, pattern.

Shapes (every shape takes an optional "shapeId" and a short "note"):
- rectangle, ellipse, cloud: x, y, width, height, color, fill, text
- text: x, y, color, text, textAlign (start, middle, end)
- note: x, y, color, text (a 200x200 sticky note)
- line: x1, y1, x2, y2, color
- arrow: x1, y1, x2, y2, color, text, fromId, toId (ids of the shapes it connects)

Use no other shape types or properties. A sensible default size for rectangles and ellipses is 100x100.

Events (every event takes an "intent" describing its purpose):
- {"type": "think", "text": "..."}
- {"type": "create", "shape": {...}}
- {"type": "update", "shape": {"shapeId": "...", ...}}
- {"type": "move", "shapeId": "...", "x": 0, "y": 0}
- {"type": "delete", "shapeId": "..."}"#;

/// System prompt for the unified mode: chat or drawing, model's choice.
pub static SYSTEM_PROMPT: Lazy<String> = Lazy::new(|| {
    format!(
        r#"You are a patient tutor working next to the user on a shared drawing canvas. Each request carries the user's message and may carry a picture of the canvas and the shapes on it.

Answer in one of two ways and reply with a single JSON object.

Reply with text when the user asks for facts, explanations or conversation:
{{"responseType": "chat", "content": "your answer"}}

Reply with a drawing when the user asks you to draw, sketch, label or change something, or when a picture explains the idea better than words:
{{"responseType": "drawing", "long_description_of_strategy": "how you will draw it", "events": [ ... ]}}

{SHAPE_VOCABULARY}

Start every drawing with a clear strategy, then emit events in the order they should be applied."#
    )
});

/// System prompt for the drawing-only modes.
pub static DRAWING_SYSTEM_PROMPT: Lazy<String> = Lazy::new(|| {
    format!(
        r#"You draw on a shared canvas to help the user understand an idea. Reply with a single JSON object:
{{"long_description_of_strategy": "how you will draw it", "events": [ ... ]}}
Write the strategy first, then the events in the order they should be applied.

{SHAPE_VOCABULARY}"#
    )
});

const USER_TEMPLATE: &str = "User request: {message}

Viewport: {viewport}
Context area: {context}
{{ if has_shapes }}Shapes in the context area (JSON):
{canvas}{{ else }}The context area is empty.{{ endif }}{{ if has_image }}
A picture of the context area is attached.{{ endif }}
";

const TITLE_SYSTEM: &str = "You write very short titles for homework questions. Use at most {max_words} words. Answer with the title only.";

const TITLE_USER: &str = "Write a title of at most {max_words} words for this question: {question}";

/// Renders a string template using `TinyTemplate`.
///
/// Template variables use the `{name}` syntax and values are inserted
/// without HTML escaping.
///
/// # Examples
///
/// ```
/// use sketch_tutor::render_template;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Ctx { text: &'static str }
///
/// let out = render_template("Hello {text}!", &Ctx { text: "<world>" }).unwrap();
/// assert_eq!(out, "Hello <world>!");
/// ```
#[inline]
pub fn render_template<T: Serialize>(
    template: &str,
    ctx: &T,
) -> Result<String, tinytemplate::error::Error> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("tpl", template)?;
    tt.render("tpl", ctx)
}

#[derive(Serialize)]
struct UserContext<'a> {
    message: &'a str,
    viewport: String,
    context: String,
    canvas: String,
    has_shapes: bool,
    has_image: bool,
}

fn describe_bounds(b: &Bounds) -> String {
    format!("x={}, y={}, width={}, height={}", b.x, b.y, b.w, b.h)
}

/// Renders the user turn for `prompt`.
pub fn user_message(prompt: &Prompt) -> Result<String, AiError> {
    let ctx = UserContext {
        message: &prompt.message,
        viewport: describe_bounds(&prompt.prompt_bounds),
        context: describe_bounds(&prompt.context_bounds),
        canvas: serde_json::to_string(&prompt.canvas_content)?,
        has_shapes: !prompt.canvas_content.shapes.is_empty(),
        has_image: prompt.image.is_some(),
    };
    render_template(USER_TEMPLATE, &ctx).map_err(|e| AiError::Template(e.to_string()))
}

/// Builds a request for `prompt` with the given system prompt.
pub fn prompt_request(prompt: &Prompt, system: &str, json: bool) -> Result<ChatRequest, AiError> {
    Ok(ChatRequest {
        system: system.to_string(),
        user: user_message(prompt)?,
        images: prompt.image.iter().cloned().collect(),
        json,
        ..ChatRequest::default()
    })
}

#[derive(Serialize)]
struct TitleContext<'a> {
    question: &'a str,
    max_words: usize,
}

/// Builds the short title request.
pub fn title_request(question: &str, max_words: usize) -> Result<ChatRequest, AiError> {
    let ctx = TitleContext {
        question,
        max_words,
    };
    let render = |tpl: &str| render_template(tpl, &ctx).map_err(|e| AiError::Template(e.to_string()));
    Ok(ChatRequest {
        system: render(TITLE_SYSTEM)?,
        user: render(TITLE_USER)?,
        max_tokens: Some(20),
        temperature: Some(0.7),
        ..ChatRequest::default()
    })
}
