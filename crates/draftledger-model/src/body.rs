//! Draft body pairing.
//!
//! A draft body has two faces: the textual rendering that content fields
//! and wire records carry, and the structured representation a rich-text
//! editor works on. The two must never drift apart within one snapshot,
//! so [`DraftBody`] keeps both private and only offers constructors that
//! regenerate the counterpart through a [`BodyCodec`].

use serde::{Deserialize, Serialize};

/// Structured representation of a draft body.
///
/// The engine treats the structure as an opaque payload; its actual shape
/// belongs to the rich-text collaborator behind [`BodyCodec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredBody(pub serde_json::Value);

impl StructuredBody {
    /// Wraps a structured payload.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the underlying payload.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Conversion between the textual and structured body representations.
///
/// Implementations are expected to be deterministic: parsing a rendered
/// body and re-rendering it must be stable, otherwise every merge would
/// look like a content change.
pub trait BodyCodec: Send + Sync {
    /// Parses a textual body into its structured representation.
    fn parse(&self, text: &str) -> StructuredBody;

    /// Renders a structured body to text.
    fn render(&self, structured: &StructuredBody) -> String;
}

/// Reference codec treating the body as plain-text paragraphs.
///
/// Splits on blank lines when parsing and joins paragraphs with a blank
/// line when rendering. Enough to make the crate usable standalone; real
/// rich-text conversion plugs in through [`BodyCodec`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextCodec;

impl BodyCodec for PlainTextCodec {
    fn parse(&self, text: &str) -> StructuredBody {
        let paragraphs: Vec<serde_json::Value> = text
            .split("\n\n")
            .filter(|p| !p.is_empty())
            .map(|p| serde_json::Value::String(p.to_string()))
            .collect();
        StructuredBody::new(serde_json::Value::Array(paragraphs))
    }

    fn render(&self, structured: &StructuredBody) -> String {
        match structured.as_value() {
            serde_json::Value::Array(paragraphs) => paragraphs
                .iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join("\n\n"),
            serde_json::Value::String(s) => s.clone(),
            _ => String::new(),
        }
    }
}

/// A draft body: textual rendering paired with its structured source.
///
/// The fields are private on purpose. Construction always goes through a
/// codec so the pairing stays consistent, and copy-on-write clones always
/// carry both representations together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftBody {
    text: String,
    structured: StructuredBody,
}

impl DraftBody {
    /// Builds a body from text, regenerating the structured counterpart.
    #[must_use]
    pub fn from_text(text: impl Into<String>, codec: &dyn BodyCodec) -> Self {
        let text = text.into();
        let structured = codec.parse(&text);
        Self { text, structured }
    }

    /// Builds a body from a structured payload, regenerating the rendering.
    #[must_use]
    pub fn from_structured(structured: StructuredBody, codec: &dyn BodyCodec) -> Self {
        let text = codec.render(&structured);
        Self { text, structured }
    }

    /// Returns the textual rendering.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the structured representation.
    #[must_use]
    pub const fn structured(&self) -> &StructuredBody {
        &self.structured
    }

    /// Returns `true` if the rendered body contains no visible content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
