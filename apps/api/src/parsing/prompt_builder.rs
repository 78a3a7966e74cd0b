//! Prompt Builder: renders the schema and the extracted text into the one
//! instruction string sent to the model.
//!
//! `build` is a pure function: the same schema, text and budget always
//! produce a byte-identical prompt.

use std::fmt::Write as _;

use crate::extraction::ExtractedText;
use crate::parsing::prompts::{
    CLOSING_INSTRUCTION, FIELD_POLICY, HYPERLINKS_HEADER, INJECTION_GUARD, NO_SCHEMA_CHANGES,
    OUTPUT_CONTRACT, RESUME_END_MARKER, RESUME_START_MARKER, ROLE_INSTRUCTION,
};
use crate::schema::Schema;

/// Hyperlinks listed after the resume text; the rest are dropped.
const MAX_HYPERLINKS: usize = 50;
const MAX_LINK_FIELD_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    truncated: bool,
    schema_version: &'static str,
}

impl Prompt {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the resume text was cut to fit the input budget.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn schema_version(&self) -> &'static str {
        self.schema_version
    }
}

pub fn build(schema: &Schema, extracted: &ExtractedText, max_input_chars: usize) -> Prompt {
    let (resume_text, truncated) = truncate_at_boundary(&extracted.text, max_input_chars);
    // The resume must not be able to close its own delimiter.
    let resume_text = resume_text
        .replace(RESUME_START_MARKER, "")
        .replace(RESUME_END_MARKER, "");

    // serde_json with preserve_order renders keys in schema declaration order.
    let example = serde_json::to_string_pretty(&schema.example()).unwrap_or_default();
    let required = schema.required_paths().join(", ");

    let mut text = String::with_capacity(example.len() + resume_text.len() + 2048);
    let _ = write!(
        text,
        "{ROLE_INSTRUCTION}\n\n\
         {OUTPUT_CONTRACT}\n\n\
         OUTPUT SCHEMA (version {version}):\n{example}\n\n\
         {FIELD_POLICY}\n\
         - Required fields: {required}. Leave out a list entry rather than returning it without its required fields.\n\n\
         {NO_SCHEMA_CHANGES}\n\n\
         {INJECTION_GUARD}\n\n\
         {RESUME_START_MARKER}\n{resume_text}\n{RESUME_END_MARKER}\n",
        version = schema.version,
    );

    if !extracted.hyperlinks.is_empty() {
        let _ = write!(text, "\n{HYPERLINKS_HEADER}\n");
        for (i, link) in extracted.hyperlinks.iter().take(MAX_HYPERLINKS).enumerate() {
            let _ = writeln!(
                text,
                "{}. \"{}\" -> {}",
                i + 1,
                link_field(&link.text),
                link_field(&link.url)
            );
        }
    }

    let _ = write!(text, "\n{CLOSING_INSTRUCTION}");

    Prompt {
        text,
        truncated,
        schema_version: schema.version,
    }
}

/// Hyperlink text comes from the resume, so it is flattened to one line and
/// stripped of delimiter markers and quotes before it is listed.
fn link_field(value: &str) -> String {
    let value = value
        .replace(RESUME_START_MARKER, "")
        .replace(RESUME_END_MARKER, "");
    let flat: String = value
        .chars()
        .map(|c| if c.is_control() || c == '"' { ' ' } else { c })
        .take(MAX_LINK_FIELD_CHARS)
        .collect();
    flat.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max_chars` characters at the paragraph or sentence
/// boundary nearest the limit, falling back to a line break and then to any
/// whitespace. Cuts inside a word only when the window holds no whitespace
/// before the limit.
pub fn truncate_at_boundary(text: &str, max_chars: usize) -> (&str, bool) {
    let limit = match text.char_indices().nth(max_chars) {
        Some((idx, _)) => idx,
        None => return (text, false),
    };
    let window = &text[..limit];

    let paragraph = window.rfind("\n\n");
    let sentence = [". ", "! ", "? ", ".\n", "!\n", "?\n"]
        .iter()
        .filter_map(|p| window.rfind(p).map(|i| i + 1))
        .max();

    let cut = match paragraph.max(sentence) {
        Some(cut) => cut,
        None => window
            .rfind('\n')
            .or_else(|| window.rfind(char::is_whitespace))
            .unwrap_or(limit),
    };

    // A word running exactly up to the limit may end there.
    let next_is_space = text[limit..].starts_with(char::is_whitespace);
    let cut = if next_is_space && sentence.is_none() && paragraph.is_none() {
        limit
    } else {
        cut
    };

    // No usable boundary (one long token): cut hard at the limit rather
    // than dropping the whole text.
    let cut = if window[..cut].trim().is_empty() { limit } else { cut };

    (window[..cut].trim_end(), true)
}
