//! Prompt construction for section backfill.

use serde_json::Value;

use crate::GenerationRequest;

/// System prompt shared by all section generation calls.
pub const SYSTEM_PROMPT: &str = "You are an educational content assistant for an AI/ML glossary.";

/// Build the user prompt for one request.
///
/// The instruction shape keeps responses cell-sized and heading-free so
/// the content drops straight into a section slot.
pub fn build_user_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "For the term \"{}\", write only the content for this section:\n\n\"{}\"\n\n\
         Do not include any extra headings or formatting. Write concise prose \
         suitable for a single glossary section.",
        request.term,
        request.section.title(),
    );

    if let Some(context) = render_context(&request.context) {
        prompt.push_str("\n\nContext about this term:\n");
        prompt.push_str(&context);
    }

    prompt
}

/// Render the context payload as prompt lines, if it carries anything.
fn render_context(context: &Value) -> Option<String> {
    let map = context.as_object()?;
    if map.is_empty() {
        return None;
    }

    let mut lines = Vec::with_capacity(map.len());
    for (key, value) in map {
        if let Some(text) = value.as_str() {
            if !text.trim().is_empty() {
                lines.push(format!("- {key}: {}", truncate(text.trim(), 600)));
            }
        }
    }

    if lines.is_empty() { None } else { Some(lines.join("\n")) }
}

/// Truncate context snippets so one wide source cell cannot crowd out the
/// instruction.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        text.to_string()
    } else {
        let mut cut = max_chars;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}
