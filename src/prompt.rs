//! Batch prompt rendering.
//!
//! One prompt per batch attempt. Every remaining item is tagged with its exact
//! id; the backend is asked for exactly one summary per item as a JSON array.

use crate::types::Item;

const SUMMARY_RULES: &[&str] = &[
    "Summarize each provided text into ONE plain sentence.",
    "Keep each summary shorter than its original text and use only essential information.",
    "Do NOT add subjects or qualifiers like 'User', 'They', 'The comment', or similar.",
    "Do NOT add any preface or extra words; write only the summary content.",
    "Prefer fewer words when possible; keep it concise.",
    "Paraphrase the input. Do NOT repeat or quote the original text.",
    "Return ONLY a single JSON array (no markdown, no code fences, no extra text).",
    r#"JSON format: [{"id":"<exact-id>","summary":"<one-sentence-summary>"}]"#,
    r#"CRITICAL JSON RULES: use double quotes for all strings; no trailing commas; no line breaks inside the JSON; escape quotes in summaries with \"; return ONLY the JSON array."#,
];

/// Escape backslashes, double quotes and newlines so item text stays on one line.
fn escape_item_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render the prompt for `items`, in order.
pub fn render_batch_prompt(items: &[Item]) -> String {
    let mut parts: Vec<String> = SUMMARY_RULES
        .iter()
        .map(|rule| format!("System: {}", rule))
        .collect();

    parts.push("User:".to_string());
    parts.push("BEGIN_BATCH".to_string());
    for item in items {
        parts.push(format!(
            "--ITEM--ID:{}--TEXT--\\n{}\\n--END--",
            item.id,
            escape_item_text(&item.text)
        ));
    }
    parts.push("END_BATCH".to_string());

    let expected_ids: Vec<String> = items.iter().map(|item| format!("\"{}\"", item.id)).collect();
    parts.push(format!(
        "System: You must return exactly {} summaries, one for each item above, in the same order.",
        items.len()
    ));
    parts.push(format!("System: Expected IDs: [{}]", expected_ids.join(", ")));
    parts.push("System: Return ONLY the JSON array, no other text:".to_string());

    parts.join("\n")
}
