//! Text helpers.

/// Cuts `text` to at most `max` bytes on a char boundary, appending `...`
/// when anything was dropped.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
