//! String helpers for log output.

/// Find the largest byte index <= `i` that is on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Shorten `s` to at most `max_bytes` for logging, appending `...` when cut.
///
/// Never splits a UTF-8 codepoint. Newlines are flattened to spaces so a
/// preview stays on one log line.
pub fn preview(s: &str, max_bytes: usize) -> String {
    let flat = s.trim().replace(['\n', '\r'], " ");
    if flat.len() <= max_bytes {
        return flat;
    }
    let cut = floor_char_boundary(&flat, max_bytes);
    format!("{}...", &flat[..cut])
}
