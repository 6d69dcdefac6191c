//! Line-alone detection shared by the static compiler pass and the runtime
//! output buffer.
//!
//! An item is *alone* on its line when only horizontal whitespace separates
//! it from the previous newline (or from the start of its scope, when that
//! scope itself starts a line) and only horizontal whitespace follows it up
//! to the next newline or the end of input. A lone item takes its line with
//! it: the leading indentation is retracted and the trailing whitespace plus
//! one newline is eaten.

/// Space or tab. Newlines never count as horizontal whitespace.
pub fn is_horizontal(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

/// Byte length of the run of horizontal whitespace at the end of `text`.
pub fn trailing_horizontal(text: &str) -> usize {
    text.len() - text.trim_end_matches(is_horizontal).len()
}

/// Whether a position preceded by `text` sits at the start of a line.
///
/// `line_start` tells whether the beginning of `text` is itself a line start.
pub fn left_alone(text: &str, line_start: bool) -> bool {
    let rest = &text[..text.len() - trailing_horizontal(text)];
    if rest.is_empty() {
        line_start
    } else {
        rest.ends_with('\n')
    }
}

/// Length of the horizontal whitespace plus line break that starts `text`.
///
/// Returns `None` when something else comes first. When `at_end` is set, the
/// end of `text` is the end of input and also closes the line.
pub fn line_lead(text: &str, at_end: bool) -> Option<usize> {
    let indent = text.len() - text.trim_start_matches(is_horizontal).len();
    let rest = &text[indent..];
    if rest.starts_with('\n') {
        Some(indent + 1)
    } else if rest.starts_with("\r\n") {
        Some(indent + 2)
    } else if rest.is_empty() && at_end {
        Some(indent)
    } else {
        None
    }
}

/// Whether `text` contains nothing but whitespace.
pub fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}
