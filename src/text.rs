/// Replace line breaks with spaces so a snippet stays on one prompt line.
pub(crate) fn nonewlines(s: &str) -> String {
    s.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Keep at most `max_chars` characters, never splitting a code point.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Substitute `{q}` and `{retrieved}` in one left-to-right pass.
///
/// `{{` and `}}` collapse to a single brace. Substituted values are never
/// re-scanned, so a question containing `{retrieved}` is inserted literally.
/// Any other brace is copied through as-is.
pub(crate) fn render_template(template: &str, question: &str, retrieved: &str) -> String {
    let mut out = String::with_capacity(template.len() + question.len() + retrieved.len());
    let mut rest = template;
    while let Some(start) = rest.find(['{', '}']) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (emitted, after) = if let Some(after) = tail.strip_prefix("{{") {
            ("{", after)
        } else if let Some(after) = tail.strip_prefix("}}") {
            ("}", after)
        } else if let Some(after) = tail.strip_prefix("{q}") {
            (question, after)
        } else if let Some(after) = tail.strip_prefix("{retrieved}") {
            (retrieved, after)
        } else {
            (&tail[..1], &tail[1..])
        };
        out.push_str(emitted);
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Render newlines as `<br>` for display in the client's trace pane.
pub(crate) fn to_html_breaks(s: &str) -> String {
    s.replace('\n', "<br>")
}
