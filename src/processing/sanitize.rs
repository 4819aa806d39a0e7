//! Helpers for normalizing user-supplied strings.

/// Sanitize arbitrary string input by trimming whitespace and dropping empties.
pub fn sanitize_string(value: Option<String>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Normalize a provider name for registry lookups.
pub fn sanitize_provider_name(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Turn a document title into a safe file stem.
///
/// Path separators and reserved characters become `_`, runs of whitespace collapse to a single
/// space, and the result is capped at 120 characters. Empty titles map to `untitled`.
pub fn sanitize_filename(title: &str) -> String {
    let mut cleaned = String::with_capacity(title.len());
    let mut last_was_space = false;
    for c in title.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                cleaned.push(' ');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() {
            cleaned.push('_');
        } else {
            cleaned.push(c);
        }
    }

    let capped: String = cleaned.chars().take(120).collect();
    let capped = capped.trim().trim_matches('.').to_string();
    if capped.is_empty() {
        "untitled".into()
    } else {
        capped
    }
}
