const MAX_SNIPPET_CHARS: usize = 320;

/// Collapse whitespace and shorten retrieved text for display to the model
pub fn snippet_from_content(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, MAX_SNIPPET_CHARS)
}

/// Shorten to at most `limit` characters, marking the cut with an ellipsis
pub fn truncate_chars(input: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }
    if input.chars().count() <= limit {
        return input.to_string();
    }
    if limit == 1 {
        return input.chars().take(1).collect();
    }
    let mut truncated: String = input.chars().take(limit - 1).collect();
    truncated.push('…');
    truncated
}

/// The text of the first markdown heading, if any
pub fn first_markdown_heading(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim())
        .filter(|heading| !heading.is_empty())
}
