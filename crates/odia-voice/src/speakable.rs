//! Chunk text cleanup before synthesis.
//!
//! Chunks are cut from raw model output, so they can carry markdown the TTS
//! engine would read aloud ("asterisk asterisk"). Each chunk is cleaned on its
//! own; markup split across two chunks is only partially removed.

/// Clean `text` for speech. Returns `None` when nothing pronounceable is left.
pub fn speakable_text(text: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(text.len());
    for line in text.split('\n') {
        let line = strip_line_prefix(line);
        let line = strip_links(line);
        let line = strip_inline_markers(&line);
        let line = strip_html_tags(&line);
        cleaned.push_str(&line);
        cleaned.push(' ');
    }
    let cleaned = collapse_whitespace(&cleaned);
    cleaned
        .chars()
        .any(char::is_alphanumeric)
        .then_some(cleaned)
}

/// Drop heading, blockquote and list markers at the start of a line.
fn strip_line_prefix(line: &str) -> &str {
    let mut s = line.trim_start();
    while let Some(rest) = s.strip_prefix('>') {
        s = rest.trim_start();
    }
    if s.starts_with('#') {
        s = s.trim_start_matches('#').trim_start();
    }
    if let Some(rest) = s
        .strip_prefix("- ")
        .or_else(|| s.strip_prefix("* "))
        .or_else(|| s.strip_prefix("+ "))
    {
        return rest;
    }
    // Numbered: "1. item", "2) item"
    if let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) {
        if pos > 0 {
            let after = &s[pos..];
            if let Some(rest) = after.strip_prefix(". ").or_else(|| after.strip_prefix(") ")) {
                return rest;
            }
        }
    }
    s
}

/// `[text](url)` and `![alt](url)` become `text` / `alt`.
fn strip_links(line: &str) -> String {
    let mut result = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find("](").map(|c| open + c) else {
            break;
        };
        let Some(end) = rest[close..].find(')').map(|e| close + e) else {
            break;
        };
        let before = rest[..open].strip_suffix('!').unwrap_or(&rest[..open]);
        result.push_str(before);
        result.push_str(&rest[open + 1..close]);
        rest = &rest[end + 1..];
    }
    result.push_str(rest);
    result
}

fn strip_inline_markers(line: &str) -> String {
    line.replace("**", "")
        .replace("__", "")
        .replace("~~", "")
        .replace(['*', '`'], "")
}

fn strip_html_tags(line: &str) -> String {
    let mut result = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
