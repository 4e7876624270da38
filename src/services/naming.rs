pub const FALLBACK_NAME: &str = "relatorio_sem_nome";
pub const DEFAULT_MAX_WORDS: usize = 10;
pub const DEFAULT_MAX_LENGTH: usize = 50;

/// Word separators: Unicode whitespace plus the ASCII file, group, record and
/// unit separators (U+001C..=U+001F).
fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Suggests a storage-safe report name from the first words of `text`.
///
/// Only ASCII letters, ASCII digits and spaces survive; each space becomes
/// `_`. The result may be empty when every word is stripped away.
pub fn suggest_name(text: &str, max_words: usize, max_length: usize) -> String {
    if text.trim_matches(is_separator).is_empty() {
        return FALLBACK_NAME.to_string();
    }

    let words: Vec<&str> = text
        .split(is_separator)
        .filter(|w| !w.is_empty())
        .take(max_words)
        .collect();

    words
        .join(" ")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .map(|c| if c == ' ' { '_' } else { c })
        .take(max_length)
        .collect()
}

pub fn suggest_default_name(text: &str) -> String {
    suggest_name(text, DEFAULT_MAX_WORDS, DEFAULT_MAX_LENGTH)
}
