//! Common utilities and helper functions

pub mod retry;

/// Truncate text to a maximum number of characters
///
/// Used to keep failure reasons and log fields bounded.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
