const MARKUP: &[char] = &['<', '>', '{', '}', '[', ']', '`', '\\'];

/// Prepare a player's prompt for an external provider.
///
/// Control and markup characters are dropped, whitespace runs collapse to a single space,
/// and the result is capped at `max_chars` characters.
pub fn sanitize_prompt(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !MARKUP.contains(c))
        .collect();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_control_characters() {
        assert_eq!(
            sanitize_prompt("a <b>cat</b> {in} [space]`\u{7}", 200),
            "a bcat/b in space"
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize_prompt("  a\tcat\n\n dreaming  ", 200), "a cat dreaming");
    }

    #[test]
    fn caps_length_on_character_boundaries() {
        assert_eq!(sanitize_prompt("ééééé", 3), "ééé");
        assert_eq!(sanitize_prompt("a cat dreams", 6), "a cat");
    }
}
