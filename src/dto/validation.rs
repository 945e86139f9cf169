//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

/// Smallest accepted prompt, counted in characters after trimming.
pub const MIN_PROMPT_CHARS: usize = 3;
/// Largest accepted prompt, counted in characters after trimming.
pub const MAX_PROMPT_CHARS: usize = 200;
/// Smallest number of players a game can start with.
pub const MIN_PLAYERS: usize = 2;
/// Largest number of players a game can start with.
pub const MAX_PLAYERS: usize = 12;

/// Validates that a prompt holds 3 to 200 characters once trimmed.
///
/// # Examples
///
/// ```ignore
/// validate_prompt_text("  cat  ") // Ok
/// validate_prompt_text("ok")      // Err - too short
/// ```
pub fn validate_prompt_text(text: &str) -> Result<(), ValidationError> {
    let count = text.trim().chars().count();
    if !(MIN_PROMPT_CHARS..=MAX_PROMPT_CHARS).contains(&count) {
        let mut err = ValidationError::new("prompt_length");
        err.message = Some(
            format!(
                "Prompt must be between {MIN_PROMPT_CHARS} and {MAX_PROMPT_CHARS} characters (got {count})"
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Validates the roster of a new game: 2 to 12 non-empty, case-insensitively unique names.
pub fn validate_player_names(names: &[String]) -> Result<(), ValidationError> {
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&names.len()) {
        let mut err = ValidationError::new("player_count");
        err.message = Some(
            format!(
                "A game needs between {MIN_PLAYERS} and {MAX_PLAYERS} players (got {})",
                names.len()
            )
            .into(),
        );
        return Err(err);
    }

    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            let mut err = ValidationError::new("player_name_empty");
            err.message = Some("Player names must not be empty".into());
            return Err(err);
        }
        if !seen.insert(normalized) {
            let mut err = ValidationError::new("player_name_duplicate");
            err.message = Some(format!("Player name `{}` is used twice", name.trim()).into());
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_prompt_text_bounds() {
        assert!(validate_prompt_text("cat").is_ok());
        assert!(validate_prompt_text("   cat   ").is_ok());
        assert!(validate_prompt_text(&"a".repeat(200)).is_ok());
        assert!(validate_prompt_text("ca").is_err()); // too short
        assert!(validate_prompt_text("  ca  ").is_err()); // too short once trimmed
        assert!(validate_prompt_text(&"a".repeat(201)).is_err()); // too long
    }

    #[test]
    fn test_validate_player_names() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(validate_player_names(&names(&["ann", "bob"])).is_ok());
        assert!(validate_player_names(&names(&["ann"])).is_err()); // too few
        assert!(validate_player_names(&names(&["ann", " "])).is_err()); // empty
        assert!(validate_player_names(&names(&["Ann", "ann "])).is_err()); // duplicate
        let crowd: Vec<String> = (0..13).map(|i| format!("p{i}")).collect();
        assert!(validate_player_names(&crowd).is_err()); // too many
    }
}
