//! Log hygiene helpers.
//!
//! Session tokens double as the only credential a student holds for their
//! transcript, so they never appear in logs in full.

/// Redact sensitive values for safe logging. Shows first 4 chars + "***" suffix.
pub fn redact(value: &str) -> String {
    let mut chars = value.char_indices();
    match chars.nth(4) {
        Some((cut, _)) => format!("{}***", &value[..cut]),
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_hides_most_of_value() {
        assert_eq!(redact("abcdefgh"), "abcd***");
        assert_eq!(redact("ab"), "***");
        assert_eq!(redact(""), "***");
        assert_eq!(redact("12345"), "1234***");
    }

    #[test]
    fn redact_respects_char_boundaries() {
        assert_eq!(redact("ñañañaña"), "ñaña***");
    }

    #[test]
    fn redact_four_chars_is_fully_hidden() {
        assert_eq!(redact("abcd"), "***");
    }
}
