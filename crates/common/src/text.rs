//! Text normalization shared by the lexical index and the hashing embedder

/// Lower-case and split on non-alphanumeric boundaries, dropping empty tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_and_lowercases() {
        assert_eq!(tokenize("Cats, and DOGS!"), vec!["cats", "and", "dogs"]);
        assert_eq!(tokenize("rust-lang_2024"), vec!["rust", "lang", "2024"]);
        assert!(tokenize(" -- ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_unicode_letters() {
        assert_eq!(tokenize("Café über"), vec!["café", "über"]);
    }
}
