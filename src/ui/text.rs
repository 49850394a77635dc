/// Cut every space-separated word longer than `max_chars` characters to
/// that length followed by `...`. Spacing is preserved.
#[must_use]
pub fn trim_long_words(text: &str, max_chars: usize) -> String {
    text.split(' ')
        .map(|word| {
            if word.chars().count() > max_chars {
                let kept: String = word.chars().take(max_chars).collect();
                format!("{kept}...")
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_words_are_untouched() {
        assert_eq!(trim_long_words("Hello, world!", 35), "Hello, world!");
        assert_eq!(trim_long_words("  two  spaces ", 35), "  two  spaces ");
    }

    #[test]
    fn long_words_are_cut() {
        let url = "https://example.com/a/very/long/path/segment";
        assert_eq!(
            trim_long_words(&format!("see {url} now"), 10),
            "see https://ex... now"
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(trim_long_words("ééééé", 5), "ééééé");
        assert_eq!(trim_long_words("éééééé", 5), "ééééé...");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(trim_long_words("", 35), "");
    }
}
