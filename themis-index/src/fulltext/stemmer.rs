//! Porter-subset English stemmer and suffix-stripping German stemmer
//! (spec.md §4.5.6). Grounded byte-for-byte in
//! `original_source/src/utils/stemmer.cpp`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    German,
    None,
}

impl Language {
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code.to_ascii_lowercase().as_str() {
            "en" => Language::English,
            "de" => Language::German,
            _ => Language::None,
        }
    }
}

#[must_use]
pub fn stem(token: &str, lang: Language) -> String {
    if lang == Language::None || token.is_empty() {
        return token.to_string();
    }
    let word = token.to_ascii_lowercase();
    if word.len() <= 2 {
        return word;
    }
    match lang {
        Language::English => stem_english(&word),
        Language::German => stem_german(&word),
        Language::None => word,
    }
}

fn has_vowel(word: &str) -> bool {
    word.bytes().any(|b| matches!(b, b'a' | b'e' | b'i' | b'o' | b'u' | b'y'))
}

fn ends_with_double_consonant(word: &str) -> bool {
    let bytes = word.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    let last = bytes[bytes.len() - 1];
    let prev = bytes[bytes.len() - 2];
    last == prev && !matches!(last, b'a' | b'e' | b'i' | b'o' | b'u')
}

fn replace_ending(word: String, from: &str, to: &str) -> String {
    if word.len() > from.len() && word.ends_with(from) {
        let stem = &word[..word.len() - from.len()];
        if has_vowel(stem) {
            return format!("{stem}{to}");
        }
    }
    word
}

fn stem_english(input: &str) -> String {
    let mut word = input.to_string();
    if word.len() <= 2 {
        return word;
    }

    // Step 1a: plurals.
    if word.ends_with("sses") {
        word.truncate(word.len() - 2);
    } else if word.ends_with("ies") {
        word.truncate(word.len() - 2);
    } else if word.ends_with("ss") {
        // unchanged
    } else if word.ends_with('s') && word.len() > 3 {
        word.truncate(word.len() - 1);
    }

    // Step 1b: -ed, -ing.
    if word.ends_with("eed") {
        if has_vowel(&word[..word.len() - 3]) {
            word.truncate(word.len() - 1);
        }
    } else if word.ends_with("ed") {
        let stem = word[..word.len() - 2].to_string();
        if has_vowel(&stem) {
            word = stem;
            if ends_with_double_consonant(&word)
                && !word.ends_with("ll")
                && !word.ends_with("ss")
                && !word.ends_with("zz")
            {
                word.truncate(word.len() - 1);
            }
        }
    } else if word.ends_with("ing") {
        let stem = word[..word.len() - 3].to_string();
        if has_vowel(&stem) {
            word = stem;
            if ends_with_double_consonant(&word)
                && !word.ends_with("ll")
                && !word.ends_with("ss")
                && !word.ends_with("zz")
            {
                word.truncate(word.len() - 1);
            }
        }
    }

    // Step 1c: y -> i, only when preceded by a consonant.
    if word.len() > 2 && word.ends_with('y') {
        let prev = word.as_bytes()[word.len() - 2];
        let prev_is_vowel = matches!(prev, b'a' | b'e' | b'i' | b'o' | b'u');
        let stem = word[..word.len() - 1].to_string();
        if !prev_is_vowel && has_vowel(&stem) {
            word = format!("{stem}i");
        }
    }

    // Step 2: a small suffix table.
    word = replace_ending(word, "ational", "ate");
    word = replace_ending(word, "tional", "tion");
    word = replace_ending(word, "alism", "al");
    word = replace_ending(word, "ation", "ate");
    word = replace_ending(word, "ness", "");
    word = replace_ending(word, "enci", "enc");

    word
}

fn stem_german(input: &str) -> String {
    let mut word = input.to_string();
    if word.len() <= 3 {
        return word;
    }

    if word.ends_with("ern") {
        word.truncate(word.len() - 3);
    } else if word.ends_with("em") {
        word.truncate(word.len() - 2);
    } else if word.ends_with("en") {
        word.truncate(word.len() - 2);
    } else if word.ends_with("er") {
        word.truncate(word.len() - 2);
    } else if word.ends_with("es") {
        word.truncate(word.len() - 2);
    } else if word.ends_with('e') {
        word.truncate(word.len() - 1);
    } else if word.ends_with('s') && word.len() > 4 {
        word.truncate(word.len() - 1);
    }

    if word.len() > 5 {
        if word.ends_with("ung") {
            word.truncate(word.len() - 3);
        } else if word.ends_with("heit") {
            word.truncate(word.len() - 4);
        } else if word.ends_with("keit") {
            word.truncate(word.len() - 4);
        } else if word.ends_with("lich") {
            word.truncate(word.len() - 4);
        }
    }

    word
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn english_strips_plural_and_ing() {
        assert_eq!(stem("cats", Language::English), "cat");
        assert_eq!(stem("running", Language::English), "run");
    }

    #[test]
    fn english_keeps_short_words() {
        assert_eq!(stem("at", Language::English), "at");
    }

    #[test]
    fn german_strips_plural_suffix() {
        assert_eq!(stem("Katzen", Language::German), "katz");
    }

    #[test]
    fn none_language_is_identity() {
        assert_eq!(stem("Running", Language::None), "Running");
    }
}
