//! Cleanup rules for raw OCR text.
//!
//! The rules run in a fixed order. Digit collapsing expects the glyph fix
//! to have already produced its `1`, and line breaks are flattened last so
//! a break between two digits survives as a space.

use std::sync::LazyLock;

use regex::Regex;

/// A slanted `1` that OCR reads as a left smart quote plus `!`. The first
/// form is the UTF-8 quote decoded as Windows-1252.
const SLANTED_ONE_ARTIFACTS: [&str; 2] = ["\u{e2}\u{20ac}\u{2dc}!", "\u{2018}!"];

static DIGIT_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d) (\d)").unwrap());

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n|\r|\n").unwrap());

/// Apply every cleanup rule to one OCR result.
pub fn normalize(raw: &str) -> String {
    let text = fix_slanted_ones(raw);
    let text = collapse_digit_gaps(&text);
    flatten_line_breaks(&text)
}

/// Rule 1: replace the known misread of a slanted `1`.
pub fn fix_slanted_ones(text: &str) -> String {
    SLANTED_ONE_ARTIFACTS
        .iter()
        .fold(text.to_string(), |acc, artifact| acc.replace(artifact, "1"))
}

/// Rule 2: join digits separated by a single space, until none remain.
///
/// One regex pass cannot see overlapping pairs (`1 2 3` becomes `12 3`),
/// so the pass repeats.
pub fn collapse_digit_gaps(text: &str) -> String {
    let mut current = text.to_string();
    while DIGIT_GAP.is_match(&current) {
        current = DIGIT_GAP.replace_all(&current, "${1}${2}").into_owned();
    }
    current
}

/// Rule 3: turn each CRLF, CR or LF into one space.
pub fn flatten_line_breaks(text: &str) -> String {
    LINE_BREAK.replace_all(text, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_pairs_collapse() {
        assert_eq!(normalize("12 34"), "1234");
        assert_eq!(normalize("1 2 3 4"), "1234");
        assert_eq!(normalize("EIN 52 1234567"), "EIN 521234567");
    }

    #[test]
    fn test_words_keep_spaces() {
        assert_eq!(normalize("Sunlight Foundation"), "Sunlight Foundation");
        assert_eq!(normalize("Suite 4 B"), "Suite 4 B");
    }

    #[test]
    fn test_line_breaks_flatten() {
        assert_eq!(normalize("1\n2"), "1 2");
        assert_eq!(normalize("Washington\r\nDC"), "Washington DC");
        assert_eq!(normalize("a\rb\nc"), "a b c");
    }

    #[test]
    fn test_slanted_one_fixed() {
        assert_eq!(normalize("\u{e2}\u{20ac}\u{2dc}!0 000"), "10000");
        assert_eq!(normalize("2\u{2018}! 5"), "215");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "12 34",
            "1 2 3",
            "Room 12 3B",
            "\u{e2}\u{20ac}\u{2dc}! 2",
            "Name\r\nLine two",
            "$ 1 234 567",
            "   ",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_break_between_digits_is_not_idempotent() {
        // The flattened space is itself a digit gap on a second pass
        assert_eq!(normalize("1\n2"), "1 2");
        assert_eq!(normalize(&normalize("1\n2")), "12");
    }
}
