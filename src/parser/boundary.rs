//! Sentence-boundary segmentation (§3). Operates on one already-flattened
//! text block at a time. A `.`/`!`/`?` ends a sentence only when it is not
//! part of a known abbreviation, a decimal number, or mid-ellipsis, and is
//! followed by whitespace and then either end of text, an uppercase
//! letter, an opening quote, or an opening parenthesis.

use std::ops::Range;

/// Common abbreviations whose trailing period must not be read as a
/// sentence boundary. Matched case-insensitively against the word
/// immediately preceding the period. Lowercase; titles, common words,
/// months, technical terms, units, and file extensions.
const ABBREVIATIONS: &[&str] = &[
    // titles
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "ph.d", "m.d",
    // common
    "etc", "vs", "v", "e.g", "i.e", "inc", "ltd", "co", "corp",
    // months
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    // technical
    "api", "url", "http", "https", "cpu", "ram", "os", "sdk", "sql",
    // units
    "mm", "cm", "m", "km", "kg", "g", "sec", "min", "hr",
    // file extensions
    "md", "txt", "go", "py", "js", "ts", "html", "css", "json", "xml", "yml", "yaml", "toml",
];

pub fn split_sentences(text: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let len = chars.len();
    let mut ranges = Vec::new();
    let mut start_idx = 0usize;

    let byte_of = |idx: usize| -> usize {
        if idx < len {
            chars[idx].0
        } else {
            text.len()
        }
    };

    let mut i = 0usize;
    while i < len {
        let ch = chars[i].1;
        if ch == '.' || ch == '!' || ch == '?' {
            if is_decimal_point(&chars, i) {
                i += 1;
                continue;
            }

            let mut end = i;
            if ch == '.' {
                // Consume a run of dots as one ellipsis unit.
                while end + 1 < len && chars[end + 1].1 == '.' {
                    end += 1;
                }
            }

            if !is_terminator_boundary(&chars, start_idx, i, end) {
                i = end + 1;
                continue;
            }

            let range = byte_of(start_idx)..byte_of(end + 1);
            push_trimmed(text, &mut ranges, range);

            // Skip whitespace to find the next sentence's start.
            let mut next = end + 1;
            while next < len && chars[next].1.is_whitespace() {
                next += 1;
            }
            start_idx = next;
            i = next;
            continue;
        }
        i += 1;
    }

    if start_idx < len {
        let range = byte_of(start_idx)..text.len();
        push_trimmed(text, &mut ranges, range);
    }

    ranges
}

fn push_trimmed(text: &str, ranges: &mut Vec<Range<usize>>, range: Range<usize>) {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    let trimmed = (range.start + leading)..(range.end - trailing);
    if trimmed.start < trimmed.end {
        ranges.push(trimmed);
    }
}

fn is_decimal_point(chars: &[(usize, char)], i: usize) -> bool {
    if chars[i].1 != '.' {
        return false;
    }
    let prev_is_digit = i > 0 && chars[i - 1].1.is_ascii_digit();
    let next_is_digit = i + 1 < chars.len() && chars[i + 1].1.is_ascii_digit();
    prev_is_digit && next_is_digit
}

/// `end` is the index of the last dot in a (possibly multi-dot) terminator
/// starting review from `i`; `start_idx` bounds the preceding word lookup.
fn is_terminator_boundary(chars: &[(usize, char)], start_idx: usize, i: usize, end: usize) -> bool {
    let is_ellipsis = end > i;
    if is_ellipsis {
        return next_char_is_strong_start(chars, end);
    }

    if chars[i].1 == '.' && preceding_word_is_abbreviation(chars, start_idx, i) {
        return false;
    }

    let has_following_char = end + 1 < chars.len();
    if !has_following_char {
        return true;
    }
    // Require at least one whitespace character after the terminator
    // before we consider this a true sentence end.
    if !chars[end + 1].1.is_whitespace() {
        return false;
    }
    next_char_is_strong_start(chars, end)
}

fn next_char_is_strong_start(chars: &[(usize, char)], end: usize) -> bool {
    let mut j = end + 1;
    while j < chars.len() && chars[j].1.is_whitespace() {
        j += 1;
    }
    if j >= chars.len() {
        return true;
    }
    let c = chars[j].1;
    c.is_uppercase() || c == '"' || c == '\'' || c == '(' || c == '\u{201c}'
}

fn preceding_word_is_abbreviation(chars: &[(usize, char)], start_idx: usize, period_idx: usize) -> bool {
    let mut j = period_idx;
    while j > start_idx && !chars[j - 1].1.is_whitespace() {
        j -= 1;
    }
    let word: String = chars[j..period_idx].iter().map(|(_, c)| *c).collect();
    let word = word.to_lowercase();
    if ABBREVIATIONS.iter().any(|abbr| *abbr == word) {
        return true;
    }
    // For a dotted token like "file.txt" only the final segment ("txt") is
    // the meaningful abbreviation (a file extension); fall back to it.
    match word.rsplit_once('.') {
        Some((_, tail)) => ABBREVIATIONS.contains(&tail),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str) -> Vec<&str> {
        split_sentences(text).into_iter().map(|r| &text[r]).collect()
    }

    #[test]
    fn splits_on_simple_periods() {
        assert_eq!(texts("One. Two. Three."), vec!["One.", "Two.", "Three."]);
    }

    #[test]
    fn does_not_split_on_abbreviation() {
        assert_eq!(texts("Dr. Smith arrived early."), vec!["Dr. Smith arrived early."]);
    }

    #[test]
    fn does_not_split_on_decimal_number() {
        assert_eq!(texts("The value is 3.14 exactly."), vec!["The value is 3.14 exactly."]);
    }

    #[test]
    fn ellipsis_without_capital_is_not_a_boundary() {
        assert_eq!(texts("Well... that happened."), vec!["Well... that happened."]);
    }

    #[test]
    fn ellipsis_followed_by_capital_is_a_boundary() {
        assert_eq!(texts("Well... Something happened."), vec!["Well...", "Something happened."]);
    }

    #[test]
    fn splits_on_question_and_exclamation() {
        assert_eq!(texts("Really? Yes! Absolutely."), vec!["Really?", "Yes!", "Absolutely."]);
    }

    #[test]
    fn final_sentence_without_terminator_is_kept() {
        assert_eq!(texts("This has no ending punctuation"), vec!["This has no ending punctuation"]);
    }

    #[test]
    fn quote_after_terminator_counts_as_boundary() {
        assert_eq!(texts("He said it. \"Really,\" she replied."), vec!["He said it.", "\"Really,\" she replied."]);
    }

    #[test]
    fn abbreviation_match_is_case_insensitive() {
        assert_eq!(texts("It shipped in Jan. Sales rose."), vec!["It shipped in Jan.", "Sales rose."]);
        assert_eq!(texts("it shipped in JAN. sales rose."), vec!["it shipped in JAN.", "sales rose."]);
    }

    #[test]
    fn unit_and_file_extension_abbreviations_are_recognized() {
        assert_eq!(texts("The cable is 5 m. long."), vec!["The cable is 5 m. long."]);
        assert_eq!(texts("Open main.go. It compiles."), vec!["Open main.go.", "It compiles."]);
    }
}
