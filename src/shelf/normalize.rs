use unicode_normalization::UnicodeNormalization;

const SEPARATOR: char = ' ';
const MAX_SEGMENT_BYTES: usize = 120;
const SAFE_PUNCTUATION: &[char] = &['-', '_', '.', ',', '(', ')', '+', '&', '\''];

/// Drop TeX markup that survives BibTeX values: braces, accent commands
/// (`\"o`, `\'e`) and the backslash of word commands (`\ss`).
fn strip_tex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' | '}' => {}
            '\\' => {
                let accent = chars
                    .peek()
                    .is_some_and(|next| matches!(*next, '"' | '\'' | '^' | '`' | '~' | '=' | '.'));
                if accent {
                    chars.next();
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn is_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || SAFE_PUNCTUATION.contains(&ch)
}

/// Turn a free-form value into one filesystem-safe path component.
///
/// Non-ASCII is transliterated through NFKD (diacritics dropped), every run of
/// unsafe or whitespace characters collapses to a single space, and leading or
/// trailing separators and dots are stripped. Returns an empty string when
/// nothing usable remains.
pub fn normalize_segment(input: &str) -> String {
    let plain = strip_tex(input);
    let mut out = String::with_capacity(plain.len());
    let mut prev_sep = false;
    for ch in plain.nfkd().filter(char::is_ascii) {
        if is_safe(ch) {
            out.push(ch);
            prev_sep = false;
        } else if !prev_sep && !out.is_empty() {
            out.push(SEPARATOR);
            prev_sep = true;
        }
    }

    if out.len() > MAX_SEGMENT_BYTES {
        out.truncate(MAX_SEGMENT_BYTES);
    }
    out.trim_matches(|c: char| c == SEPARATOR || c == '.')
        .to_string()
}

/// Uppercase the first letter of every word, leave the rest alone.
pub fn capitalize_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for ch in input.chars() {
        if at_word_start {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = ch.is_whitespace() || ch == '-';
    }
    out
}
