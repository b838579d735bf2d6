/* Character classes and text splitting shared by the signal calculator and the filters */

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unic_ucd::GeneralCategory;

/*================================================================================
=                            PUNCTUATION                                         =
================================================================================*/

/// Sentence-terminal characters: FineWeb's western set plus the sentencizer's
/// multi-script terminal punctuation.
pub const STOP_CHARS: [char; 130] = [
    '.', '\'', '"', '!', '?', '\u{589}', '\u{61F}', '\u{6D4}', '\u{700}', '\u{701}', '\u{702}',
    '\u{7F9}', '\u{964}', '\u{965}', '\u{104A}', '\u{104B}', '\u{1362}', '\u{1367}', '\u{1368}',
    '\u{166E}', '\u{1735}', '\u{1736}', '\u{1803}', '\u{1809}', '\u{1944}', '\u{1945}', '\u{1AA8}',
    '\u{1AA9}', '\u{1AAA}', '\u{1AAB}', '\u{1B5A}', '\u{1B5B}', '\u{1B5E}', '\u{1B5F}', '\u{1C3B}',
    '\u{1C3C}', '\u{1C7E}', '\u{1C7F}', '\u{203C}', '\u{203D}', '\u{2047}', '\u{2048}', '\u{2049}',
    '\u{2E2E}', '\u{2E3C}', '\u{A4FF}', '\u{A60E}', '\u{A60F}', '\u{A6F3}', '\u{A6F7}', '\u{A876}',
    '\u{A877}', '\u{A8CE}', '\u{A8CF}', '\u{A92F}', '\u{A9C8}', '\u{A9C9}', '\u{AA5D}', '\u{AA5E}',
    '\u{AA5F}', '\u{AAF0}', '\u{AAF1}', '\u{ABEB}', '\u{FE52}', '\u{FE56}', '\u{FE57}', '\u{FF01}',
    '\u{FF0E}', '\u{FF1F}', '\u{10A56}', '\u{10A57}', '\u{11047}', '\u{11048}', '\u{110BE}',
    '\u{110BF}', '\u{110C0}', '\u{110C1}', '\u{11141}', '\u{11142}', '\u{11143}', '\u{111C5}',
    '\u{111C6}', '\u{111CD}', '\u{111DE}', '\u{111DF}', '\u{11238}', '\u{11239}', '\u{1123B}',
    '\u{1123C}', '\u{112A9}', '\u{1144B}', '\u{1144C}', '\u{115C2}', '\u{115C3}', '\u{115C9}',
    '\u{115CA}', '\u{115CB}', '\u{115CC}', '\u{115CD}', '\u{115CE}', '\u{115CF}', '\u{115D0}',
    '\u{115D1}', '\u{115D2}', '\u{115D3}', '\u{115D4}', '\u{115D5}', '\u{115D6}', '\u{115D7}',
    '\u{11641}', '\u{11642}', '\u{1173C}', '\u{1173D}', '\u{1173E}', '\u{11A42}', '\u{11A43}',
    '\u{11A9B}', '\u{11A9C}', '\u{11C41}', '\u{11C42}', '\u{16A6E}', '\u{16A6F}', '\u{16AF5}',
    '\u{16B37}', '\u{16B38}', '\u{16B44}', '\u{1BC9F}', '\u{1DA88}', '\u{FF61}', '\u{3002}',
];

/// Khmer line terminators, added on top of `STOP_CHARS`
pub const KHMER_STOP_CHARS: [char; 6] = [
    '\u{179B}', '\u{17D4}', '\u{17D5}', '\u{17D6}', '\u{17D9}', '\u{17DA}',
];

static TERMINAL_PUNCTUATION: Lazy<HashSet<char>> = Lazy::new(|| {
    STOP_CHARS.iter().chain(KHMER_STOP_CHARS.iter()).copied().collect()
});

static PARAGRAPH_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static LINE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());

pub const ELLIPSIS: &str = "...";
pub const ELLIPSIS_CHAR: &str = "\u{2026}";
pub const BULLETS: [&str; 2] = ["\u{2022}", "-"];


/// Unicode punctuation or symbol (covers ASCII `string.punctuation` as well)
pub fn is_punctuation(c: char) -> bool {
    let cat = GeneralCategory::of(c);
    cat.is_punctuation() || cat.is_symbol()
}

/// A token is a "word" once it carries at least one non-punctuation character
pub fn is_word(token: &str) -> bool {
    token.chars().any(|c| !is_punctuation(c))
}

pub fn has_alpha(token: &str) -> bool {
    token.chars().any(|c| c.is_alphabetic())
}

pub fn ends_with_terminal_punctuation(line: &str) -> bool {
    line.chars().next_back().map_or(false, |c| TERMINAL_PUNCTUATION.contains(&c))
}

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}


/*================================================================================
=                            SPLITTING                                           =
================================================================================*/

/// Lines on `\n` with whitespace-only lines removed
pub fn non_blank_lines(text: &str) -> Vec<&str> {
    text.split('\n').filter(|line| !line.trim().is_empty()).collect()
}

/// Lines on any line boundary (`\n`, `\r\n`), keeping empty ones
pub fn all_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// Runs of `\n` collapse into one separator; a trailing newline leaves an empty last line
pub fn newline_runs(text: &str) -> Vec<&str> {
    LINE_SPLIT.split(text).collect()
}

/// Paragraphs are separated by two or more newlines; surrounding whitespace is dropped first
pub fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_SPLIT.split(text.trim()).collect()
}
