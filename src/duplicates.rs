/*
Exact-duplicate detection over lines, paragraphs and n-grams.

These are the building blocks behind the Gopher repetition ratios. All of them are
pure functions over an ordered sequence of units and measure length in characters
(unicode scalar values), not bytes.
*/

use std::collections::{HashMap, HashSet};

use crate::text::char_len;


/// Counts the units that belong to a group of two or more identical units, and the
/// total character length of those units. Singletons are not counted.
/// `["a", "a", "b"]` -> `(2, 2)`
pub fn find_duplicates<S: AsRef<str>>(units: &[S]) -> (usize, usize) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for unit in units {
        *counts.entry(unit.as_ref()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .fold((0, 0), |(dup_count, dup_chars), (unit, count)| {
            (dup_count + count, dup_chars + count * char_len(unit))
        })
}


/// Overlapping n-grams (step 1) joined with a single space
pub fn get_n_grams<S: AsRef<str>>(tokens: &[S], n: usize) -> Vec<String> {
    if n == 0 || tokens.len() < n {
        return Vec::new();
    }
    tokens
        .windows(n)
        .map(|w| w.iter().map(|t| t.as_ref()).collect::<Vec<_>>().join(" "))
        .collect()
}


/// Character length contributed by the extra occurrences of the most frequent n-gram:
/// `(occurrences - 1) * len(gram)`. Ties on frequency go to the gram seen first.
pub fn find_top_duplicate<S: AsRef<str>>(n_grams: &[S]) -> usize {
    // gram -> (count, first index)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, gram) in n_grams.iter().enumerate() {
        counts.entry(gram.as_ref()).or_insert((0, idx)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|a, b| {
            let (count_a, first_a) = a.1;
            let (count_b, first_b) = b.1;
            count_a.cmp(&count_b).then(first_b.cmp(&first_a))
        })
        .map(|(gram, (count, _))| (count - 1) * char_len(gram))
        .unwrap_or(0)
}


/// Character length of all repeated n-grams for a fixed `n`.
///
/// Scans left to right; when the window starting at `idx` was already seen, its
/// characters are counted and the scan jumps past the whole window so that overlapping
/// repeats are not counted twice. The length of an n-gram is the sum of its tokens'
/// lengths, so the result never exceeds the total token length.
pub fn find_all_duplicate<S: AsRef<str>>(tokens: &[S], n: usize) -> usize {
    if n == 0 || tokens.len() < n {
        return 0;
    }
    let tokens: Vec<&str> = tokens.iter().map(|t| t.as_ref()).collect();
    let mut seen: HashSet<&[&str]> = HashSet::new();
    let mut repeated_chars = 0;
    let mut idx = 0;

    while idx + n <= tokens.len() {
        let window = &tokens[idx..idx + n];
        if seen.contains(&window) {
            repeated_chars += window.iter().map(|t| char_len(t)).sum::<usize>();
            idx += n;
        } else {
            seen.insert(window);
            idx += 1;
        }
    }
    repeated_chars
}
