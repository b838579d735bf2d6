/*
Per-document quality signals.

One pass over a document produces a fixed vector of 24 non-negative ratios (Gopher
quality, FineWeb line heuristics, Gopher repetition, language score). Any ratio whose
denominator is zero is 0. The same vector feeds the streaming statistics collector and
the live filters.
*/

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Error, Result};
use serde::{Deserialize, Serialize};
use serde::ser::SerializeMap;

use crate::document::Document;
use crate::duplicates::{find_all_duplicate, find_duplicates, find_top_duplicate, get_n_grams};
use crate::lang_id::LanguageScorer;
use crate::text::{
    all_lines, char_len, ends_with_terminal_punctuation, has_alpha, is_word, newline_runs,
    non_blank_lines, paragraphs, BULLETS, ELLIPSIS, ELLIPSIS_CHAR,
};
use crate::tokenizer::TokenizerRegistry;
use crate::utils::ratio;

pub const DEFAULT_SHORT_LINE_LENGTH: usize = 30;
pub const TOP_N_GRAMS: [usize; 3] = [2, 3, 4];
pub const DUPLICATED_N_GRAMS: [usize; 6] = [5, 6, 7, 8, 9, 10];


/*================================================================================
=                            METRIC KEYS                                         =
================================================================================*/

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    AvgWordLength,
    HashWordRatio,
    EllipsisWordRatio,
    BulletStartRatio,
    EllipsisEndRatio,
    AlphaRatio,
    LinePunctRatio,
    ShortLineRatio,
    DuplicateLineRatio,
    NewLineRatio,
    DupParaFrac,
    DupParaCharFrac,
    DupLineFrac,
    DupLineCharFrac,
    #[serde(rename = "top_2_gram")]
    Top2Gram,
    #[serde(rename = "top_3_gram")]
    Top3Gram,
    #[serde(rename = "top_4_gram")]
    Top4Gram,
    #[serde(rename = "duplicated_5_grams")]
    Duplicated5Grams,
    #[serde(rename = "duplicated_6_grams")]
    Duplicated6Grams,
    #[serde(rename = "duplicated_7_grams")]
    Duplicated7Grams,
    #[serde(rename = "duplicated_8_grams")]
    Duplicated8Grams,
    #[serde(rename = "duplicated_9_grams")]
    Duplicated9Grams,
    #[serde(rename = "duplicated_10_grams")]
    Duplicated10Grams,
    LanguageScore,
}

impl MetricKey {
    pub const COUNT: usize = 24;

    pub const ALL: [MetricKey; MetricKey::COUNT] = [
        MetricKey::AvgWordLength,
        MetricKey::HashWordRatio,
        MetricKey::EllipsisWordRatio,
        MetricKey::BulletStartRatio,
        MetricKey::EllipsisEndRatio,
        MetricKey::AlphaRatio,
        MetricKey::LinePunctRatio,
        MetricKey::ShortLineRatio,
        MetricKey::DuplicateLineRatio,
        MetricKey::NewLineRatio,
        MetricKey::DupParaFrac,
        MetricKey::DupParaCharFrac,
        MetricKey::DupLineFrac,
        MetricKey::DupLineCharFrac,
        MetricKey::Top2Gram,
        MetricKey::Top3Gram,
        MetricKey::Top4Gram,
        MetricKey::Duplicated5Grams,
        MetricKey::Duplicated6Grams,
        MetricKey::Duplicated7Grams,
        MetricKey::Duplicated8Grams,
        MetricKey::Duplicated9Grams,
        MetricKey::Duplicated10Grams,
        MetricKey::LanguageScore,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetricKey::AvgWordLength => "avg_word_length",
            MetricKey::HashWordRatio => "hash_word_ratio",
            MetricKey::EllipsisWordRatio => "ellipsis_word_ratio",
            MetricKey::BulletStartRatio => "bullet_start_ratio",
            MetricKey::EllipsisEndRatio => "ellipsis_end_ratio",
            MetricKey::AlphaRatio => "alpha_ratio",
            MetricKey::LinePunctRatio => "line_punct_ratio",
            MetricKey::ShortLineRatio => "short_line_ratio",
            MetricKey::DuplicateLineRatio => "duplicate_line_ratio",
            MetricKey::NewLineRatio => "new_line_ratio",
            MetricKey::DupParaFrac => "dup_para_frac",
            MetricKey::DupParaCharFrac => "dup_para_char_frac",
            MetricKey::DupLineFrac => "dup_line_frac",
            MetricKey::DupLineCharFrac => "dup_line_char_frac",
            MetricKey::Top2Gram => "top_2_gram",
            MetricKey::Top3Gram => "top_3_gram",
            MetricKey::Top4Gram => "top_4_gram",
            MetricKey::Duplicated5Grams => "duplicated_5_grams",
            MetricKey::Duplicated6Grams => "duplicated_6_grams",
            MetricKey::Duplicated7Grams => "duplicated_7_grams",
            MetricKey::Duplicated8Grams => "duplicated_8_grams",
            MetricKey::Duplicated9Grams => "duplicated_9_grams",
            MetricKey::Duplicated10Grams => "duplicated_10_grams",
            MetricKey::LanguageScore => "language_score",
        }
    }

    pub fn top_n_gram(n: usize) -> Option<MetricKey> {
        match n {
            2 => Some(MetricKey::Top2Gram),
            3 => Some(MetricKey::Top3Gram),
            4 => Some(MetricKey::Top4Gram),
            _ => None,
        }
    }

    pub fn duplicated_n_grams(n: usize) -> Option<MetricKey> {
        match n {
            5 => Some(MetricKey::Duplicated5Grams),
            6 => Some(MetricKey::Duplicated6Grams),
            7 => Some(MetricKey::Duplicated7Grams),
            8 => Some(MetricKey::Duplicated8Grams),
            9 => Some(MetricKey::Duplicated9Grams),
            10 => Some(MetricKey::Duplicated10Grams),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .iter()
            .find(|k| k.name() == s)
            .copied()
            .ok_or_else(|| anyhow!("Unknown metric {:?}", s))
    }
}


/*================================================================================
=                            SIGNAL VECTOR                                       =
================================================================================*/

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalVector {
    values: [f64; MetricKey::COUNT],
}

impl SignalVector {
    pub fn get(&self, key: MetricKey) -> f64 {
        self.values[key.index()]
    }

    pub fn set(&mut self, key: MetricKey, value: f64) {
        self.values[key.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, f64)> + '_ {
        MetricKey::ALL.iter().map(move |k| (*k, self.values[k.index()]))
    }
}

impl Serialize for SignalVector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(MetricKey::COUNT))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key.name(), &value)?;
        }
        map.end()
    }
}


/// Everything one document contributes: the ratios plus the token material the
/// collector (word counters) and the filters (word counts, stop words) need
#[derive(Clone, Debug)]
pub struct DocumentSignals {
    pub signals: SignalVector,
    /// All tokens, punctuation included
    pub tokens: Vec<String>,
    /// Tokens with at least one non-punctuation character
    pub words: Vec<String>,
    pub n_bytes: usize,
}

impl DocumentSignals {
    pub fn get(&self, key: MetricKey) -> f64 {
        self.signals.get(key)
    }

    pub fn n_words(&self) -> usize {
        self.words.len()
    }

    pub fn n_tokens(&self) -> usize {
        self.tokens.len()
    }
}


/*================================================================================
=                            CALCULATOR                                          =
================================================================================*/

pub struct SignalCalculator {
    tokenizers: Arc<TokenizerRegistry>,
    scorer: Option<Arc<dyn LanguageScorer>>,
    short_line_length: usize,
}

impl SignalCalculator {
    pub fn new(
        tokenizers: Arc<TokenizerRegistry>,
        scorer: Option<Arc<dyn LanguageScorer>>,
        short_line_length: usize,
    ) -> Self {
        Self { tokenizers, scorer, short_line_length }
    }

    pub fn tokenizers(&self) -> &TokenizerRegistry {
        &self.tokenizers
    }

    pub fn compute_signals(&self, doc: &Document) -> Result<DocumentSignals, Error> {
        self.compute(&doc.text, &doc.language)
    }

    pub fn compute(&self, text: &str, language: &str) -> Result<DocumentSignals, Error> {
        let tokens = self.tokenizers.tokenize(text, language);
        let words: Vec<String> = tokens.iter().filter(|t| is_word(t)).cloned().collect();
        let mut signals = SignalVector::default();

        let n_tokens = tokens.len() as f64;
        let n_text = char_len(text) as f64;

        // Gopher quality
        let word_chars: usize = words.iter().map(|w| char_len(w)).sum();
        signals.set(MetricKey::AvgWordLength, ratio(word_chars as f64, words.len() as f64));
        signals.set(MetricKey::HashWordRatio, ratio(text.matches('#').count() as f64, n_tokens));
        let n_ellipsis = text.matches(ELLIPSIS).count() + text.matches(ELLIPSIS_CHAR).count();
        signals.set(MetricKey::EllipsisWordRatio, ratio(n_ellipsis as f64, n_tokens));

        let lines: Vec<&str> = all_lines(text).into_iter().filter(|l| !l.is_empty()).collect();
        let n_lines = lines.len() as f64;
        let bullet_lines = lines
            .iter()
            .filter(|l| {
                let l = l.trim_start();
                BULLETS.iter().any(|b| l.starts_with(b))
            })
            .count();
        signals.set(MetricKey::BulletStartRatio, ratio(bullet_lines as f64, n_lines));
        let end_ellipsis_lines = lines
            .iter()
            .filter(|l| {
                let l = l.trim_end();
                l.ends_with(ELLIPSIS) || l.ends_with(ELLIPSIS_CHAR)
            })
            .count();
        signals.set(MetricKey::EllipsisEndRatio, ratio(end_ellipsis_lines as f64, n_lines));

        let alpha_tokens = tokens.iter().filter(|t| has_alpha(t)).count();
        signals.set(MetricKey::AlphaRatio, ratio(alpha_tokens as f64, n_tokens));

        // FineWeb
        let text_lines = non_blank_lines(text);
        let n_text_lines = text_lines.len() as f64;
        let punct_lines = text_lines.iter().filter(|l| ends_with_terminal_punctuation(l)).count();
        signals.set(MetricKey::LinePunctRatio, ratio(punct_lines as f64, n_text_lines));
        signals.set(
            MetricKey::ShortLineRatio,
            short_line_ratio(&text_lines, self.short_line_length),
        );
        signals.set(MetricKey::DuplicateLineRatio, char_duplicates_ratio(text, &text_lines));
        signals.set(MetricKey::NewLineRatio, ratio(text.matches('\n').count() as f64, n_tokens));

        // Gopher repetition
        let paras = paragraphs(text);
        let (para_dups, para_dup_chars) = find_duplicates(&paras);
        signals.set(MetricKey::DupParaFrac, ratio(para_dups as f64, paras.len() as f64));
        signals.set(MetricKey::DupParaCharFrac, ratio(para_dup_chars as f64, n_text));

        let line_runs = newline_runs(text);
        let (line_dups, line_dup_chars) = find_duplicates(&line_runs);
        signals.set(MetricKey::DupLineFrac, ratio(line_dups as f64, line_runs.len() as f64));
        signals.set(MetricKey::DupLineCharFrac, ratio(line_dup_chars as f64, n_text));

        for n in TOP_N_GRAMS {
            if let Some(key) = MetricKey::top_n_gram(n) {
                let n_grams = get_n_grams(&tokens, n);
                signals.set(key, ratio(find_top_duplicate(&n_grams) as f64, n_text));
            }
        }
        for n in DUPLICATED_N_GRAMS {
            if let Some(key) = MetricKey::duplicated_n_grams(n) {
                signals.set(key, ratio(find_all_duplicate(&tokens, n) as f64, n_text));
            }
        }

        let language_score = match &self.scorer {
            Some(scorer) => scorer.score(text, language)?,
            None => 0.0,
        };
        signals.set(MetricKey::LanguageScore, language_score.max(0.0));

        Ok(DocumentSignals { signals, tokens, words, n_bytes: text.len() })
    }
}


/// Share of non-blank lines at most `max_len` characters long
pub fn short_line_ratio(lines: &[&str], max_len: usize) -> f64 {
    let short = lines.iter().filter(|l| char_len(l) <= max_len).count();
    ratio(short as f64, lines.len() as f64)
}

/// Characters in duplicated non-blank lines over all non-newline characters
pub fn char_duplicates_ratio(text: &str, lines: &[&str]) -> f64 {
    let n_chars = text.chars().filter(|c| *c != '\n').count();
    ratio(find_duplicates(lines).1 as f64, n_chars as f64)
}
