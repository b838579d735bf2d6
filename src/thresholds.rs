/*
Deriving per-language filter thresholds from a reduced corpus aggregate.

Two interchangeable policies: mean +/- k*std over the pooled moments, or quantiles
read from the merged per-metric histograms. Both are pure functions of the aggregate
and their constants. Stop words come from the word-frequency counter through a
cascade of looser frequency cuts for languages with sparse counters.
*/

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Error, Result};
use log::warn;
use mj_io::{read_pathbuf_to_mem, write_mem_to_pathbuf};
use serde::{Deserialize, Serialize};

use crate::signals::MetricKey;
use crate::stats::{length_mean_std, CorpusAggregate};
use crate::utils::round_to;


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterThresholds {
    pub min_avg_word_length: f64,
    pub max_avg_word_length: f64,
    pub max_non_alpha_words_ratio: f64,
    pub stopwords: Vec<String>,
    pub line_punct_thr: f64,
    pub short_line_thr: f64,
    pub new_line_ratio: f64,
    pub char_duplicates_ratio: f64,
    pub language_score_thr: f64,
}


/*================================================================================
=                            POLICIES                                            =
================================================================================*/

/// Multipliers of the standard deviation around each mean
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanStdPolicy {
    pub word_length_k: f64,
    pub alpha_ratio_k: f64,
    pub line_punct_k: f64,
    pub short_line_k: f64,
    pub new_line_k: f64,
    pub language_score_k: f64,
    pub char_duplicates_ratio: f64,
}

impl Default for MeanStdPolicy {
    fn default() -> Self {
        Self {
            word_length_k: 1.0,
            alpha_ratio_k: 0.5,
            line_punct_k: 1.0,
            short_line_k: 1.0,
            new_line_k: 2.0,
            language_score_k: 3.0,
            char_duplicates_ratio: 0.01,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantilePolicy {
    pub word_length_low: f64,
    pub word_length_high: f64,
    pub alpha_ratio: f64,
    pub line_punct: f64,
    pub short_line: f64,
    pub new_line: f64,
    pub language_score: f64,
    pub char_duplicates_ratio: f64,
}

impl Default for QuantilePolicy {
    fn default() -> Self {
        Self {
            word_length_low: 0.0001,
            word_length_high: 0.9999,
            alpha_ratio: 0.25,
            line_punct: 0.2,
            short_line: 0.8,
            new_line: 0.97,
            language_score: 0.02,
            char_duplicates_ratio: 0.01,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    MeanStd(MeanStdPolicy),
    Quantile(QuantilePolicy),
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::MeanStd(MeanStdPolicy::default())
    }
}


/// Stop-word cascade: try each frequency share in turn until at least `min_count`
/// words survive. Languages in `force_fallback_languages` skip the first cut.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopwordPolicy {
    pub thresholds: Vec<f64>,
    pub min_count: usize,
    pub force_fallback_languages: Vec<String>,
}

impl Default for StopwordPolicy {
    fn default() -> Self {
        Self {
            thresholds: vec![0.008, 0.003, 0.002],
            min_count: 8,
            force_fallback_languages: vec![String::from("sr")],
        }
    }
}


/*================================================================================
=                            STOP WORDS                                          =
================================================================================*/

const UNCLEAN_TOKENS: &[&str] = &[
    "\u{2013}", "\u{2014}", "\u{2019}", "\u{2019}\u{2019}", "||", "|", "\u{0964}", "''", "'",
    "``", "`", "\u{2018}", "\u{201E}", "\u{201C}", "\u{201D}", "\u{00AB}", "\u{00BB}", "|-",
    ":", "\u{FF1A}", "\u{300A}", "\u{300B}", "\u{FF0C}", "(", ")", "\u{FF08}", "\u{FF09}",
    "//", "/", "\\", "\\\\",
];

/// Rejects quote/dash/bracket tokens, wiki markup residue and numbers
pub fn is_clean(word: &str) -> bool {
    let word = word.trim();
    !UNCLEAN_TOKENS.contains(&word)
        && !word.contains('=')
        && !word.contains('\u{200D}')
        && word != "align"
        && !(!word.is_empty() && word.chars().all(char::is_numeric))
}

/// Words whose count exceeds `share` of the counter's total, most frequent first
pub fn p_thresh_words(counter: &BTreeMap<String, u64>, share: f64) -> Vec<String> {
    let total: u64 = counter.values().sum();
    let cut = share * total as f64;
    let mut entries: Vec<(&String, &u64)> =
        counter.iter().filter(|(_, c)| **c as f64 > cut).collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().map(|(w, _)| w.clone()).collect()
}

pub fn select_stopwords(language: &str, counter: &BTreeMap<String, u64>, policy: &StopwordPolicy) -> Vec<String> {
    let skip = if policy.force_fallback_languages.iter().any(|l| l == language) { 1 } else { 0 };
    let mut stopwords = Vec::new();
    for share in policy.thresholds.iter().skip(skip) {
        stopwords = p_thresh_words(counter, *share).into_iter().filter(|w| is_clean(w)).collect();
        if stopwords.len() >= policy.min_count {
            return stopwords;
        }
    }
    if stopwords.len() < policy.min_count {
        warn!(
            "Only {} stop words for {:?} after the loosest cut",
            stopwords.len(),
            language
        );
    }
    stopwords
}


/*================================================================================
=                            DERIVATION                                          =
================================================================================*/

pub fn derive_thresholds(
    aggregate: &CorpusAggregate,
    policy: &ThresholdPolicy,
    stopword_policy: &StopwordPolicy,
) -> FilterThresholds {
    let stopwords = select_stopwords(aggregate.language(), &aggregate.aggregate.word_counter, stopword_policy);
    match policy {
        ThresholdPolicy::MeanStd(p) => mean_std_thresholds(aggregate, p, stopwords),
        ThresholdPolicy::Quantile(p) => quantile_thresholds(aggregate, p, stopwords),
    }
}

fn mean_std_thresholds(aggregate: &CorpusAggregate, p: &MeanStdPolicy, stopwords: Vec<String>) -> FilterThresholds {
    let (wl_mean, wl_std) = length_mean_std(&aggregate.aggregate.length_counter);
    let alpha = aggregate.summary(MetricKey::AlphaRatio);
    let line_punct = aggregate.summary(MetricKey::LinePunctRatio);
    let short_line = aggregate.summary(MetricKey::ShortLineRatio);
    let new_line = aggregate.summary(MetricKey::NewLineRatio);
    let lang_score = aggregate.summary(MetricKey::LanguageScore);

    FilterThresholds {
        min_avg_word_length: round_to(wl_mean - p.word_length_k * wl_std, 0).max(0.0),
        max_avg_word_length: round_to(wl_mean + p.word_length_k * wl_std, 0),
        max_non_alpha_words_ratio: round_to(alpha.mean - p.alpha_ratio_k * alpha.std, 2),
        stopwords,
        line_punct_thr: round_to(line_punct.mean - p.line_punct_k * line_punct.std, 2).max(0.0),
        short_line_thr: round_to(short_line.mean + p.short_line_k * short_line.std, 2),
        new_line_ratio: round_to(new_line.mean + p.new_line_k * new_line.std, 2).min(1.0),
        char_duplicates_ratio: p.char_duplicates_ratio,
        language_score_thr: round_to(lang_score.mean - p.language_score_k * lang_score.std, 2).max(0.0),
    }
}

fn quantile_thresholds(aggregate: &CorpusAggregate, p: &QuantilePolicy, stopwords: Vec<String>) -> FilterThresholds {
    let q = |key: MetricKey, at: f64| {
        aggregate.aggregate.histogram(key).map_or(0.0, |h| h.quantile(at))
    };

    FilterThresholds {
        min_avg_word_length: round_to(q(MetricKey::AvgWordLength, p.word_length_low), 0),
        max_avg_word_length: round_to(q(MetricKey::AvgWordLength, p.word_length_high), 0),
        max_non_alpha_words_ratio: round_to(q(MetricKey::AlphaRatio, p.alpha_ratio), 2),
        stopwords,
        line_punct_thr: round_to(q(MetricKey::LinePunctRatio, p.line_punct), 2),
        short_line_thr: round_to(q(MetricKey::ShortLineRatio, p.short_line), 2),
        new_line_ratio: round_to(q(MetricKey::NewLineRatio, p.new_line), 2).min(1.0),
        char_duplicates_ratio: p.char_duplicates_ratio,
        language_score_thr: round_to(q(MetricKey::LanguageScore, p.language_score), 2),
    }
}


/*================================================================================
=                            THRESHOLD FILES                                     =
================================================================================*/

/// Threshold files are YAML mappings from language code to `FilterThresholds`
pub fn read_thresholds(path: &PathBuf) -> Result<BTreeMap<String, FilterThresholds>, Error> {
    let contents = read_pathbuf_to_mem(path)
        .with_context(|| format!("Unable to read thresholds {:?}", path))?
        .into_inner()
        .into_inner();
    serde_yaml::from_slice(&contents).with_context(|| format!("Malformed thresholds file {:?}", path))
}

pub fn write_thresholds(thresholds: &BTreeMap<String, FilterThresholds>, path: &PathBuf) -> Result<(), Error> {
    let yaml = serde_yaml::to_string(thresholds)?;
    write_mem_to_pathbuf(&yaml.into_bytes(), path)
}
