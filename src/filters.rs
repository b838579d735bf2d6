/*
Threshold filters over precomputed document signals.

Each filter answers Keep or Drop(reason) for one document. Within a filter the checks
run in a fixed order and the first failing one names the reason, since drop counts
are reported per first-failure reason. Thresholds are either one value for every
language or a per-language map; a language absent from a map skips that check.

Filters are built by name from a pipeline config, the same way processors are
registered for the map job:

    text_field: text
    language_field: metadata.language
    fasttext_model: lid.176.bin          # needed by language_score_filter
    pipeline:
      - name: gopher_repetition
      - name: gopher_quality
        kwargs: {min_doc_words: 50, thresholds_file: thresholds.yaml}
*/

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, ensure, Context, Error, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::document::{Document, DocumentFields};
use crate::lang_id::{FastTextScorer, LanguageScorer};
use crate::signals::{short_line_ratio, DocumentSignals, MetricKey, SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use crate::text::non_blank_lines;
use crate::thresholds::{read_thresholds, FilterThresholds};
use crate::tokenizer::TokenizerRegistry;
use crate::utils::{get_default, json_set};

/*================================================================================
=                            DECISIONS AND THRESHOLDS                            =
================================================================================*/

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Drop(String),
}

impl Decision {
    fn drop(reason: &str) -> Self {
        Decision::Drop(reason.to_string())
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Decision::Keep)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Keep => None,
            Decision::Drop(reason) => Some(reason),
        }
    }
}


/// One value for all languages, or one per language
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold<T> {
    Global(T),
    PerLanguage(HashMap<String, T>),
}

impl<T> Threshold<T> {
    pub fn get(&self, language: &str) -> Option<&T> {
        match self {
            Threshold::Global(value) => Some(value),
            Threshold::PerLanguage(map) => map.get(language),
        }
    }

    /// Every configured value, whichever language it belongs to
    pub fn values(&self) -> Vec<&T> {
        match self {
            Threshold::Global(value) => vec![value],
            Threshold::PerLanguage(map) => map.values().collect(),
        }
    }
}

fn lookup<'a, T>(threshold: &'a Option<Threshold<T>>, language: &str) -> Option<&'a T> {
    threshold.as_ref().and_then(|t| t.get(language))
}

fn english<T>(value: T) -> Option<Threshold<T>> {
    Some(Threshold::PerLanguage(HashMap::from([(String::from("en"), value)])))
}

/// Fills an unset threshold from a derived thresholds file
fn fill_from<T, F>(slot: &mut Option<Threshold<T>>, derived: &HashMap<String, FilterThresholds>, pick: F)
where
    F: Fn(&FilterThresholds) -> T,
{
    if slot.is_none() && !derived.is_empty() {
        *slot = Some(Threshold::PerLanguage(derived.iter().map(|(lang, t)| (lang.clone(), pick(t))).collect()));
    }
}

fn derived_thresholds(config: &Value) -> Result<HashMap<String, FilterThresholds>, Error> {
    match config.get("thresholds_file").and_then(|v| v.as_str()) {
        Some(path) => Ok(read_thresholds(&PathBuf::from(path))?.into_iter().collect()),
        None => Ok(HashMap::new()),
    }
}

fn from_config<T: DeserializeOwned>(config: &Value, name: &str) -> Result<T, Error> {
    serde_json::from_value(config.clone()).with_context(|| format!("Bad kwargs for {}: {}", name, config))
}


/*================================================================================
=                            FILTER TRAIT + REGISTRY                             =
================================================================================*/

pub trait QualityFilter: Send + Sync + Debug {
    fn new(config: &Value) -> Result<Self, Error>
    where
        Self: Sized;

    fn name(&self) -> &'static str;

    fn decide(&self, doc: &Document, signals: &DocumentSignals) -> Decision;
}

type FilterConstructor = fn(&Value) -> Result<Box<dyn QualityFilter>, Error>;

macro_rules! register_filter {
    ($map:expr, $name:expr, $filter_type:ty) => {
        $map.insert($name, |config| {
            let filter = <$filter_type>::new(config)?;
            Ok(Box::new(filter) as Box<dyn QualityFilter>)
        });
    };
}

static FILTER_CONSTRUCTORS: Lazy<HashMap<&'static str, FilterConstructor>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, FilterConstructor> = HashMap::new();
    register_filter!(m, "gopher_repetition", GopherRepetitionFilter);
    register_filter!(m, "gopher_quality", GopherQualityFilter);
    register_filter!(m, "fineweb_quality", FineWebQualityFilter);
    register_filter!(m, "list_filter", ListFilter);
    register_filter!(m, "language_score_filter", LanguageScoreFilter);
    m
});

pub fn build_filter(name: &str, config: &Value) -> Result<Box<dyn QualityFilter>, Error> {
    let constructor = FILTER_CONSTRUCTORS
        .get(name)
        .ok_or_else(|| anyhow!("Unknown filter {:?}", name))?;
    constructor(config)
}


/*================================================================================
=                            GOPHER REPETITION                                   =
================================================================================*/

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GopherRepetitionFilter {
    pub dup_line_frac: Option<Threshold<f64>>,
    pub dup_para_frac: Option<Threshold<f64>>,
    pub dup_line_char_frac: Option<Threshold<f64>>,
    pub dup_para_char_frac: Option<Threshold<f64>>,
    /// `[(n, max share)]`, for all languages or per language
    pub top_n_grams: Option<Threshold<Vec<(usize, f64)>>>,
    pub dup_n_grams: Option<Threshold<Vec<(usize, f64)>>>,
}

impl Default for GopherRepetitionFilter {
    fn default() -> Self {
        Self {
            dup_line_frac: Some(Threshold::Global(0.3)),
            dup_para_frac: Some(Threshold::Global(0.3)),
            dup_line_char_frac: Some(Threshold::Global(0.2)),
            dup_para_char_frac: Some(Threshold::Global(0.2)),
            top_n_grams: Some(Threshold::Global(vec![(2, 0.2), (3, 0.18), (4, 0.16)])),
            dup_n_grams: Some(Threshold::Global(vec![
                (5, 0.15),
                (6, 0.14),
                (7, 0.13),
                (8, 0.12),
                (9, 0.11),
                (10, 0.10),
            ])),
        }
    }
}

impl QualityFilter for GopherRepetitionFilter {
    fn new(config: &Value) -> Result<Self, Error> {
        let filter: Self = from_config(config, "gopher_repetition")?;
        for n_grams in filter.top_n_grams.iter().flat_map(|t| t.values()) {
            for (n, _) in n_grams {
                ensure!(MetricKey::top_n_gram(*n).is_some(), "top_n_grams supports n in 2..=4, got {}", n);
            }
        }
        for n_grams in filter.dup_n_grams.iter().flat_map(|t| t.values()) {
            for (n, _) in n_grams {
                ensure!(MetricKey::duplicated_n_grams(*n).is_some(), "dup_n_grams supports n in 5..=10, got {}", n);
            }
        }
        Ok(filter)
    }

    fn name(&self) -> &'static str {
        "gopher_repetition"
    }

    fn decide(&self, doc: &Document, signals: &DocumentSignals) -> Decision {
        let lang = doc.language.as_str();
        let checks = [
            (&self.dup_para_frac, MetricKey::DupParaFrac),
            (&self.dup_para_char_frac, MetricKey::DupParaCharFrac),
            (&self.dup_line_frac, MetricKey::DupLineFrac),
            (&self.dup_line_char_frac, MetricKey::DupLineCharFrac),
        ];
        for (threshold, key) in checks {
            if let Some(max) = lookup(threshold, lang) {
                if signals.get(key) > *max {
                    return Decision::drop(key.name());
                }
            }
        }

        if let Some(n_grams) = lookup(&self.top_n_grams, lang) {
            for (n, max) in n_grams {
                if let Some(key) = MetricKey::top_n_gram(*n) {
                    if signals.get(key) > *max {
                        return Decision::Drop(format!("top_{}_gram", n));
                    }
                }
            }
        }
        if let Some(n_grams) = lookup(&self.dup_n_grams, lang) {
            for (n, max) in n_grams {
                if let Some(key) = MetricKey::duplicated_n_grams(*n) {
                    if signals.get(key) > *max {
                        return Decision::Drop(format!("duplicated_{}_n_grams", n));
                    }
                }
            }
        }
        Decision::Keep
    }
}


/*================================================================================
=                            GOPHER QUALITY                                      =
================================================================================*/

const GOPHER_STOP_WORDS: [&str; 8] = ["the", "be", "to", "of", "and", "that", "have", "with"];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GopherQualityFilter {
    pub min_doc_words: Option<Threshold<usize>>,
    pub max_doc_words: Option<Threshold<usize>>,
    pub min_avg_word_length: Option<Threshold<f64>>,
    pub max_avg_word_length: Option<Threshold<f64>>,
    pub max_symbol_word_ratio: Option<Threshold<f64>>,
    pub max_bullet_lines_ratio: Option<Threshold<f64>>,
    pub max_ellipsis_lines_ratio: Option<Threshold<f64>>,
    pub max_non_alpha_words_ratio: Option<Threshold<f64>>,
    pub min_stop_words: Option<Threshold<usize>>,
    pub stop_words: Option<Threshold<HashSet<String>>>,
}

impl Default for GopherQualityFilter {
    fn default() -> Self {
        Self {
            min_doc_words: Some(Threshold::Global(50)),
            max_doc_words: Some(Threshold::Global(100_000)),
            min_avg_word_length: english(3.0),
            max_avg_word_length: english(10.0),
            max_symbol_word_ratio: Some(Threshold::Global(0.1)),
            max_bullet_lines_ratio: Some(Threshold::Global(0.9)),
            max_ellipsis_lines_ratio: Some(Threshold::Global(0.3)),
            max_non_alpha_words_ratio: english(0.8),
            min_stop_words: english(2),
            stop_words: english(GOPHER_STOP_WORDS.iter().map(|w| w.to_string()).collect()),
        }
    }
}

impl QualityFilter for GopherQualityFilter {
    fn new(config: &Value) -> Result<Self, Error> {
        let mut filter: Self = from_config(config, "gopher_quality")?;
        let derived = derived_thresholds(config)?;
        if !derived.is_empty() {
            // derived thresholds replace the English-only defaults unless given explicitly
            let explicit = |key: &str| config.get(key).is_some();
            for (key, slot) in [
                ("min_avg_word_length", &mut filter.min_avg_word_length),
                ("max_avg_word_length", &mut filter.max_avg_word_length),
                ("max_non_alpha_words_ratio", &mut filter.max_non_alpha_words_ratio),
            ] {
                if !explicit(key) {
                    *slot = None;
                }
            }
            if !explicit("stop_words") {
                filter.stop_words = None;
            }
            fill_from(&mut filter.min_avg_word_length, &derived, |t| t.min_avg_word_length);
            fill_from(&mut filter.max_avg_word_length, &derived, |t| t.max_avg_word_length);
            fill_from(&mut filter.max_non_alpha_words_ratio, &derived, |t| t.max_non_alpha_words_ratio);
            fill_from(&mut filter.stop_words, &derived, |t| t.stopwords.iter().cloned().collect());
            if !explicit("min_stop_words") {
                filter.min_stop_words = Some(Threshold::Global(2));
            }
        }
        Ok(filter)
    }

    fn name(&self) -> &'static str {
        "gopher_quality"
    }

    fn decide(&self, doc: &Document, signals: &DocumentSignals) -> Decision {
        let lang = doc.language.as_str();
        let n_words = signals.n_words();

        if let Some(min) = lookup(&self.min_doc_words, lang) {
            if n_words < *min {
                return Decision::drop("gopher_short_doc");
            }
        }
        if let Some(max) = lookup(&self.max_doc_words, lang) {
            if n_words > *max {
                return Decision::drop("gopher_long_doc");
            }
        }

        let avg_word_length = signals.get(MetricKey::AvgWordLength);
        if let Some(min) = lookup(&self.min_avg_word_length, lang) {
            if avg_word_length < *min {
                return Decision::drop("gopher_below_avg_threshold");
            }
        }
        if let Some(max) = lookup(&self.max_avg_word_length, lang) {
            if avg_word_length > *max {
                return Decision::drop("gopher_above_avg_threshold");
            }
        }

        if let Some(max) = lookup(&self.max_symbol_word_ratio, lang) {
            if signals.get(MetricKey::HashWordRatio) > *max {
                return Decision::drop("gopher_too_many_hashes");
            }
            if signals.get(MetricKey::EllipsisWordRatio) > *max {
                return Decision::drop("gopher_too_many_ellipsis");
            }
        }
        if let Some(max) = lookup(&self.max_bullet_lines_ratio, lang) {
            if signals.get(MetricKey::BulletStartRatio) > *max {
                return Decision::drop("gopher_too_many_bullets");
            }
        }
        if let Some(max) = lookup(&self.max_ellipsis_lines_ratio, lang) {
            if signals.get(MetricKey::EllipsisEndRatio) > *max {
                return Decision::drop("gopher_too_many_end_ellipsis");
            }
        }

        if let Some(min_alpha) = lookup(&self.max_non_alpha_words_ratio, lang) {
            if signals.get(MetricKey::AlphaRatio) < *min_alpha {
                return Decision::drop("gopher_below_alpha_threshold");
            }
        }

        if let (Some(min), Some(stop_words)) = (lookup(&self.min_stop_words, lang), lookup(&self.stop_words, lang)) {
            let found = signals.words.iter().filter(|w| stop_words.contains(w.as_str())).count();
            if found < *min {
                return Decision::drop("gopher_enough_stop_words");
            }
        }
        Decision::Keep
    }
}


/*================================================================================
=                            FINEWEB QUALITY                                     =
================================================================================*/

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FineWebQualityFilter {
    pub line_punct_thr: Option<Threshold<f64>>,
    pub line_punct_exclude_zero: Option<Threshold<bool>>,
    pub short_line_thr: Option<Threshold<f64>>,
    pub short_line_length: Option<Threshold<usize>>,
    pub char_duplicates_ratio: Option<Threshold<f64>>,
    pub new_line_ratio: Option<Threshold<f64>>,
}

impl QualityFilter for FineWebQualityFilter {
    fn new(config: &Value) -> Result<Self, Error> {
        let mut filter: Self = from_config(config, "fineweb_quality")?;
        let derived = derived_thresholds(config)?;
        fill_from(&mut filter.line_punct_thr, &derived, |t| t.line_punct_thr);
        fill_from(&mut filter.short_line_thr, &derived, |t| t.short_line_thr);
        fill_from(&mut filter.char_duplicates_ratio, &derived, |t| t.char_duplicates_ratio);
        fill_from(&mut filter.new_line_ratio, &derived, |t| t.new_line_ratio);
        Ok(filter)
    }

    fn name(&self) -> &'static str {
        "fineweb_quality"
    }

    fn decide(&self, doc: &Document, signals: &DocumentSignals) -> Decision {
        let lang = doc.language.as_str();

        if let Some(min) = lookup(&self.line_punct_thr, lang) {
            let ratio = signals.get(MetricKey::LinePunctRatio);
            let exclude_zero = lookup(&self.line_punct_exclude_zero, lang).copied().unwrap_or(false);
            if ratio <= *min && !(ratio == 0.0 && exclude_zero) {
                return Decision::drop("line_punct_ratio");
            }
        }

        if let Some(max) = lookup(&self.short_line_thr, lang) {
            let length = lookup(&self.short_line_length, lang).copied().unwrap_or(DEFAULT_SHORT_LINE_LENGTH);
            let ratio = short_line_ratio(&non_blank_lines(&doc.text), length);
            if ratio >= *max {
                return Decision::drop("short_line_ratio");
            }
        }

        if let Some(max) = lookup(&self.char_duplicates_ratio, lang) {
            if signals.get(MetricKey::DuplicateLineRatio) >= *max {
                return Decision::drop("char_dup_ratio");
            }
        }

        if let Some(max) = lookup(&self.new_line_ratio, lang) {
            if signals.get(MetricKey::NewLineRatio) > *max {
                return Decision::drop("list_ratio");
            }
        }
        Decision::Keep
    }
}


/*================================================================================
=                            LIST + LANGUAGE SCORE                               =
================================================================================*/

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    pub new_line_ratio: Option<Threshold<f64>>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self { new_line_ratio: Some(Threshold::Global(0.3)) }
    }
}

impl QualityFilter for ListFilter {
    fn new(config: &Value) -> Result<Self, Error> {
        from_config(config, "list_filter")
    }

    fn name(&self) -> &'static str {
        "list_filter"
    }

    fn decide(&self, doc: &Document, signals: &DocumentSignals) -> Decision {
        match lookup(&self.new_line_ratio, &doc.language) {
            Some(max) if signals.get(MetricKey::NewLineRatio) > *max => Decision::drop("suspected_list"),
            _ => Decision::Keep,
        }
    }
}


#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageScoreFilter {
    pub language_score_thr: Option<Threshold<f64>>,
}

impl QualityFilter for LanguageScoreFilter {
    fn new(config: &Value) -> Result<Self, Error> {
        let mut filter: Self = from_config(config, "language_score_filter")?;
        fill_from(&mut filter.language_score_thr, &derived_thresholds(config)?, |t| t.language_score_thr);
        Ok(filter)
    }

    fn name(&self) -> &'static str {
        "language_score_filter"
    }

    fn decide(&self, doc: &Document, signals: &DocumentSignals) -> Decision {
        match lookup(&self.language_score_thr, &doc.language) {
            Some(min) if signals.get(MetricKey::LanguageScore) < *min => Decision::drop("language_score"),
            _ => Decision::Keep,
        }
    }
}


/*================================================================================
=                            FILTER PIPELINE                                     =
================================================================================*/

pub type TimingInfo = HashMap<usize, u128>;
/// Documents dropped per step; `usize::MAX` counts the survivors
pub type FilterInfo = HashMap<usize, usize>;
pub type ReasonInfo = HashMap<String, usize>;

#[derive(Debug, Default)]
pub struct FilterOutput {
    pub kept: Vec<Value>,
    /// Dropped records, annotated with `metadata.filter_reason`
    pub dropped: Vec<Value>,
    pub timing_info: TimingInfo,
    pub filter_info: FilterInfo,
    pub reason_info: ReasonInfo,
}

pub struct FilterPipeline {
    pub steps: Vec<Box<dyn QualityFilter>>,
    fields: DocumentFields,
    calculator: SignalCalculator,
}

impl Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline").field("steps", &self.steps).field("fields", &self.fields).finish()
    }
}

impl FilterPipeline {
    pub fn new(config: &Value) -> Result<Self, Error> {
        let fields = DocumentFields {
            text_field: get_default(config, "text_field", String::from("text")),
            language_field: get_default(config, "language_field", String::from("metadata.language")),
            id_field: get_default(config, "id_field", String::from("id")),
            language: get_default(config, "language", None),
        };

        let pipeline_configs = config
            .get("pipeline")
            .and_then(|p| p.as_array())
            .ok_or_else(|| anyhow!("Filter config needs a `pipeline` list"))?;
        let mut steps: Vec<Box<dyn QualityFilter>> = Vec::new();
        for subconfig in pipeline_configs {
            let name = subconfig
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| anyhow!("Pipeline step without a name: {}", subconfig))?;
            let kwargs = subconfig.get("kwargs").cloned().unwrap_or_else(|| json!({}));
            steps.push(build_filter(name, &kwargs)?);
        }

        let tokenizers = Arc::new(TokenizerRegistry::new(config.get("tokenizers").unwrap_or(&Value::Null))?);
        let fasttext_model: Option<String> = get_default(config, "fasttext_model", None);
        let scorer: Option<Arc<dyn LanguageScorer>> = match fasttext_model {
            Some(path) => Some(Arc::new(FastTextScorer::new(&PathBuf::from(path))?)),
            None => None,
        };
        ensure!(
            scorer.is_some() || !steps.iter().any(|s| s.name() == "language_score_filter"),
            "language_score_filter needs `fasttext_model` in the filter config"
        );
        let short_line_length = get_default(config, "short_line_length", DEFAULT_SHORT_LINE_LENGTH);
        let calculator = SignalCalculator::new(tokenizers, scorer, short_line_length);

        Ok(Self { steps, fields, calculator })
    }

    pub fn from_parts(steps: Vec<Box<dyn QualityFilter>>, fields: DocumentFields, calculator: SignalCalculator) -> Self {
        Self { steps, fields, calculator }
    }

    pub fn calculator(&self) -> &SignalCalculator {
        &self.calculator
    }

    /// Runs the steps in order; the first drop wins. Returns the failing step and reason.
    pub fn decide(&self, doc: &Document, timing_info: &mut TimingInfo) -> Result<Option<(usize, String)>, Error> {
        let signals = self.calculator.compute_signals(doc)?;
        for (step, filter) in self.steps.iter().enumerate() {
            let start_step = Instant::now();
            let decision = filter.decide(doc, &signals);
            *timing_info.entry(step).or_insert(0) += start_step.elapsed().as_nanos();
            if let Decision::Drop(reason) = decision {
                return Ok(Some((step, reason)));
            }
        }
        Ok(None)
    }

    pub fn process_lines(&self, lines: Vec<String>) -> Result<FilterOutput, Error> {
        let mut output = FilterOutput::default();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let data: Value = serde_json::from_str(&line)?;
            let doc = Document::from_json(data, &self.fields)?;
            match self.decide(&doc, &mut output.timing_info)? {
                Some((step, reason)) => {
                    *output.filter_info.entry(step).or_insert(0) += 1;
                    *output.reason_info.entry(reason.clone()).or_insert(0) += 1;
                    let mut data = doc.data;
                    json_set(&mut data, "metadata.filter_reason", Value::String(reason))?;
                    output.dropped.push(data);
                }
                None => {
                    *output.filter_info.entry(usize::MAX).or_insert(0) += 1;
                    output.kept.push(doc.data);
                }
            }
        }
        Ok(output)
    }
}
