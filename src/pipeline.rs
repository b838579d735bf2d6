/*
File-level jobs: collect (map), reduce and filter.

Collect config layout (json or yaml, every key optional):

    text_field: text
    language_field: metadata.language
    language: null               # force one language for every document
    short_line_length: 30
    word_count_pruning: {min_count: 2, live_prune_above: null}
    histogram_bin_width: 0.001
    fasttext_model: null         # path to a fastText LID model for language_score
    tokenizers: {th: graphemes}  # per-language tokenizer overrides

Reduce config layout:

    top_k: 10000
    min_count: null
    mean_std: {word_length_k: 1.0, alpha_ratio_k: 0.5, ...}
    quantile: {alpha_ratio: 0.25, ...}
    stopwords: {thresholds: [0.008, 0.003, 0.002], min_count: 8, force_fallback_languages: [sr]}
*/

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, ensure, Context, Error, Result};
use clap::ValueEnum;
use dashmap::DashMap;
use log::{error, info};
use mj_io::{build_pbar, expand_dirs, get_output_filename, read_pathbuf_to_mem, write_mem_to_pathbuf};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, DocumentFields};
use crate::filters::FilterPipeline;
use crate::lang_id::{FastTextScorer, LanguageScorer};
use crate::signals::{SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use crate::stats::{
    group_by_language, language_dir, load_shards, reduce as reduce_shards, shard_filename, write_shard, CorpusAggregate,
    LanguageStatsCollector, ShardAggregate, WordCountPruning, DEFAULT_BIN_WIDTH, DEFAULT_TOP_K,
};
use crate::thresholds::{derive_thresholds, MeanStdPolicy, QuantilePolicy, StopwordPolicy, ThresholdPolicy};
use crate::tokenizer::TokenizerRegistry;
use crate::utils::parse_config;


/*================================================================================
=                            CONFIGS                                             =
================================================================================*/

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub text_field: String,
    pub language_field: String,
    pub id_field: String,
    pub language: Option<String>,
    pub short_line_length: usize,
    pub word_count_pruning: WordCountPruning,
    pub histogram_bin_width: f64,
    pub fasttext_model: Option<PathBuf>,
    pub tokenizers: Value,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            text_field: String::from("text"),
            language_field: String::from("metadata.language"),
            id_field: String::from("id"),
            language: None,
            short_line_length: DEFAULT_SHORT_LINE_LENGTH,
            word_count_pruning: WordCountPruning::default(),
            histogram_bin_width: DEFAULT_BIN_WIDTH,
            fasttext_model: None,
            tokenizers: Value::Null,
        }
    }
}

impl CollectorConfig {
    pub fn fields(&self) -> DocumentFields {
        DocumentFields {
            text_field: self.text_field.clone(),
            language_field: self.language_field.clone(),
            id_field: self.id_field.clone(),
            language: self.language.clone(),
        }
    }

    /// Tokenizers and the (optional) fastText model are built once and shared by all workers
    pub fn build_calculator(&self) -> Result<SignalCalculator, Error> {
        ensure!(self.histogram_bin_width > 0.0, "histogram_bin_width must be positive");
        let tokenizers = Arc::new(TokenizerRegistry::new(&self.tokenizers)?);
        let scorer: Option<Arc<dyn LanguageScorer>> = match &self.fasttext_model {
            Some(path) => Some(Arc::new(FastTextScorer::new(path)?)),
            None => None,
        };
        Ok(SignalCalculator::new(tokenizers, scorer, self.short_line_length))
    }
}


#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    pub top_k: usize,
    pub min_count: Option<u64>,
    pub mean_std: MeanStdPolicy,
    pub quantile: QuantilePolicy,
    pub stopwords: StopwordPolicy,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_count: None,
            mean_std: MeanStdPolicy::default(),
            quantile: QuantilePolicy::default(),
            stopwords: StopwordPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ReduceMode {
    /// Full merged aggregate, histograms included
    Raw,
    /// Mean/std per metric plus counters and totals
    Statistics,
    FiltersMeanstd,
    FiltersQ,
}

fn load_typed_config<T: Default + for<'de> Deserialize<'de>>(config: Option<&PathBuf>) -> Result<T, Error> {
    match config {
        Some(path) => {
            let value = parse_config(path)?;
            serde_json::from_value(value).with_context(|| format!("Bad config {:?}", path))
        }
        None => Ok(T::default()),
    }
}


/*================================================================================
=                            COLLECT                                             =
================================================================================*/

/// Folds JSONL lines into one finished aggregate per language
pub fn collect_lines<I>(
    lines: I,
    calculator: &SignalCalculator,
    config: &CollectorConfig,
) -> Result<BTreeMap<String, ShardAggregate>, Error>
where
    I: IntoIterator<Item = String>,
{
    let fields = config.fields();
    let mut collectors: BTreeMap<String, LanguageStatsCollector> = BTreeMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let data: Value = serde_json::from_str(&line)?;
        let doc = Document::from_json(data, &fields)?;
        let signals = calculator.compute_signals(&doc)?;
        collectors
            .entry(doc.language.clone())
            .or_insert_with(|| {
                LanguageStatsCollector::new(
                    &doc.language,
                    config.histogram_bin_width,
                    config.word_count_pruning.clone(),
                )
            })
            .update(&signals);
    }
    Ok(collectors.into_iter().map(|(lang, c)| (lang, c.finish())).collect())
}

pub fn collect(
    input_dir: &PathBuf,
    output_dir: &PathBuf,
    config: Option<&PathBuf>,
    language: Option<String>,
) -> Result<(), Error> {
    /* Map step: one shard aggregate per (input file, language), written to
    output_dir/<language>/<file index>.json once the file is fully processed */
    let start_main = Instant::now();
    let mut config: CollectorConfig = load_typed_config(config)?;
    if language.is_some() {
        config.language = language;
    }
    let calculator = calculator_or_log(&config)?;
    let all_files = expand_dirs(vec![input_dir.clone()], None)?;
    info!("Collecting statistics over {} files", all_files.len());

    let total_docs = AtomicUsize::new(0);
    let languages: DashMap<String, usize> = DashMap::new();
    let pbar = build_pbar(all_files.len(), "Files");
    all_files.par_iter().enumerate().try_for_each(|(idx, p)| -> Result<(), Error> {
        let data = read_pathbuf_to_mem(p)?;
        let lines = data.lines().collect::<Result<Vec<String>, _>>()?;
        let aggregates = collect_lines(lines, &calculator, &config).map_err(|e| {
            error!("Failed to collect {:?}: {}", p, e);
            e.context(format!("Collecting {:?}", p))
        })?;
        for (lang, aggregate) in aggregates {
            total_docs.fetch_add(aggregate.total_docs as usize, Ordering::SeqCst);
            *languages.entry(lang.clone()).or_insert(0) += aggregate.total_docs as usize;
            write_shard(&aggregate, &shard_filename(&language_dir(output_dir, &lang)?, idx))?;
        }
        pbar.inc(1);
        Ok(())
    })?;

    println!("Finishing collect in {:?} seconds", start_main.elapsed().as_secs());
    println!("Processed {:?} total documents", total_docs.into_inner());
    let mut languages: Vec<(String, usize)> = languages.into_iter().collect();
    languages.sort();
    for (lang, docs) in languages {
        println!("\t {} | {:?} docs", lang, docs);
    }
    print_fallbacks(calculator.tokenizers().fallback_counts());
    Ok(())
}

fn calculator_or_log(config: &CollectorConfig) -> Result<SignalCalculator, Error> {
    config.build_calculator().map_err(|e| {
        error!("Unable to set up the signal calculator: {}", e);
        e
    })
}

fn print_fallbacks(fallbacks: HashMap<String, usize>) {
    if fallbacks.is_empty() {
        return;
    }
    let mut fallbacks: Vec<(String, usize)> = fallbacks.into_iter().collect();
    fallbacks.sort();
    println!("Tokenizer fallbacks to the default language:");
    for (lang, count) in fallbacks {
        println!("\t {} | {:?} docs", lang, count);
    }
}


/*================================================================================
=                            REDUCE                                              =
================================================================================*/

/// Renders one reduced language in the requested mode
pub fn render_corpus(corpus: &CorpusAggregate, mode: ReduceMode, config: &ReducerConfig) -> Result<Value, Error> {
    let value = match mode {
        ReduceMode::Raw => serde_json::to_value(corpus)?,
        ReduceMode::Statistics => serde_json::to_value(corpus.statistics())?,
        ReduceMode::FiltersMeanstd => serde_json::to_value(derive_thresholds(
            corpus,
            &ThresholdPolicy::MeanStd(config.mean_std.clone()),
            &config.stopwords,
        ))?,
        ReduceMode::FiltersQ => serde_json::to_value(derive_thresholds(
            corpus,
            &ThresholdPolicy::Quantile(config.quantile.clone()),
            &config.stopwords,
        ))?,
    };
    Ok(value)
}

pub fn reduce_dir(
    input_dir: &PathBuf,
    language: Option<&str>,
    config: &ReducerConfig,
) -> Result<BTreeMap<String, CorpusAggregate>, Error> {
    let mut groups = group_by_language(load_shards(input_dir)?);
    if let Some(lang) = language {
        let shards = groups
            .remove(lang)
            .ok_or_else(|| anyhow!("No shards for language {:?} under {:?}", lang, input_dir))?;
        groups = HashMap::from([(lang.to_string(), shards)]);
    }

    let mut reduced = BTreeMap::new();
    for (lang, shards) in groups {
        let corpus = reduce_shards(&shards)
            .with_context(|| format!("Reducing {} shards for {:?}", shards.len(), lang))?
            .finish(config.top_k, config.min_count);
        reduced.insert(lang, corpus);
    }
    Ok(reduced)
}

pub fn reduce(
    input_dir: &PathBuf,
    output_file: &PathBuf,
    config: Option<&PathBuf>,
    language: Option<&str>,
    mode: ReduceMode,
) -> Result<(), Error> {
    let start_main = Instant::now();
    let config: ReducerConfig = load_typed_config(config)?;
    let reduced = reduce_dir(input_dir, language, &config)?;

    let mut output: BTreeMap<String, Value> = BTreeMap::new();
    for (lang, corpus) in &reduced {
        output.insert(lang.clone(), render_corpus(corpus, mode, &config)?);
    }
    let bytes = match output_file.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::to_vec_pretty(&output)?,
        _ => serde_yaml::to_string(&output)?.into_bytes(),
    };
    write_mem_to_pathbuf(&bytes, output_file)?;

    println!("Finishing reduce in {:?} seconds", start_main.elapsed().as_secs());
    for (lang, corpus) in &reduced {
        println!(
            "\t {} | {:?} shards | {:?} docs | {:?} words | {:?} bytes",
            lang, corpus.n_shards, corpus.aggregate.total_docs, corpus.aggregate.total_words, corpus.aggregate.total_bytes
        );
    }
    Ok(())
}


/*================================================================================
=                            FILTER                                              =
================================================================================*/

fn write_output_lines(output_values: Vec<Value>, output_file: &PathBuf) -> Result<(), Error> {
    if output_values.is_empty() {
        return Ok(());
    }
    let mut output_bytes: Vec<u8> = Vec::new();
    for v in output_values {
        output_bytes.extend(serde_json::to_vec(&v)?);
        output_bytes.push(b'\n');
    }
    write_mem_to_pathbuf(&output_bytes, output_file)
}

pub fn filter(
    input_dir: &PathBuf,
    output_dir: &PathBuf,
    config: &PathBuf,
    err_dir: Option<PathBuf>,
) -> Result<(), Error> {
    /* Processes each jsonl file in input_dir into an identically named file in output_dir,
    keeping the documents every filter step accepts. Dropped documents go to err_dir
    (if given) with metadata.filter_reason set */
    let start_main = Instant::now();
    let all_files = expand_dirs(vec![input_dir.clone()], None)?;
    let json_config = parse_config(config)?;
    let pipeline = FilterPipeline::new(&json_config)?;

    let global_timer: DashMap<usize, AtomicUsize> = DashMap::new();
    let global_filter: DashMap<usize, usize> = DashMap::new();
    let global_reasons: DashMap<String, usize> = DashMap::new();
    for i in 0..pipeline.steps.len() {
        global_timer.insert(i, AtomicUsize::new(0));
        global_filter.insert(i, 0);
    }
    global_filter.insert(usize::MAX, 0);

    let pbar = build_pbar(all_files.len(), "Files");
    all_files.par_iter().try_for_each(|p| -> Result<(), Error> {
        let data = read_pathbuf_to_mem(p)?;
        let lines = data.lines().collect::<Result<Vec<String>, _>>()?;
        let output = pipeline.process_lines(lines).map_err(|e| {
            error!("Failed to filter {:?}: {}", p, e);
            e.context(format!("Filtering {:?}", p))
        })?;

        write_output_lines(output.kept, &get_output_filename(p, input_dir, output_dir)?)?;
        if let Some(err_dir) = &err_dir {
            write_output_lines(output.dropped, &get_output_filename(p, input_dir, err_dir)?)?;
        }

        for (k, v) in output.timing_info {
            if let Some(t) = global_timer.get(&k) {
                t.fetch_add(v as usize, Ordering::SeqCst);
            }
        }
        for (k, v) in output.filter_info {
            *global_filter.entry(k).or_insert(0) += v;
        }
        for (k, v) in output.reason_info {
            *global_reasons.entry(k).or_insert(0) += v;
        }
        pbar.inc(1);
        Ok(())
    })?;

    print_filter_summary(start_main, global_timer, global_filter, global_reasons, &pipeline);
    Ok(())
}

fn print_filter_summary(
    start_time: Instant,
    global_timer: DashMap<usize, AtomicUsize>,
    global_filter: DashMap<usize, usize>,
    global_reasons: DashMap<String, usize>,
    pipeline: &FilterPipeline,
) {
    let step_times: HashMap<usize, usize> = global_timer.into_iter().map(|(k, v)| (k, v.into_inner())).collect();
    let total_step_time = step_times.values().sum::<usize>().max(1);
    let total_docs: usize = global_filter.iter().map(|e| *e.value()).sum();
    let mut remaining_docs = total_docs;

    println!("Finishing filter in {:?} seconds", start_time.elapsed().as_secs());
    println!("Processed {:?} total documents", total_docs);
    println!("-------------------------------------------");
    for (i, step) in pipeline.steps.iter().enumerate() {
        println!("Step {:?} | {}", i, step.name());
        let step_time = step_times.get(&i).copied().unwrap_or(0);
        println!("\t Spent {:.2}% of filter time in this step", step_time as f64 / total_step_time as f64 * 100.0);

        let removed = global_filter.get(&i).map_or(0, |e| *e.value());
        let remaining_pct = removed as f32 / f32::max(1.0, remaining_docs as f32) * 100.0;
        let total_pct = removed as f32 / f32::max(1.0, total_docs as f32) * 100.0;
        remaining_docs -= removed;
        println!("\t Removed {:?} docs | {:.2}% of remaining | {:.2}% of pool", removed, remaining_pct, total_pct);
    }

    let mut reasons: Vec<(String, usize)> = global_reasons.into_iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    println!("DROP REASONS:");
    for (reason, count) in reasons {
        println!("\t {} | {:?} docs", reason, count);
    }

    println!("FINAL:");
    println!(
        "\t {:?} docs survived | {:.2}% of pool",
        remaining_docs,
        remaining_docs as f32 / f32::max(1.0, total_docs as f32) * 100.0
    );
    print_fallbacks(pipeline.calculator().tokenizers().fallback_counts());
}
