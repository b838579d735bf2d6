/*
Streaming statistics and the cross-shard reducer.

A worker folds every document's signals into a `LanguageStatsCollector` and writes one
`ShardAggregate` per input file. Nothing per-document is kept: each metric holds
(sum, sum of squares, count) plus a fixed-width histogram for quantiles. The reducer
merges shards by key-wise summation and document-count weighted means, so any
partition of the corpus into shards reduces to the same numbers.

Shard files are JSON. A shard is only written once it is finished and carries
`"complete": true`; the reducer refuses anything else.
*/

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, ensure, Context, Error, Result};
use glob::glob;
use log::info;
use mj_io::{read_pathbuf_to_mem, write_mem_to_pathbuf};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::signals::{DocumentSignals, MetricKey};
use crate::text::char_len;
use crate::utils::ratio;

pub const DEFAULT_TOP_K: usize = 10_000;
pub const DEFAULT_BIN_WIDTH: f64 = 0.001;
pub const INITIAL_MIN_LANGUAGE_SCORE: f64 = 100.0;


/*================================================================================
=                            RUNNING MEAN / VARIANCE                             =
================================================================================*/

/// Sum / sum-of-squares accumulator. Serialized as `(mean, sq_mean, weight)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MomentsRecord", into = "MomentsRecord")]
pub struct RunningMeanVariance {
    sum: f64,
    sum_sq: f64,
    weight: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct MomentsRecord {
    mean: f64,
    sq_mean: f64,
    weight: u64,
}

impl From<MomentsRecord> for RunningMeanVariance {
    fn from(r: MomentsRecord) -> Self {
        RunningMeanVariance::from_moments(r.mean, r.sq_mean, r.weight)
    }
}

impl From<RunningMeanVariance> for MomentsRecord {
    fn from(r: RunningMeanVariance) -> Self {
        MomentsRecord { mean: r.mean(), sq_mean: r.sq_mean(), weight: r.weight }
    }
}

impl RunningMeanVariance {
    pub fn from_moments(mean: f64, sq_mean: f64, weight: u64) -> Self {
        let w = weight as f64;
        Self { sum: mean * w, sum_sq: sq_mean * w, weight }
    }

    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.sum_sq += value * value;
        self.weight += 1;
    }

    /// Weighted merge: E[X] = sum(w_i * mean_i) / sum(w_i), and E[X^2] the same way
    pub fn merge(&mut self, other: &RunningMeanVariance) {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.weight += other.weight;
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn mean(&self) -> f64 {
        ratio(self.sum, self.weight as f64)
    }

    pub fn sq_mean(&self) -> f64 {
        ratio(self.sum_sq, self.weight as f64)
    }

    /// Population variance, clamped at 0 against cancellation
    pub fn variance(&self) -> f64 {
        let mean = self.mean();
        (self.sq_mean() - mean * mean).max(0.0)
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }
}


/*================================================================================
=                            QUANTILE HISTOGRAM                                  =
================================================================================*/

/// Sparse fixed-width histogram. Value `x` lands in bin `round(x / bin_width)`, and a
/// quantile is reported as its bin's centre, so quantile error is at most one bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantileHistogram {
    bin_width: f64,
    bins: BTreeMap<i64, u64>,
}

impl Default for QuantileHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_BIN_WIDTH)
    }
}

impl QuantileHistogram {
    pub fn new(bin_width: f64) -> Self {
        Self { bin_width, bins: BTreeMap::new() }
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn count(&self) -> u64 {
        self.bins.values().sum()
    }

    pub fn insert(&mut self, value: f64) {
        let bin = (value / self.bin_width).round() as i64;
        *self.bins.entry(bin).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &QuantileHistogram) -> Result<(), Error> {
        ensure!(
            self.bin_width == other.bin_width,
            "Cannot merge histograms with bin widths {} and {}",
            self.bin_width,
            other.bin_width
        );
        for (bin, count) in &other.bins {
            *self.bins.entry(*bin).or_insert(0) += count;
        }
        Ok(())
    }

    /// Nearest-rank quantile, `q` in [0, 1]. Empty histograms report 0.
    pub fn quantile(&self, q: f64) -> f64 {
        let total = self.count();
        if total == 0 {
            return 0.0;
        }
        let rank = ((q.clamp(0.0, 1.0) * total as f64).ceil() as u64).max(1);
        let mut seen = 0;
        for (bin, count) in &self.bins {
            seen += count;
            if seen >= rank {
                return *bin as f64 * self.bin_width;
            }
        }
        self.bins.keys().next_back().map_or(0.0, |b| *b as f64 * self.bin_width)
    }
}


/*================================================================================
=                            WORD COUNTERS                                       =
================================================================================*/

/// How the word-frequency counter is kept small.
///
/// `min_count` drops rare words when a shard is finished (and, if `live_prune_above`
/// is set, whenever the counter grows past that many entries). A `min_count` of 0 or 1
/// keeps everything.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordCountPruning {
    pub min_count: u64,
    pub live_prune_above: Option<usize>,
}

impl Default for WordCountPruning {
    fn default() -> Self {
        Self { min_count: 2, live_prune_above: None }
    }
}

impl WordCountPruning {
    pub fn none() -> Self {
        Self { min_count: 0, live_prune_above: None }
    }

    pub fn prune(&self, counter: &mut BTreeMap<String, u64>) {
        if self.min_count > 1 {
            counter.retain(|_, count| *count >= self.min_count);
        }
    }
}

/// Most frequent `k` words; ties broken alphabetically so the output is stable
pub fn top_k_words(counter: &BTreeMap<String, u64>, k: usize) -> BTreeMap<String, u64> {
    let mut entries: Vec<(&String, &u64)> = counter.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().take(k).map(|(w, c)| (w.clone(), *c)).collect()
}

/// Frequency-weighted mean and unbiased (N - 1) std of word lengths
pub fn length_mean_std(length_counter: &BTreeMap<usize, u64>) -> (f64, f64) {
    let n: u64 = length_counter.values().sum();
    if n == 0 {
        return (0.0, 0.0);
    }
    let total: f64 = length_counter.iter().map(|(len, c)| *len as f64 * *c as f64).sum();
    let mean = total / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let sq_dev: f64 = length_counter
        .iter()
        .map(|(len, c)| *c as f64 * (*len as f64 - mean).powi(2))
        .sum();
    (mean, (sq_dev / (n - 1) as f64).sqrt())
}


/*================================================================================
=                            SHARD AGGREGATE                                     =
================================================================================*/

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardAggregate {
    pub language: String,
    pub total_docs: u64,
    pub total_words: u64,
    pub total_bytes: u64,
    pub min_language_score: f64,
    pub length_counter: BTreeMap<usize, u64>,
    pub word_counter: BTreeMap<String, u64>,
    pub metrics: BTreeMap<MetricKey, RunningMeanVariance>,
    pub histograms: BTreeMap<MetricKey, QuantileHistogram>,
    #[serde(default)]
    pub complete: bool,
}

impl ShardAggregate {
    pub fn empty(language: &str, bin_width: f64) -> Self {
        Self {
            language: language.to_string(),
            total_docs: 0,
            total_words: 0,
            total_bytes: 0,
            min_language_score: INITIAL_MIN_LANGUAGE_SCORE,
            length_counter: BTreeMap::new(),
            word_counter: BTreeMap::new(),
            metrics: MetricKey::ALL.iter().map(|k| (*k, RunningMeanVariance::default())).collect(),
            histograms: MetricKey::ALL.iter().map(|k| (*k, QuantileHistogram::new(bin_width))).collect(),
            complete: false,
        }
    }

    pub fn metric(&self, key: MetricKey) -> RunningMeanVariance {
        self.metrics.get(&key).copied().unwrap_or_default()
    }

    pub fn histogram(&self, key: MetricKey) -> Option<&QuantileHistogram> {
        self.histograms.get(&key)
    }

    /// Key-wise sums, weighted moments and the minimum language score
    pub fn merge(&mut self, other: &ShardAggregate) -> Result<(), Error> {
        self.total_docs += other.total_docs;
        self.total_words += other.total_words;
        self.total_bytes += other.total_bytes;
        self.min_language_score = self.min_language_score.min(other.min_language_score);
        for (len, count) in &other.length_counter {
            *self.length_counter.entry(*len).or_insert(0) += count;
        }
        for (word, count) in &other.word_counter {
            *self.word_counter.entry(word.clone()).or_insert(0) += count;
        }
        for (key, moments) in &other.metrics {
            self.metrics.entry(*key).or_default().merge(moments);
        }
        for (key, hist) in &other.histograms {
            match self.histograms.get_mut(key) {
                Some(existing) => existing.merge(hist)?,
                None => {
                    self.histograms.insert(*key, hist.clone());
                }
            }
        }
        Ok(())
    }

    /// Every metric must have seen every document, otherwise the pooled
    /// moments would mix different populations
    pub fn check_consistent(&self) -> Result<(), Error> {
        for key in MetricKey::ALL {
            let weight = self.metric(key).weight();
            ensure!(
                weight == self.total_docs,
                "Metric {} has weight {} but the aggregate holds {} documents",
                key,
                weight,
                self.total_docs
            );
        }
        Ok(())
    }
}


/*================================================================================
=                            COLLECTOR                                           =
================================================================================*/

/// Per-shard accumulator: fed one document's signals at a time
#[derive(Debug)]
pub struct LanguageStatsCollector {
    aggregate: ShardAggregate,
    pruning: WordCountPruning,
    // vocabulary size that triggers the next live prune
    next_live_prune: usize,
}

impl LanguageStatsCollector {
    pub fn new(language: &str, bin_width: f64, pruning: WordCountPruning) -> Self {
        let next_live_prune = pruning.live_prune_above.unwrap_or(usize::MAX);
        Self { aggregate: ShardAggregate::empty(language, bin_width), pruning, next_live_prune }
    }

    pub fn update(&mut self, doc: &DocumentSignals) {
        let agg = &mut self.aggregate;
        agg.total_docs += 1;
        agg.total_words += doc.n_words() as u64;
        agg.total_bytes += doc.n_bytes as u64;

        for word in &doc.words {
            *agg.length_counter.entry(char_len(word)).or_insert(0) += 1;
            *agg.word_counter.entry(word.to_lowercase()).or_insert(0) += 1;
        }

        for (key, value) in doc.signals.iter() {
            agg.metrics.entry(key).or_default().update(value);
            if let Some(hist) = agg.histograms.get_mut(&key) {
                hist.insert(value);
            }
        }
        let score = doc.get(MetricKey::LanguageScore);
        agg.min_language_score = agg.min_language_score.min(score);

        if let Some(limit) = self.pruning.live_prune_above {
            if agg.word_counter.len() > self.next_live_prune {
                self.pruning.prune(&mut agg.word_counter);
                // survivors already meet min_count, wait for the vocabulary to double
                self.next_live_prune = limit.max(2 * agg.word_counter.len());
            }
        }
    }

    pub fn total_docs(&self) -> u64 {
        self.aggregate.total_docs
    }

    /// Applies the end-of-shard pruning and seals the aggregate
    pub fn finish(self) -> ShardAggregate {
        let mut aggregate = self.aggregate;
        self.pruning.prune(&mut aggregate.word_counter);
        aggregate.complete = true;
        aggregate
    }
}


/*================================================================================
=                            REDUCER                                             =
================================================================================*/

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorpusAggregate {
    pub n_shards: usize,
    pub aggregate: ShardAggregate,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

/// The `statistics` view of a corpus: moments per metric instead of raw accumulators
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorpusStatistics {
    pub total_docs: u64,
    pub total_words: u64,
    pub total_bytes: u64,
    pub min_language_score: f64,
    pub word_length: MetricSummary,
    pub metrics: BTreeMap<MetricKey, MetricSummary>,
    pub length_counter: BTreeMap<usize, u64>,
    pub word_counter: BTreeMap<String, u64>,
}

impl CorpusAggregate {
    pub fn language(&self) -> &str {
        &self.aggregate.language
    }

    pub fn metric(&self, key: MetricKey) -> RunningMeanVariance {
        self.aggregate.metric(key)
    }

    pub fn summary(&self, key: MetricKey) -> MetricSummary {
        let m = self.metric(key);
        MetricSummary { mean: m.mean(), std: m.std() }
    }

    /// Optional re-prune, then the lossy top-k cut. Only called once everything is merged.
    pub fn finish(mut self, top_k: usize, min_count: Option<u64>) -> Self {
        if let Some(min_count) = min_count {
            WordCountPruning { min_count, live_prune_above: None }.prune(&mut self.aggregate.word_counter);
        }
        self.aggregate.word_counter = top_k_words(&self.aggregate.word_counter, top_k);
        self
    }

    pub fn statistics(&self) -> CorpusStatistics {
        let agg = &self.aggregate;
        let (wl_mean, wl_std) = length_mean_std(&agg.length_counter);
        CorpusStatistics {
            total_docs: agg.total_docs,
            total_words: agg.total_words,
            total_bytes: agg.total_bytes,
            min_language_score: agg.min_language_score,
            word_length: MetricSummary { mean: wl_mean, std: wl_std },
            metrics: MetricKey::ALL.iter().map(|k| (*k, self.summary(*k))).collect(),
            length_counter: agg.length_counter.clone(),
            word_counter: agg.word_counter.clone(),
        }
    }
}


/// Merges shard aggregates into one corpus aggregate. Order of `shards` does not matter
/// beyond floating-point rounding. The word counter is left untruncated.
pub fn reduce(shards: &[ShardAggregate]) -> Result<CorpusAggregate, Error> {
    let first = shards.first().ok_or_else(|| anyhow!("No shard aggregates to reduce"))?;
    let bin_width = first.histograms.values().next().map_or(DEFAULT_BIN_WIDTH, |h| h.bin_width());

    let mut aggregate = ShardAggregate::empty(&first.language, bin_width);
    for shard in shards {
        ensure!(shard.complete, "Shard aggregate for {:?} is not complete", shard.language);
        ensure!(
            shard.language == first.language,
            "Cannot reduce shards of different languages: {:?} and {:?}",
            first.language,
            shard.language
        );
        aggregate.merge(shard)?;
    }
    aggregate.check_consistent()?;
    aggregate.complete = true;
    Ok(CorpusAggregate { n_shards: shards.len(), aggregate })
}


/*================================================================================
=                            SHARD FILES                                         =
================================================================================*/

/// Output directory for one language's shards; the language must be a single path component
pub fn language_dir(output_dir: &Path, language: &str) -> Result<PathBuf, Error> {
    ensure!(
        !language.is_empty() && language != "." && language != ".." && !language.contains(['/', '\\']),
        "Language {:?} cannot be used as a directory name",
        language
    );
    Ok(output_dir.join(language))
}

pub fn shard_filename(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("{:05}.json", index))
}

pub fn write_shard(aggregate: &ShardAggregate, path: &PathBuf) -> Result<(), Error> {
    ensure!(aggregate.complete, "Refusing to write an unfinished shard to {:?}", path);
    let bytes = serde_json::to_vec(aggregate)?;
    write_mem_to_pathbuf(&bytes, path)
}

/// Reads one shard, failing with the path in the message if it is unreadable,
/// malformed or was never finished
pub fn read_shard(path: &PathBuf) -> Result<ShardAggregate, Error> {
    let contents = read_pathbuf_to_mem(path)
        .with_context(|| format!("Unable to read shard {:?}", path))?
        .into_inner()
        .into_inner();
    let aggregate: ShardAggregate = serde_json::from_slice(&contents)
        .with_context(|| format!("Corrupt shard aggregate {:?}", path))?;
    ensure!(aggregate.complete, "Incomplete shard aggregate {:?}", path);
    aggregate
        .check_consistent()
        .with_context(|| format!("Inconsistent shard aggregate {:?}", path))?;
    Ok(aggregate)
}

/// All `*.json` files under `input_dir`, recursively, in sorted order
pub fn find_shards(input_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let pattern = input_dir.join("**").join("*.json");
    let pattern = pattern.to_str().ok_or_else(|| anyhow!("Non-utf8 path {:?}", input_dir))?;
    let mut paths = glob(pattern)?
        .collect::<Result<Vec<PathBuf>, _>>()
        .with_context(|| format!("Unable to list shards under {:?}", input_dir))?;
    paths.sort();
    Ok(paths)
}

pub fn load_shards(input_dir: &Path) -> Result<Vec<ShardAggregate>, Error> {
    let paths = find_shards(input_dir)?;
    ensure!(!paths.is_empty(), "No shard aggregates found under {:?}", input_dir);
    info!("Loading {} shard aggregates from {:?}", paths.len(), input_dir);
    paths.par_iter().map(read_shard).collect()
}

/// Groups loaded shards by their language
pub fn group_by_language(shards: Vec<ShardAggregate>) -> HashMap<String, Vec<ShardAggregate>> {
    let mut groups: HashMap<String, Vec<ShardAggregate>> = HashMap::new();
    for shard in shards {
        groups.entry(shard.language.clone()).or_default().push(shard);
    }
    groups
}
