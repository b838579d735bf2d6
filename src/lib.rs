pub mod doc_stats;
pub mod document;
pub mod duplicates;
pub mod filters;
pub mod lang_id;
pub mod pipeline;
pub mod signals;
pub mod stats;
pub mod text;
pub mod thresholds;
pub mod tokenizer;
pub mod utils;

pub use document::Document;
pub use filters::{Decision, FilterPipeline, QualityFilter};
pub use signals::{MetricKey, SignalCalculator, SignalVector};
pub use stats::{reduce, CorpusAggregate, LanguageStatsCollector, ShardAggregate};
pub use thresholds::{derive_thresholds, FilterThresholds, ThresholdPolicy};
