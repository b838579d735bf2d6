extern crate langstats_rs;
use langstats_rs::lang_id::LanguageScorer;
use langstats_rs::pipeline::{collect_lines, reduce_dir, render_corpus, CollectorConfig, ReduceMode, ReducerConfig};
use langstats_rs::signals::{DocumentSignals, SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use langstats_rs::stats::{language_dir, shard_filename, write_shard, LanguageStatsCollector, WordCountPruning};
use langstats_rs::thresholds::FilterThresholds;
use langstats_rs::tokenizer::TokenizerRegistry;
use langstats_rs::SignalVector;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Error;
    use serde_json::json;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    /// Scores "en" at 0.25 for texts mentioning "unsure", 0.5 otherwise
    struct FixedScorer;

    impl LanguageScorer for FixedScorer {
        fn predict(&self, text: &str) -> Result<HashMap<String, f32>, Error> {
            let score = if text.contains("unsure") { 0.25 } else { 0.5 };
            Ok(HashMap::from([(String::from("en"), score)]))
        }
    }

    fn calculator() -> SignalCalculator {
        SignalCalculator::new(Arc::new(TokenizerRegistry::default()), None, DEFAULT_SHORT_LINE_LENGTH)
    }

    fn config() -> CollectorConfig {
        CollectorConfig { word_count_pruning: WordCountPruning::none(), ..CollectorConfig::default() }
    }

    fn line(text: &str, language: Option<&str>) -> String {
        match language {
            Some(lang) => json!({"text": text, "metadata": {"language": lang}}).to_string(),
            None => json!({"text": text}).to_string(),
        }
    }

    fn mixed_lines() -> Vec<String> {
        vec![
            line("The cat sat on the mat.\nIt was warm.", Some("en")),
            line("Le chat est sur le tapis.", Some("fr")),
            line("", None),
            line("A dog barked at the postman, loudly.", None),
            String::from("   "),
            line("Il fait beau aujourd'hui.", Some("fr")),
        ]
    }

    fn write_shards(dir: &Path, files: Vec<Vec<String>>, calculator: &SignalCalculator) {
        for (idx, lines) in files.into_iter().enumerate() {
            for (lang, aggregate) in collect_lines(lines, calculator, &config()).unwrap() {
                let lang_dir = language_dir(dir, &lang).unwrap();
                fs::create_dir_all(&lang_dir).unwrap();
                write_shard(&aggregate, &shard_filename(&lang_dir, idx)).unwrap();
            }
        }
    }

    fn words(words: &[&str]) -> DocumentSignals {
        DocumentSignals {
            signals: SignalVector::default(),
            tokens: words.iter().map(|w| w.to_string()).collect(),
            words: words.iter().map(|w| w.to_string()).collect(),
            n_bytes: 0,
        }
    }

    #[test]
    fn test_collect_lines_groups_by_language() {
        let aggregates = collect_lines(mixed_lines(), &calculator(), &config()).unwrap();
        assert_eq!(aggregates.keys().collect::<Vec<_>>(), vec!["en", "fr"]);
        // records without a language field count as English
        assert_eq!(aggregates["en"].total_docs, 3);
        assert_eq!(aggregates["fr"].total_docs, 2);
        assert!(aggregates.values().all(|a| a.complete));
        assert_eq!(aggregates["fr"].word_counter.get("chat"), Some(&1));
    }

    #[test]
    fn test_collect_lines_forced_language() {
        let config = CollectorConfig { language: Some(String::from("de")), ..config() };
        let aggregates = collect_lines(mixed_lines(), &calculator(), &config).unwrap();
        assert_eq!(aggregates.keys().collect::<Vec<_>>(), vec!["de"]);
        assert_eq!(aggregates["de"].total_docs, 5);
        assert_eq!(aggregates["de"].language, "de");
    }

    #[test]
    fn test_collect_lines_rejects_bad_json() {
        let lines = vec![line("fine", Some("en")), String::from("{not json")];
        assert!(collect_lines(lines, &calculator(), &config()).is_err());
    }

    #[test]
    fn test_reduce_dir_by_language() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), vec![mixed_lines(), mixed_lines()], &calculator());
        let input = dir.path().to_path_buf();

        let all = reduce_dir(&input, None, &ReducerConfig::default()).unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["en", "fr"]);
        assert_eq!(all["en"].n_shards, 2);
        assert_eq!(all["en"].aggregate.total_docs, 6);
        assert_eq!(all["fr"].aggregate.total_docs, 4);

        let french = reduce_dir(&input, Some("fr"), &ReducerConfig::default()).unwrap();
        assert_eq!(french.keys().collect::<Vec<_>>(), vec!["fr"]);
        assert_eq!(french["fr"], all["fr"]);

        let err = reduce_dir(&input, Some("de"), &ReducerConfig::default()).unwrap_err();
        assert!(err.to_string().contains("No shards for language"));
    }

    #[test]
    fn test_render_every_mode() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), vec![mixed_lines()], &calculator());
        let reduced = reduce_dir(&dir.path().to_path_buf(), Some("en"), &ReducerConfig::default()).unwrap();
        let corpus = &reduced["en"];
        let config = ReducerConfig::default();

        let raw = render_corpus(corpus, ReduceMode::Raw, &config).unwrap();
        assert_eq!(raw["n_shards"], 1);
        assert_eq!(raw["aggregate"]["total_docs"], 3);

        let stats = render_corpus(corpus, ReduceMode::Statistics, &config).unwrap();
        assert_eq!(stats["total_docs"], 3);
        assert!(stats["metrics"]["alpha_ratio"]["mean"].is_number());
        assert!(stats.get("histograms").is_none());

        for mode in [ReduceMode::FiltersMeanstd, ReduceMode::FiltersQ] {
            let value = render_corpus(corpus, mode, &config).unwrap();
            let thresholds: FilterThresholds = serde_json::from_value(value).unwrap();
            assert!(thresholds.new_line_ratio <= 1.0);
            assert!(thresholds.line_punct_thr >= 0.0);
        }
    }

    #[test]
    fn test_min_language_score_across_shards() {
        let calculator =
            SignalCalculator::new(Arc::new(TokenizerRegistry::default()), Some(Arc::new(FixedScorer)), DEFAULT_SHORT_LINE_LENGTH);
        let confident = vec![line("Plain English text.", Some("en")), line("More of it here.", Some("en"))];
        let mixed = vec![line("Another line.", Some("en")), line("An unsure one.", Some("en"))];

        let first = collect_lines(confident.clone(), &calculator, &config()).unwrap();
        assert_eq!(first["en"].min_language_score, 0.5);

        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), vec![confident, mixed], &calculator);
        let reduced = reduce_dir(&dir.path().to_path_buf(), None, &ReducerConfig::default()).unwrap();
        assert_eq!(reduced["en"].aggregate.min_language_score, 0.25);
        assert_eq!(reduced["en"].statistics().min_language_score, 0.25);
    }

    #[test]
    fn test_live_prune_waits_for_growth() {
        let pruning = WordCountPruning { min_count: 2, live_prune_above: Some(2) };
        let mut collector = LanguageStatsCollector::new("en", 0.01, pruning);
        collector.update(&words(&["a", "a", "b", "b", "c", "c"]));
        collector.update(&words(&["d"]));
        collector.update(&words(&["d"]));
        let aggregate = collector.finish();
        // a, b and c all survive the first prune, so "d" gets time to reach min_count
        assert_eq!(aggregate.word_counter.get("d"), Some(&2));
        assert_eq!(aggregate.word_counter.len(), 4);
    }

    #[test]
    fn test_live_prune_drops_rare_words() {
        let pruning = WordCountPruning { min_count: 2, live_prune_above: Some(2) };
        let mut collector = LanguageStatsCollector::new("en", 0.01, pruning);
        collector.update(&words(&["x", "y", "z"]));
        collector.update(&words(&["x"]));
        collector.update(&words(&["x"]));
        let aggregate = collector.finish();
        // the first "x" went with the live prune
        assert_eq!(aggregate.word_counter.get("x"), Some(&2));
        assert_eq!(aggregate.word_counter.len(), 1);
        assert_eq!(aggregate.total_docs, 3);
    }

    #[test]
    fn test_language_dir_is_one_component() {
        let root = Path::new("/tmp/out");
        assert_eq!(language_dir(root, "en").unwrap(), root.join("en"));
        for bad in ["", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(language_dir(root, bad).is_err(), "{:?} should be rejected", bad);
        }
    }
}
