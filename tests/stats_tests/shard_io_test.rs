extern crate langstats_rs;
use langstats_rs::signals::{MetricKey, SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use langstats_rs::stats::{
    find_shards, group_by_language, load_shards, read_shard, shard_filename, write_shard, LanguageStatsCollector,
    ShardAggregate, WordCountPruning, DEFAULT_BIN_WIDTH,
};
use langstats_rs::tokenizer::TokenizerRegistry;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    fn shard(language: &str) -> ShardAggregate {
        let calculator =
            SignalCalculator::new(Arc::new(TokenizerRegistry::default()), None, DEFAULT_SHORT_LINE_LENGTH);
        let mut collector = LanguageStatsCollector::new(language, DEFAULT_BIN_WIDTH, WordCountPruning::none());
        for text in ["Some text, written plainly.", "More text\nover two lines."] {
            collector.update(&calculator.compute(text, language).unwrap());
        }
        collector.finish()
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = shard_filename(&dir.path().join("en"), 3);
        assert!(path.ends_with("en/00003.json"));

        let original = shard("en");
        write_shard(&original, &path).unwrap();
        let loaded = read_shard(&path).unwrap();
        assert_eq!(loaded.total_docs, 2);
        assert_eq!(loaded.word_counter, original.word_counter);
        assert_eq!(loaded.histograms, original.histograms);
        assert_eq!(
            loaded.metric(MetricKey::LinePunctRatio).weight(),
            original.metric(MetricKey::LinePunctRatio).weight()
        );
    }

    #[test]
    fn test_unfinished_shards_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut unfinished = shard("en");
        unfinished.complete = false;
        assert!(write_shard(&unfinished, &shard_filename(dir.path(), 0)).is_err());
    }

    #[test]
    fn test_load_and_group_by_language() {
        let dir = tempfile::tempdir().unwrap();
        write_shard(&shard("en"), &shard_filename(&dir.path().join("en"), 0)).unwrap();
        write_shard(&shard("en"), &shard_filename(&dir.path().join("en"), 1)).unwrap();
        write_shard(&shard("fr"), &shard_filename(&dir.path().join("fr"), 0)).unwrap();

        assert_eq!(find_shards(dir.path()).unwrap().len(), 3);
        let groups = group_by_language(load_shards(dir.path()).unwrap());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["en"].len(), 2);
        assert_eq!(groups["fr"].len(), 1);
    }

    #[test]
    fn test_corrupt_shard_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write_shard(&shard("en"), &shard_filename(dir.path(), 0)).unwrap();
        fs::write(dir.path().join("00001.json"), b"{\"language\": \"en\", \"total_docs\": ").unwrap();

        let err = load_shards(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("00001.json"));
    }

    #[test]
    fn test_incomplete_shard_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut unfinished = shard("en");
        unfinished.complete = false;
        let path = dir.path().join("00000.json");
        fs::write(&path, serde_json::to_vec(&unfinished).unwrap()).unwrap();
        assert!(read_shard(&path).is_err());
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_shards(dir.path()).is_err());
    }
}
