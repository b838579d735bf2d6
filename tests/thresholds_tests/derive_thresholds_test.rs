extern crate langstats_rs;
use langstats_rs::signals::MetricKey;
use langstats_rs::stats::{CorpusAggregate, RunningMeanVariance, ShardAggregate};
use langstats_rs::thresholds::{derive_thresholds, MeanStdPolicy, QuantilePolicy, StopwordPolicy, ThresholdPolicy};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn moments(mean: f64, std: f64) -> RunningMeanVariance {
        RunningMeanVariance::from_moments(mean, std * std + mean * mean, 10)
    }

    fn corpus() -> CorpusAggregate {
        let mut shard = ShardAggregate::empty("en", 0.01);
        shard.total_docs = 10;
        shard.complete = true;
        for key in MetricKey::ALL {
            shard.metrics.insert(key, RunningMeanVariance::from_moments(0.0, 0.0, 10));
        }
        shard.metrics.insert(MetricKey::AlphaRatio, moments(0.9, 0.2));
        shard.metrics.insert(MetricKey::LinePunctRatio, moments(0.3, 0.1));
        shard.metrics.insert(MetricKey::ShortLineRatio, moments(0.4, 0.1));
        shard.metrics.insert(MetricKey::NewLineRatio, moments(0.5, 0.41));
        shard.metrics.insert(MetricKey::LanguageScore, moments(0.5, 0.34));
        // word lengths 2 and 4: mean 3, std sqrt(2)
        shard.length_counter = BTreeMap::from([(2, 1), (4, 1)]);
        shard.word_counter = BTreeMap::from([(String::from("the"), 10)]);

        if let Some(hist) = shard.histograms.get_mut(&MetricKey::AlphaRatio) {
            for i in 1..=100 {
                hist.insert(i as f64 / 100.0);
            }
        }
        CorpusAggregate { n_shards: 1, aggregate: shard }
    }

    fn mean_std() -> ThresholdPolicy {
        ThresholdPolicy::MeanStd(MeanStdPolicy::default())
    }

    fn quantile() -> ThresholdPolicy {
        ThresholdPolicy::Quantile(QuantilePolicy::default())
    }

    #[test]
    fn test_mean_std_policy() {
        let t = derive_thresholds(&corpus(), &mean_std(), &StopwordPolicy::default());
        assert_eq!(t.min_avg_word_length, 2.0);
        assert_eq!(t.max_avg_word_length, 4.0);
        assert_eq!(t.max_non_alpha_words_ratio, 0.8);
        assert_eq!(t.line_punct_thr, 0.2);
        assert_eq!(t.short_line_thr, 0.5);
        // capped at 1
        assert_eq!(t.new_line_ratio, 1.0);
        assert_eq!(t.char_duplicates_ratio, 0.01);
        // floored at 0
        assert_eq!(t.language_score_thr, 0.0);
        assert_eq!(t.stopwords, vec!["the"]);
    }

    #[test]
    fn test_quantile_policy() {
        let t = derive_thresholds(&corpus(), &quantile(), &StopwordPolicy::default());
        assert_eq!(t.max_non_alpha_words_ratio, 0.25);
        assert_eq!(t.char_duplicates_ratio, 0.01);
        // nothing was inserted into the other histograms
        assert_eq!(t.line_punct_thr, 0.0);
        assert_eq!(t.min_avg_word_length, 0.0);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let corpus = corpus();
        for policy in [mean_std(), quantile()] {
            let first = derive_thresholds(&corpus, &policy, &StopwordPolicy::default());
            let second = derive_thresholds(&corpus, &policy, &StopwordPolicy::default());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_policy_from_config() {
        let policy: ThresholdPolicy = serde_json::from_value(json!({"policy": "quantile", "alpha_ratio": 0.3})).unwrap();
        match policy {
            ThresholdPolicy::Quantile(p) => {
                assert_eq!(p.alpha_ratio, 0.3);
                assert_eq!(p.line_punct, 0.2);
            }
            other => panic!("unexpected policy {:?}", other),
        }
        let policy: ThresholdPolicy = serde_json::from_value(json!({"policy": "mean_std"})).unwrap();
        assert_eq!(policy, mean_std());
    }
}
