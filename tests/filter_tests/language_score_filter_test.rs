extern crate langstats_rs;
use langstats_rs::filters::{Decision, LanguageScoreFilter, QualityFilter};
use langstats_rs::lang_id::LanguageScorer;
use langstats_rs::signals::{SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use langstats_rs::tokenizer::TokenizerRegistry;
use langstats_rs::Document;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Error, Result};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FixedScorer(f32);

    impl LanguageScorer for FixedScorer {
        fn predict(&self, _text: &str) -> Result<HashMap<String, f32>, Error> {
            Ok(HashMap::from([(String::from("en"), self.0)]))
        }
    }

    fn check(score: f32, lang: &str) -> Decision {
        let calculator = SignalCalculator::new(
            Arc::new(TokenizerRegistry::default()),
            Some(Arc::new(FixedScorer(score))),
            DEFAULT_SHORT_LINE_LENGTH,
        );
        let filter = LanguageScoreFilter::new(&json!({"language_score_thr": {"en": 0.65, "de": 0.65}})).unwrap();
        let doc = Document::new("0", "Some text to score.", lang);
        let signals = calculator.compute_signals(&doc).unwrap();
        filter.decide(&doc, &signals)
    }

    #[test]
    fn test_low_score_is_dropped() {
        assert_eq!(check(0.5, "en"), Decision::Drop(String::from("language_score")));
    }

    #[test]
    fn test_high_score_is_kept() {
        assert_eq!(check(0.9, "en"), Decision::Keep);
    }

    #[test]
    fn test_label_missing_from_prediction_scores_zero() {
        assert_eq!(check(0.9, "de"), Decision::Drop(String::from("language_score")));
    }

    #[test]
    fn test_language_without_threshold_is_kept() {
        assert_eq!(check(0.1, "fr"), Decision::Keep);
    }
}
