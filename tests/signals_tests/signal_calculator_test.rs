extern crate langstats_rs;
use langstats_rs::lang_id::LanguageScorer;
use langstats_rs::signals::{MetricKey, SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use langstats_rs::tokenizer::TokenizerRegistry;
use langstats_rs::Document;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Error, Result};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FixedScorer(HashMap<String, f32>);

    impl LanguageScorer for FixedScorer {
        fn predict(&self, _text: &str) -> Result<HashMap<String, f32>, Error> {
            Ok(self.0.clone())
        }
    }

    fn plain_calculator() -> SignalCalculator {
        SignalCalculator::new(Arc::new(TokenizerRegistry::default()), None, DEFAULT_SHORT_LINE_LENGTH)
    }

    fn scoring_calculator() -> SignalCalculator {
        let scores = HashMap::from([(String::from("en"), 0.75), (String::from("fr"), 0.25)]);
        SignalCalculator::new(
            Arc::new(TokenizerRegistry::default()),
            Some(Arc::new(FixedScorer(scores))),
            DEFAULT_SHORT_LINE_LENGTH,
        )
    }

    #[test]
    fn test_one_line_without_punctuation() {
        let signals = plain_calculator().compute("a single line with no stop", "en").unwrap();
        assert_eq!(signals.get(MetricKey::LinePunctRatio), 0.0);
    }

    #[test]
    fn test_every_ratio_is_non_negative() {
        let text = "# Title\n\n- first point...\n- second point\n\nSome prose, with commas. And more!\n";
        let signals = plain_calculator().compute(text, "en").unwrap();
        for (key, value) in signals.signals.iter() {
            assert!(value >= 0.0, "{} is negative", key);
            assert!(value.is_finite(), "{} is not finite", key);
        }
    }

    #[test]
    fn test_duplicate_line_metrics_are_distinct() {
        let text = "same line\n\nsame line\nother";
        let signals = plain_calculator().compute(text, "en").unwrap();
        // newline runs: ["same line", "same line", "other"]
        assert_eq!(signals.get(MetricKey::DupLineFrac), 2.0 / 3.0);
        // 18 duplicated chars over 23 non-newline chars
        assert_eq!(signals.get(MetricKey::DuplicateLineRatio), 18.0 / 23.0);
        // paragraphs: ["same line", "same line\nother"]
        assert_eq!(signals.get(MetricKey::DupParaFrac), 0.0);
    }

    #[test]
    fn test_language_score_for_declared_language() {
        let calculator = scoring_calculator();
        let doc = Document::new("1", "some english text", "en");
        let signals = calculator.compute_signals(&doc).unwrap();
        assert_eq!(signals.get(MetricKey::LanguageScore), 0.75);

        let signals = calculator.compute("some text", "de").unwrap();
        assert_eq!(signals.get(MetricKey::LanguageScore), 0.0);
    }

    #[test]
    fn test_no_scorer_means_zero_score() {
        let signals = plain_calculator().compute("some english text", "en").unwrap();
        assert_eq!(signals.get(MetricKey::LanguageScore), 0.0);
    }

    #[test]
    fn test_unknown_language_falls_back_to_english() {
        let calculator = plain_calculator();
        let fallback = calculator.compute("hello world, again", "xx").unwrap();
        let english = calculator.compute("hello world, again", "en").unwrap();
        assert_eq!(fallback.tokens, english.tokens);
        assert_eq!(calculator.tokenizers().fallback_counts().get("xx"), Some(&1));
    }

    #[test]
    fn test_words_exclude_punctuation_tokens() {
        let signals = plain_calculator().compute("Hello, world!", "en").unwrap();
        assert_eq!(signals.tokens, vec!["Hello", ",", "world", "!"]);
        assert_eq!(signals.words, vec!["Hello", "world"]);
        assert_eq!(signals.n_bytes, 13);
    }
}
