extern crate langstats_rs;
use langstats_rs::filters::{Decision, ListFilter, QualityFilter};
use langstats_rs::signals::{SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use langstats_rs::tokenizer::TokenizerRegistry;
use langstats_rs::Document;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn check(filter: &ListFilter, text: &str) -> Decision {
        let calculator =
            SignalCalculator::new(Arc::new(TokenizerRegistry::default()), None, DEFAULT_SHORT_LINE_LENGTH);
        let doc = Document::new("0", text, "en");
        let signals = calculator.compute_signals(&doc).unwrap();
        filter.decide(&doc, &signals)
    }

    #[test]
    fn test_one_word_per_line() {
        let filter = ListFilter::new(&json!({})).unwrap();
        assert_eq!(check(&filter, "a\nb\nc\nd"), Decision::Drop(String::from("suspected_list")));
    }

    #[test]
    fn test_prose_is_kept() {
        let filter = ListFilter::new(&json!({})).unwrap();
        let text = "Prose runs on for a while before it breaks a line.\nThen it goes on a little more.";
        assert_eq!(check(&filter, text), Decision::Keep);
    }

    #[test]
    fn test_custom_ratio() {
        let filter = ListFilter::new(&json!({"new_line_ratio": 0.9})).unwrap();
        assert_eq!(check(&filter, "a\nb\nc\nd"), Decision::Keep);
    }
}
