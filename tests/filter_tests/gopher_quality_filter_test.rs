extern crate langstats_rs;
use langstats_rs::filters::{Decision, GopherQualityFilter, QualityFilter};
use langstats_rs::signals::{SignalCalculator, DEFAULT_SHORT_LINE_LENGTH};
use langstats_rs::thresholds::{write_thresholds, FilterThresholds};
use langstats_rs::tokenizer::TokenizerRegistry;
use langstats_rs::Document;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn check_lang(filter: &GopherQualityFilter, text: &str, lang: &str) -> Decision {
        let calculator =
            SignalCalculator::new(Arc::new(TokenizerRegistry::default()), None, DEFAULT_SHORT_LINE_LENGTH);
        let doc = Document::new("0", text, lang);
        let signals = calculator.compute_signals(&doc).unwrap();
        filter.decide(&doc, &signals)
    }

    fn check(filter: &GopherQualityFilter, text: &str) -> Decision {
        check_lang(filter, text, "en")
    }

    fn small_filter() -> GopherQualityFilter {
        GopherQualityFilter::new(&json!({"min_doc_words": 10, "max_doc_words": 1000})).unwrap()
    }

    fn dropped(reason: &str) -> Decision {
        Decision::Drop(String::from(reason))
    }

    #[test]
    fn test_short_and_long_documents() {
        let filter = small_filter();
        assert_eq!(check(&filter, "I am too small..."), dropped("gopher_short_doc"));
        assert_eq!(check(&filter, &"have ".repeat(1001)), dropped("gopher_long_doc"));
    }

    #[test]
    fn test_short_doc_is_checked_first() {
        // also fails the average word length, but the length check comes first
        assert_eq!(check(&small_filter(), "I am a"), dropped("gopher_short_doc"));
    }

    #[test]
    fn test_average_word_length() {
        let filter = small_filter();
        assert_eq!(check(&filter, &"I am ".repeat(20)), dropped("gopher_below_avg_threshold"));
        assert_eq!(
            check(&filter, &"interconnection ".repeat(20)),
            dropped("gopher_above_avg_threshold")
        );
    }

    #[test]
    fn test_symbol_ratios() {
        let filter = small_filter();
        assert_eq!(check(&filter, &"# comment ".repeat(20)), dropped("gopher_too_many_hashes"));
        assert_eq!(check(&filter, &"... comment ".repeat(20)), dropped("gopher_too_many_ellipsis"));
    }

    #[test]
    fn test_line_shapes() {
        let filter = small_filter();
        assert_eq!(check(&filter, &"\u{2022} comment\n".repeat(20)), dropped("gopher_too_many_bullets"));
        assert_eq!(check(&filter, &"- comment\n".repeat(20)), dropped("gopher_too_many_bullets"));

        let line = format!("{}text\u{2026}\n", "text ".repeat(11));
        assert_eq!(check(&filter, &line.repeat(20)), dropped("gopher_too_many_end_ellipsis"));
    }

    #[test]
    fn test_alpha_ratio() {
        let text = "the ./!*?<><> apple <?////> orange  ++ interconnection !<>??? have ".repeat(20);
        assert_eq!(check(&small_filter(), &text), dropped("gopher_below_alpha_threshold"));
    }

    #[test]
    fn test_stop_words() {
        let filter = small_filter();
        // stop word matching is case sensitive
        assert_eq!(check(&filter, &"Have Have ".repeat(20)), dropped("gopher_enough_stop_words"));
        assert_eq!(check(&filter, &"have ".repeat(20)), Decision::Keep);
    }

    #[test]
    fn test_english_only_defaults_skip_other_languages() {
        let filter = small_filter();
        assert_eq!(check_lang(&filter, &"I am ".repeat(20), "xx"), Decision::Keep);
        // the document length bounds are global
        assert_eq!(check_lang(&filter, "tiny", "xx"), dropped("gopher_short_doc"));
    }

    #[test]
    fn test_per_language_override() {
        let filter = GopherQualityFilter::new(&json!({
            "min_doc_words": {"fr": 10},
            "stop_words": {"fr": ["le", "la"]},
            "min_stop_words": {"fr": 2}
        }))
        .unwrap();
        assert_eq!(check_lang(&filter, &"le chat ".repeat(10), "fr"), Decision::Keep);
        assert_eq!(check_lang(&filter, &"chat noir ".repeat(10), "fr"), dropped("gopher_enough_stop_words"));
        // no minimum for English any more, and no English stop words
        assert_eq!(check(&filter, "tiny"), Decision::Keep);
    }

    #[test]
    fn test_thresholds_file_replaces_english_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.yaml");
        let derived = FilterThresholds {
            min_avg_word_length: 3.0,
            max_avg_word_length: 10.0,
            max_non_alpha_words_ratio: 0.8,
            stopwords: vec![String::from("le"), String::from("la")],
            line_punct_thr: 0.1,
            short_line_thr: 0.6,
            new_line_ratio: 0.3,
            char_duplicates_ratio: 0.01,
            language_score_thr: 0.65,
        };
        write_thresholds(&BTreeMap::from([(String::from("fr"), derived)]), &path).unwrap();

        let filter = GopherQualityFilter::new(&json!({
            "min_doc_words": 10,
            "thresholds_file": path.to_str().unwrap()
        }))
        .unwrap();
        assert_eq!(check_lang(&filter, &"le chat ".repeat(10), "fr"), Decision::Keep);
        assert_eq!(check_lang(&filter, &"chat noir ".repeat(10), "fr"), dropped("gopher_enough_stop_words"));
        assert_eq!(check_lang(&filter, &"le a ".repeat(10), "fr"), dropped("gopher_below_avg_threshold"));
        // English falls back to the global checks only
        assert_eq!(check(&filter, &"I am ".repeat(20)), Decision::Keep);
    }
}
