/*
Word tokenization, dispatched per language.

Every backend sits behind the same `Tokenizer` trait and the registry maps a
language code to one of them. Languages without an entry are tokenized with the
English backend and counted, so that degraded languages can be audited after a run.
*/

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Error, Result};
use dashmap::DashMap;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_LANGUAGE: &str = "en";

pub trait Tokenizer: Send + Sync + std::fmt::Debug {
    fn tokenize(&self, text: &str) -> Vec<String>;
}


/*================================================================================
=                            BACKENDS                                            =
================================================================================*/

/// UAX#29 word boundaries; whitespace segments are dropped and punctuation
/// comes out as its own tokens ("Frank," -> "Frank", ",")
#[derive(Debug, Default)]
pub struct UnicodeWordTokenizer;

impl Tokenizer for UnicodeWordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_word_bounds()
            .filter(|seg| !seg.trim().is_empty())
            .map(String::from)
            .collect()
    }
}


#[derive(Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }
}


/// For scripts written without spaces (Thai, Lao, Khmer, Burmese, Tibetan): word
/// bounds first, then any segment of those scripts is broken into grapheme clusters
#[derive(Debug, Default)]
pub struct GraphemeTokenizer;

impl GraphemeTokenizer {
    fn is_unspaced_script(c: char) -> bool {
        matches!(c,
            '\u{0E00}'..='\u{0EFF}'     // Thai, Lao
            | '\u{0F00}'..='\u{0FFF}'   // Tibetan
            | '\u{1000}'..='\u{109F}'   // Myanmar
            | '\u{1780}'..='\u{17FF}'   // Khmer
            | '\u{19E0}'..='\u{19FF}')
    }
}

impl Tokenizer for GraphemeTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for seg in text.split_word_bounds() {
            if seg.trim().is_empty() {
                continue;
            }
            if seg.chars().any(Self::is_unspaced_script) {
                tokens.extend(seg.graphemes(true).filter(|g| !g.trim().is_empty()).map(String::from));
            } else {
                tokens.push(seg.to_string());
            }
        }
        tokens
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    UnicodeWords,
    Whitespace,
    Graphemes,
}

impl TokenizerKind {
    pub fn build(&self) -> Arc<dyn Tokenizer> {
        match self {
            TokenizerKind::UnicodeWords => Arc::new(UnicodeWordTokenizer),
            TokenizerKind::Whitespace => Arc::new(WhitespaceTokenizer),
            TokenizerKind::Graphemes => Arc::new(GraphemeTokenizer),
        }
    }
}


/*================================================================================
=                            REGISTRY                                            =
================================================================================*/

const UNICODE_WORD_LANGUAGES: &[&str] = &[
    "en", "es", "pt", "it", "fr", "ro", "de", "la", "cs", "da", "fi", "el", "no", "nn", "pl",
    "ru", "sl", "sv", "tr", "nl", "zh", "ja", "vi", "id", "fa", "ko", "ar", "hi", "bn", "ta",
    "hu", "uk", "sk", "bg", "ca", "hr", "sr", "lt", "et", "he", "lv", "sh", "sq", "az", "is",
    "mk", "ka", "gl", "hy", "eu", "sw", "ms", "tl", "jv", "pa", "gu", "yo", "mr", "ur", "am",
    "te", "ml", "kn", "ne", "kk", "be", "eo", "uz", "tg", "cy", "bs", "si", "tt", "af", "ky",
    "ga", "oc", "ku", "lb", "ba", "fy", "ps", "mt", "br", "as", "mg", "sa", "ceb", "ckb", "azb",
];

const GRAPHEME_LANGUAGES: &[&str] = &["th", "lo", "km", "my", "bo"];


#[derive(Debug)]
pub struct TokenizerRegistry {
    tokenizers: HashMap<String, Arc<dyn Tokenizer>>,
    default: Arc<dyn Tokenizer>,
    fallbacks: DashMap<String, usize>,
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        let words = TokenizerKind::UnicodeWords.build();
        let graphemes = TokenizerKind::Graphemes.build();
        let mut tokenizers: HashMap<String, Arc<dyn Tokenizer>> = HashMap::new();
        for lang in UNICODE_WORD_LANGUAGES {
            tokenizers.insert(lang.to_string(), words.clone());
        }
        for lang in GRAPHEME_LANGUAGES {
            tokenizers.insert(lang.to_string(), graphemes.clone());
        }
        Self { tokenizers, default: words, fallbacks: DashMap::new() }
    }
}

impl TokenizerRegistry {
    /// Default table, with `{lang: kind}` overrides from a config value (may be null)
    pub fn new(overrides: &Value) -> Result<Self, Error> {
        let mut registry = Self::default();
        if let Some(map) = overrides.as_object() {
            for (lang, kind) in map {
                let kind: TokenizerKind = serde_json::from_value(kind.clone())
                    .map_err(|e| anyhow!("Bad tokenizer kind for {:?}: {}", lang, e))?;
                registry.register(lang, kind.build());
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, language: &str, tokenizer: Arc<dyn Tokenizer>) {
        self.tokenizers.insert(language.to_string(), tokenizer);
    }

    pub fn supports(&self, language: &str) -> bool {
        self.tokenizers.contains_key(language)
    }

    /// Never fails: unknown languages get the English tokenizer
    pub fn get(&self, language: &str) -> &dyn Tokenizer {
        match self.tokenizers.get(language) {
            Some(tok) => tok.as_ref(),
            None => {
                let mut count = self.fallbacks.entry(language.to_string()).or_insert(0);
                if *count == 0 {
                    warn!("No tokenizer for {:?}, falling back to {:?}", language, DEFAULT_LANGUAGE);
                }
                *count += 1;
                self.default.as_ref()
            }
        }
    }

    pub fn tokenize(&self, text: &str, language: &str) -> Vec<String> {
        self.get(language).tokenize(text)
    }

    /// How many lookups fell back to the default, per requested language
    pub fn fallback_counts(&self) -> HashMap<String, usize> {
        self.fallbacks.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }
}
