use serde_json::Value;
use anyhow::{Error, Result};

use crate::utils::{json_get, json_get_str};

/// Read-only view of one input record: the text, its declared language and an id.
/// The original JSON is kept so that filters can pass it through untouched.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub language: String,
    pub data: Value,
}

/// Where the fields live inside a JSONL record
#[derive(Debug, Clone)]
pub struct DocumentFields {
    pub text_field: String,
    pub language_field: String,
    pub id_field: String,
    /// Used when the record has no language field, or to force one language for a job
    pub language: Option<String>,
}

impl Default for DocumentFields {
    fn default() -> Self {
        Self {
            text_field: String::from("text"),
            language_field: String::from("metadata.language"),
            id_field: String::from("id"),
            language: None,
        }
    }
}

impl Document {
    pub fn new(id: &str, text: &str, language: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            language: language.to_string(),
            data: Value::Null,
        }
    }

    pub fn from_json(data: Value, fields: &DocumentFields) -> Result<Self, Error> {
        let text = json_get_str(&data, &fields.text_field)?.to_string();
        let language = match &fields.language {
            Some(lang) => lang.clone(),
            None => json_get(&data, &fields.language_field)
                .and_then(|v| v.as_str())
                .unwrap_or(crate::tokenizer::DEFAULT_LANGUAGE)
                .to_string(),
        };
        let id = match json_get(&data, &fields.id_field) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Ok(Self { id, text, language, data })
    }
}
