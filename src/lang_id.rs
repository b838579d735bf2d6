//! Language identification scores.
//!
//! The signal calculator only needs "how confident is the classifier that this text is
//! in language X". The fastText model is loaded once when the scorer is built and then
//! shared by every document a worker processes.
use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Error, Result};
use fasttext::FastText;

const LABEL_PREFIX: &str = "__label__";

pub trait LanguageScorer: Send + Sync {
    /// Confidence for every label the model knows, keyed by bare language code
    fn predict(&self, text: &str) -> Result<HashMap<String, f32>, Error>;

    /// Score for one language; labels absent from the prediction score 0
    fn score(&self, text: &str, language: &str) -> Result<f64, Error> {
        let scores = self.predict(text)?;
        Ok(scores.get(language).map_or(0.0, |s| *s as f64))
    }
}


pub struct FastTextScorer {
    model: FastText,
    num_labels: i32,
}

impl FastTextScorer {
    pub fn new(model_path: &Path) -> Result<Self, Error> {
        let path_str = model_path
            .to_str()
            .ok_or_else(|| anyhow!("invalid filepath for lid model: {:?}", model_path))?;
        let mut model = FastText::new();
        model.load_model(path_str).map_err(|e| anyhow!("Unable to load {:?}: {}", model_path, e))?;
        let num_labels = model
            .get_labels()
            .map_err(|e| anyhow!("Unable to read labels of {:?}: {}", model_path, e))?
            .0
            .len() as i32;
        Ok(Self { model, num_labels })
    }
}

impl LanguageScorer for FastTextScorer {
    fn predict(&self, text: &str) -> Result<HashMap<String, f32>, Error> {
        // fastText predicts on a single line
        let line = text.replace('\n', "");
        let predictions = self
            .model
            .predict(&line, self.num_labels, -1.0)
            .map_err(|e| anyhow!("fastText prediction failed: {}", e))?;
        Ok(predictions
            .into_iter()
            .map(|p| {
                let label = p.label.strip_prefix(LABEL_PREFIX).unwrap_or(&p.label).to_string();
                (label, p.prob)
            })
            .collect())
    }
}
