use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use serde_json::{Value, json};
use anyhow::{anyhow, Context, Result, Error};

/*================================================================================
=                            JSON GETTER METHODS                                 =
================================================================================*/

/// A trait for extracting values from JSON with type conversion
pub trait FromValue: Sized {
    /// Try to convert a JSON value to Self
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(String::from)
    }
}

impl FromValue for usize {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_u64().map(|v| v as usize)
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Get a value from a JSON config with a default
pub fn get_default<T: FromValue>(config: &Value, key: &str, default: T) -> T {
    match config.get(key) {
        Some(value) => T::from_value(value).unwrap_or(default),
        None => default,
    }
}


/// Dotted-path lookup, e.g. `metadata.language`
pub fn json_get<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = data;
    for key in key.split('.') {
        match current.get(key) {
            Some(value) => current = value,
            None => return None,
        }
    }
    Some(current)
}


pub fn json_set(input: &mut Value, key: &str, val: Value) -> Result<(), Error> {
    let parts: Vec<&str> = key.split('.').collect();
    let mut current = input;

    for (i, &part) in parts.iter().enumerate() {
        if !current.is_object() {
            return Err(anyhow!("Weird nesting for setting json values at {:?}", key));
        }
        if i == parts.len() - 1 {
            current[part] = val;
            return Ok(());
        }
        if current.get(part).is_none() {
            current[part] = json!({});
        }
        current = &mut current[part];
    }
    Ok(())
}


/// Reads a string field, erroring (not panicking) when it is missing or not a string
pub fn json_get_str<'a>(data: &'a Value, key: &str) -> Result<&'a str, Error> {
    json_get(data, key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing string field {:?}", key))
}


/*================================================================================
=                            CONFIG PARSING                                      =
================================================================================*/

pub fn parse_config(config: &PathBuf) -> Result<Value, Error> {
    // Handle either .yaml or .json config and return a Json value
    let file = File::open(config).with_context(|| format!("Unable to open config {:?}", config))?;
    let reader = BufReader::new(file);

    let ext = config.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parsed_config: Value = match ext {
        "json" => serde_json::from_reader(reader)?,
        "yaml" | "yml" => {
            let yaml_value: serde_yaml::Value = serde_yaml::from_reader(reader)?;
            serde_json::to_value(yaml_value)?
        }
        _ => {
            return Err(anyhow!("Weird config format: {:?}", config));
        }
    };
    Ok(parsed_config)
}


/*================================================================================
=                            NUMERIC HELPERS                                     =
================================================================================*/

/// Ratio where a zero denominator yields 0 rather than NaN/inf
pub fn ratio(num: f64, denom: f64) -> f64 {
    if denom > 0.0 { num / denom } else { 0.0 }
}

/// Round half-to-even at `digits` decimals. Calibrated thresholds were produced
/// with banker's rounding, so 2.5 -> 2 and 0.125 -> 0.12.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round_ties_even() / scale
}
