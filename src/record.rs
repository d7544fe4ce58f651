//! Structured event records
//!
//! A record is a flat map of string keys to text or numeric values. Timestamps
//! travel as RFC 3339 text.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use eyre::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(serde_json::Number),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<f64> for FieldValue {
    /// Non-finite floats have no JSON form and become text.
    fn from(n: f64) -> Self {
        match serde_json::Number::from_f64(n) {
            Some(num) => FieldValue::Number(num),
            None => FieldValue::Text(n.to_string()),
        }
    }
}

/// An event record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a `timestamp` field formatted as RFC 3339
    pub fn with_timestamp<Tz: TimeZone>(self, at: DateTime<Tz>) -> Self {
        let text = at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true);
        self.with("timestamp", text)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Fill in fields from `defaults` that this record does not already set
    pub fn merge_defaults(&mut self, defaults: &Record) {
        for (key, value) in defaults.iter() {
            if !self.fields.contains_key(key) {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    /// Parse a `key=value` pair; values that read as JSON numbers become numbers
    pub fn parse_field(pair: &str) -> Result<(String, FieldValue)> {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| eyre::eyre!("Invalid field '{}': expected key=value", pair))?;

        let key = key.trim();
        if key.is_empty() {
            eyre::bail!("Invalid field '{}': key is empty", pair);
        }

        let value = match serde_json::from_str::<serde_json::Number>(raw) {
            Ok(n) => FieldValue::Number(n),
            Err(_) => FieldValue::Text(raw.to_string()),
        };

        Ok((key.to_string(), value))
    }

    /// Build a record from a list of `key=value` pairs
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut record = Self::new();
        for pair in pairs {
            let (key, value) = Self::parse_field(pair.as_ref())?;
            record.insert(key, value);
        }
        Ok(record)
    }

    /// Build a record from a JSON object whose values are strings or numbers
    pub fn from_json(text: &str) -> Result<Self> {
        let record: Self =
            serde_json::from_str(text).map_err(|e| eyre::eyre!("Invalid record JSON (flat object of strings/numbers expected): {}", e))?;
        Ok(record)
    }
}
