//! Minimal INI document with typed key suffixes.
//!
//! Keys ending in `<bool>` or `<time>` select how the value is encoded;
//! the suffix itself is not written to the file, so operators see plain
//! `running = True` style lines they can edit by hand.

use crate::utils::errors::{Result, SyncError};
use chrono::NaiveDateTime;

pub const TIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

const BOOL_SUFFIX: &str = "<bool>";
const TIME_SUFFIX: &str = "<time>";

/// A decoded run-log value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Bool(bool),
    Time(NaiveDateTime),
}

/// Split a typed key into its stored name.
pub fn stored_name(key: &str) -> &str {
    key.strip_suffix(BOOL_SUFFIX)
        .or_else(|| key.strip_suffix(TIME_SUFFIX))
        .unwrap_or(key)
}

pub fn encode(key: &str, value: &Value) -> (String, String) {
    let text = match value {
        Value::Text(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Time(t) => t.format(TIME_FORMAT).to_string(),
    };
    (stored_name(key).to_lowercase(), text)
}

/// Decode a stored value according to the suffix of `key`. Empty values
/// decode to `None`.
pub fn decode(key: &str, raw: &str) -> Result<Option<Value>> {
    if raw.is_empty() {
        return Ok(None);
    }
    if key.ends_with(BOOL_SUFFIX) {
        return Ok(Some(Value::Bool(raw.eq_ignore_ascii_case("true"))));
    }
    if key.ends_with(TIME_SUFFIX) {
        let t = NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
            .map_err(|e| SyncError::RunLog(format!("Invalid time '{}' for {}: {}", raw, key, e)))?;
        return Ok(Some(Value::Time(t)));
    }
    Ok(Some(Value::Text(raw.to_string())))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<Section>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Result<Self> {
        let mut doc = IniDocument::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                doc.section_mut(name.trim());
                continue;
            }

            let Some(pos) = line.find(['=', ':']) else {
                return Err(SyncError::RunLog(format!(
                    "Line {}: expected 'key = value', got '{}'",
                    idx + 1,
                    line
                )));
            };
            let Some(section) = doc.sections.last_mut() else {
                return Err(SyncError::RunLog(format!(
                    "Line {}: entry outside of any section",
                    idx + 1
                )));
            };
            let key = line[..pos].trim().to_lowercase();
            let value = line[pos + 1..].trim().to_string();
            set_entry(&mut section.entries, key, value);
        }

        Ok(doc)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&format!("[{}]\n", section.name));
            for (k, v) in &section.entries {
                out.push_str(&format!("{} = {}\n", k, v));
            }
            out.push('\n');
        }
        out
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// Read a typed key from `section`.
    pub fn get(&self, section: &str, key: &str) -> Result<Option<Value>> {
        let stored = stored_name(key).to_lowercase();
        let raw = self
            .sections
            .iter()
            .find(|s| s.name == section)
            .and_then(|s| s.entries.iter().find(|(k, _)| *k == stored))
            .map(|(_, v)| v.as_str());
        match raw {
            Some(raw) => decode(key, raw),
            None => Ok(None),
        }
    }

    /// Write a typed key into `section`, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: &Value) {
        let (name, text) = encode(key, value);
        let section = self.section_mut(section);
        set_entry(&mut section.entries, name, text);
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }
}

fn set_entry(entries: &mut Vec<(String, String)>, key: String, value: String) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}
