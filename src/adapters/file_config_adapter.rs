//! INI file configuration adapter.
//!
//! Section and key names keep their case, since trigger and action names
//! are taken from section names.

use crate::domain::error::TradetrigError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new_cs();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new_cs();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    /// Set or replace a single value.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.config
            .set(section, key, Some(value.trim().to_string()));
    }

    /// Apply a `section.key=value` override. The key is everything after
    /// the last dot, so `trigger.entry.buy.size=5` sets `size` in
    /// `[trigger.entry.buy]`.
    pub fn apply_override(&mut self, assignment: &str) -> Result<(), TradetrigError> {
        let invalid = |reason: &str| TradetrigError::ConfigInvalid {
            section: "override".to_string(),
            key: assignment.to_string(),
            reason: reason.to_string(),
        };
        let (path, value) = assignment
            .split_once('=')
            .ok_or_else(|| invalid("expected section.key=value"))?;
        let (section, key) = path
            .trim()
            .rsplit_once('.')
            .ok_or_else(|| invalid("expected section.key=value"))?;
        if section.is_empty() || key.is_empty() {
            return Err(invalid("section and key must be non-empty"));
        }
        self.set(section, key, value);
        Ok(())
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }

    /// Parse a present value with `parse`, or fall back to `default`.
    fn typed<T>(
        &self,
        section: &str,
        key: &str,
        default: T,
        expected: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, TradetrigError> {
        let Some(raw) = self.config.get(section, key) else {
            return Ok(default);
        };
        parse(raw.trim()).ok_or_else(|| TradetrigError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("expected {expected}, found '{raw}'"),
        })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, TradetrigError> {
        self.typed(section, key, default, "an integer", |v| v.parse().ok())
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, TradetrigError> {
        self.typed(section, key, default, "a number", |v| {
            v.parse::<f64>().ok().filter(|n| n.is_finite())
        })
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, TradetrigError> {
        self.typed(section, key, default, "true or false", Self::parse_bool)
    }

    fn sections(&self) -> Vec<String> {
        let mut sections = self.config.sections();
        sections.sort();
        sections
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(section)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}
