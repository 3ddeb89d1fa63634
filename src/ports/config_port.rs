//! Configuration access port.

use crate::domain::error::TradetrigError;

/// Typed getters return `default` when the key is absent and
/// `ConfigInvalid` when it is present but does not parse.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, TradetrigError>;
    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, TradetrigError>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, TradetrigError>;
    /// Section names, sorted.
    fn sections(&self) -> Vec<String>;
    /// Keys present in `section`, sorted. Empty if the section is absent.
    fn keys(&self, section: &str) -> Vec<String>;
}
