//! Opaque per-processor configuration surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration handed to a processor at construction time.
///
/// `options` is intentionally opaque to the runtime core: concrete processor
/// implementations interpret it however they need (a source reads a file path
/// out of it, a transform reads a field name, and so on). The graph itself
/// only ever looks at `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessorConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Value,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            name: None,
            options: Value::Null,
        }
    }
}

impl ProcessorConfig {
    /// A config with just a name, no options.
    pub fn named(name: impl Into<String>) -> Self {
        ProcessorConfig {
            name: Some(name.into()),
            options: Value::Null,
        }
    }

    /// A config carrying an options payload but no explicit name.
    pub fn with_options(options: Value) -> Self {
        ProcessorConfig {
            name: None,
            options,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// The effective processor name: the configured name, or the processor's
    /// type name if none was given.
    pub fn resolve_name(&self, type_name: &str) -> String {
        self.name.clone().unwrap_or_else(|| type_name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_name_and_null_options() {
        let cfg = ProcessorConfig::default();
        assert_eq!(cfg.name, None);
        assert_eq!(cfg.options, Value::Null);
    }

    #[test]
    fn resolve_name_falls_back_to_type_name() {
        let cfg = ProcessorConfig::default();
        assert_eq!(cfg.resolve_name("tweet_extractor"), "tweet_extractor");

        let cfg = ProcessorConfig::named("tweets-1");
        assert_eq!(cfg.resolve_name("tweet_extractor"), "tweets-1");
    }

    #[test]
    fn builder_methods_chain() {
        let cfg = ProcessorConfig::default()
            .name("x")
            .options(serde_json::json!({"k": 1}));
        assert_eq!(cfg.name.as_deref(), Some("x"));
        assert_eq!(cfg.options["k"], 1);
    }
}
