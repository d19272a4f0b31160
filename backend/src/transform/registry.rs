//! Transform plugin registry
//!
//! Maps transform keywords to factories. The registry is built once at
//! startup and passed by reference to whoever parses pipeline options.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};

use super::builtin::{Combine, FilterFields, SelectField, Stats};
use super::histogram::{Histogram, HistogramOptions};
use super::{TransformStep, Transformer};

/// Builds a transformer from its JSON options.
pub type TransformFactory = Box<dyn Fn(&Value) -> ConfigResult<Box<dyn Transformer>> + Send + Sync>;

/// Keyword to factory lookup.
pub struct TransformRegistry {
    factories: IndexMap<String, TransformFactory>,
}

impl TransformRegistry {
    /// A registry without any transforms.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// A registry holding the built-in transforms.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("filter", decode_with::<FilterFields>("filter"));
        registry.register("select", decode_with::<SelectField>("select"));
        registry.register("combine", decode_with::<Combine>("combine"));
        registry.register("stats", decode_with::<Stats>("stats"));
        registry.register(
            "histogram",
            Box::new(|options: &Value| {
                let options: HistogramOptions = decode("histogram", options)?;
                let histogram = Histogram::try_from(options)?;
                Ok(Box::new(histogram) as Box<dyn Transformer>)
            }),
        );
        registry
    }

    /// Register (or replace) a transform keyword.
    pub fn register(&mut self, name: &str, factory: TransformFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered keywords in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the transformer described by `step`.
    pub fn build(&self, step: &TransformStep) -> ConfigResult<Box<dyn Transformer>> {
        let factory = self
            .factories
            .get(&step.name)
            .ok_or_else(|| ConfigError::UnknownTransform(step.name.clone()))?;
        factory(&Value::Object(step.options.clone()))
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn decode<T: DeserializeOwned>(name: &str, options: &Value) -> ConfigResult<T> {
    serde_json::from_value(options.clone()).map_err(|e| ConfigError::InvalidTransformOptions {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn decode_with<T>(name: &'static str) -> TransformFactory
where
    T: DeserializeOwned + Transformer + 'static,
{
    Box::new(move |options: &Value| {
        let transformer: T = decode(name, options)?;
        Ok(Box::new(transformer) as Box<dyn Transformer>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(value: Value) -> TransformStep {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_builtin_names() {
        let registry = TransformRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["filter", "select", "combine", "stats", "histogram"]
        );
    }

    #[test]
    fn test_build_known_transform() {
        let registry = TransformRegistry::builtin();
        let t = registry
            .build(&step(json!({"type": "filter", "fields": ["a"]})))
            .unwrap();
        assert_eq!(t.name(), "filter");
        assert_eq!(t.levels(), 1);
    }

    #[test]
    fn test_unknown_transform() {
        let registry = TransformRegistry::builtin();
        let err = registry.build(&step(json!({"type": "nope"}))).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownTransform(name) if name == "nope"));
    }

    #[test]
    fn test_invalid_options() {
        let registry = TransformRegistry::builtin();
        let err = registry
            .build(&step(json!({"type": "filter", "fields": 3})))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidTransformOptions { .. }));

        let err = registry
            .build(&step(json!({"type": "histogram", "bins": "weird"})))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidTransformOptions { .. }));
    }

    #[test]
    fn test_register_custom() {
        let mut registry = TransformRegistry::empty();
        registry.register("stats", decode_with::<Stats>("stats"));
        assert!(registry.contains("stats"));
        assert!(!registry.contains("filter"));
    }
}
