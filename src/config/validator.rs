//! Rule-based validation of settings documents.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde_json::Value;

use super::{ConfigError, ConfigResult, ValidationErrors};

pub type ValidationFn = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }
}

/// Rules keyed by dot path. Rules are checked in key order so error lists
/// are stable.
#[derive(Default)]
pub struct ConfigValidator {
    required_keys: Vec<String>,
    type_rules: BTreeMap<String, ValueType>,
    range_rules: BTreeMap<String, RangeInclusive<i64>>,
    custom_rules: BTreeMap<String, ValidationFn>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, key: impl Into<String>) -> Self {
        self.required_keys.push(key.into());
        self
    }

    pub fn expect_type(mut self, key: impl Into<String>, value_type: ValueType) -> Self {
        self.type_rules.insert(key.into(), value_type);
        self
    }

    pub fn expect_range(mut self, key: impl Into<String>, range: RangeInclusive<i64>) -> Self {
        self.range_rules.insert(key.into(), range);
        self
    }

    pub fn custom<F>(mut self, key: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.custom_rules.insert(key.into(), Box::new(validator));
        self
    }

    pub fn validate(&self, config: &Value) -> ConfigResult<()> {
        let errors = self.collect_errors(config);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationErrors(ValidationErrors(errors)))
        }
    }

    pub fn collect_errors(&self, config: &Value) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for key in &self.required_keys {
            if get_nested(config, key).is_none() {
                errors.push(ConfigError::NotFound { key: key.clone() });
            }
        }

        for (key, expected) in &self.type_rules {
            if let Some(value) = get_nested(config, key)
                && !expected.matches(value)
            {
                errors.push(invalid(key, format!("expected {}", expected.name())));
            }
        }

        for (key, range) in &self.range_rules {
            let Some(value) = get_nested(config, key) else {
                continue;
            };
            match value.as_i64() {
                Some(num) if range.contains(&num) => {}
                Some(num) => errors.push(invalid(
                    key,
                    format!("value {} not in range {}..={}", num, range.start(), range.end()),
                )),
                None if value.is_number() => {
                    errors.push(invalid(key, "expected an integer".to_string()))
                }
                None => {}
            }
        }

        for (key, validator) in &self.custom_rules {
            if let Some(value) = get_nested(config, key)
                && let Err(message) = validator(value)
            {
                errors.push(invalid(key, message));
            }
        }

        errors
    }
}

fn invalid(key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    }
}

fn get_nested<'a>(config: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(config, |current, part| current.get(part))
        .filter(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_nested_keys() {
        let validator = ConfigValidator::new()
            .require("conversations.folder")
            .require("model");

        assert!(validator
            .validate(&json!({"conversations": {"folder": "AI Chats"}, "model": "m"}))
            .is_ok());
        assert!(validator
            .validate(&json!({"conversations": {}, "model": "m"}))
            .is_err());
    }

    #[test]
    fn test_type_and_range() {
        let validator = ConfigValidator::new()
            .expect_type("tags", ValueType::Array)
            .expect_range("autosave.interval_secs", 1..=3600);

        assert!(validator
            .validate(&json!({"tags": ["a"], "autosave": {"interval_secs": 30}}))
            .is_ok());

        let errors = validator
            .collect_errors(&json!({"tags": "a", "autosave": {"interval_secs": 0}}));
        assert_eq!(errors.len(), 2);

        let errors = validator.collect_errors(&json!({"autosave": {"interval_secs": 1.5}}));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_custom_rule() {
        let validator = ConfigValidator::new().custom("model", |v| match v.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err("model must be a non-empty string".to_string()),
        });

        assert!(validator.validate(&json!({"model": "claude"})).is_ok());
        let err = validator.validate(&json!({"model": " "})).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }
}
