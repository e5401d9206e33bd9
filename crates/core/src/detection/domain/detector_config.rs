use serde_json::{Map, Value};

use crate::detection::domain::detection_error::CreationError;

/// Declarative detector description: `{ "type": ..., "settings": { ... } }`.
///
/// Read once during processor initialization, then discarded after the
/// detector pool is built.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    kind: String,
    settings: Settings,
}

impl DetectorConfig {
    pub fn new(kind: impl Into<String>, settings: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            settings: Settings::root(settings),
        }
    }

    /// Extracts the discriminator and the settings object from a parsed document.
    pub fn from_document(document: Value) -> Result<Self, CreationError> {
        let root = match document {
            Value::Object(map) => Settings::root(map),
            _ => {
                return Err(CreationError::WrongType {
                    key: "<root>".into(),
                    expected: "object",
                })
            }
        };
        let kind = root.string("type")?.to_owned();
        // Settings keys are reported relative to the settings object.
        let settings = match root.get("settings")? {
            Value::Object(map) => Settings::root(map.clone()),
            _ => return Err(root.wrong_type("settings", "object")),
        };
        Ok(Self { kind, settings })
    }

    /// The `type` discriminator.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Variant-specific settings bag with typed, key-checked accessors.
///
/// Numbers may be given as JSON numbers or as strings holding a number;
/// anything else is a type error. Nested objects keep a dotted key prefix so
/// errors point at the exact key.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    values: Map<String, Value>,
    prefix: String,
}

impl Settings {
    fn root(values: Map<String, Value>) -> Self {
        Self {
            values,
            prefix: String::new(),
        }
    }

    pub fn string(&self, key: &str) -> Result<&str, CreationError> {
        match self.get(key)? {
            Value::String(s) => Ok(s),
            _ => Err(self.wrong_type(key, "string")),
        }
    }

    pub fn integer(&self, key: &str) -> Result<i64, CreationError> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().ok_or_else(|| self.wrong_type(key, "integer")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| self.wrong_type(key, "integer")),
            _ => Err(self.wrong_type(key, "integer")),
        }
    }

    pub fn float(&self, key: &str) -> Result<f64, CreationError> {
        let value = match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.wrong_type(key, "float"))
    }

    pub fn object(&self, key: &str) -> Result<Settings, CreationError> {
        match self.get(key)? {
            Value::Object(map) => Ok(Settings {
                values: map.clone(),
                prefix: format!("{}{}.", self.prefix, key),
            }),
            _ => Err(self.wrong_type(key, "object")),
        }
    }

    /// Full dotted name of `key` for error reporting.
    pub fn key_path(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn get(&self, key: &str) -> Result<&Value, CreationError> {
        self.values
            .get(key)
            .ok_or_else(|| CreationError::MissingKey(self.key_path(key)))
    }

    fn wrong_type(&self, key: &str, expected: &'static str) -> CreationError {
        CreationError::WrongType {
            key: self.key_path(key),
            expected,
        }
    }
}
