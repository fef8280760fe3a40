//! Structural validation of raw configuration documents
//!
//! Runs before anything else. Every document is checked against the bundled
//! JSON Schema and every violation is collected so the user sees the whole
//! list at once; a failed validation means no pipeline is built.

use crate::core::config::RawInput;
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

const CONFIGURATION_SCHEMA: &str = include_str!("../../schemas/configuration.schema.json");

/// Pattern of `definitions.absolutePath` in the schema
const ABSOLUTE_PATH_PATTERN: &str = r"^(?:/|[A-Za-z]:[\\/]|\\\\)";

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location, e.g. `configuration[1].output.path`
    pub path: String,
    pub message: String,
}

impl Violation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.message)
    }
}

/// Blocking list of violations found in the raw input
#[derive(Debug, Clone, Error)]
#[error("{}", render(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    let mut out = String::from(
        "Invalid configuration object. The configuration does not match the expected schema.",
    );
    for violation in violations {
        out.push_str("\n - ");
        out.push_str(&violation.to_string());
    }
    out
}

/// The compiled configuration schema, built on first use
fn validator() -> Result<&'static Validator, String> {
    static VALIDATOR: OnceLock<Result<Validator, String>> = OnceLock::new();

    VALIDATOR
        .get_or_init(|| {
            let schema: Value = serde_json::from_str(CONFIGURATION_SCHEMA)
                .map_err(|e| format!("configuration schema is not valid JSON: {}", e))?;
            jsonschema::validator_for(&schema)
                .map_err(|e| format!("configuration schema does not compile: {}", e))
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Validate every configuration in the input
pub fn validate(input: &RawInput) -> Result<(), ValidationError> {
    let validator = validator().map_err(|reason| ValidationError {
        violations: vec![Violation::new("configuration", reason)],
    })?;
    let mut violations = Vec::new();

    match input {
        RawInput::Single(config) => check_document(validator, "configuration", &config.document, &mut violations),
        RawInput::Multi(configs) => {
            if configs.is_empty() {
                violations.push(Violation::new("configuration", "should be a non-empty array."));
            }
            for (index, config) in configs.iter().enumerate() {
                let path = format!("configuration[{}]", index);
                check_document(validator, &path, &config.document, &mut violations);
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn check_document(validator: &Validator, prefix: &str, document: &Value, out: &mut Vec<Violation>) {
    for error in validator.iter_errors(document) {
        let path = location(prefix, &error.instance_path.to_string());
        let message = match &error.kind {
            ValidationErrorKind::Pattern { pattern } if pattern == ABSOLUTE_PATH_PATTERN => format!(
                "The provided value {} is not an absolute path!",
                error.instance
            ),
            _ => error.to_string(),
        };
        out.push(Violation::new(path, message));
    }
}

/// `/output/path` under `configuration[1]` becomes `configuration[1].output.path`
fn location(prefix: &str, pointer: &str) -> String {
    let mut path = prefix.to_string();
    for segment in pointer.split('/').skip(1) {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            path.push('[');
            path.push_str(segment);
            path.push(']');
        } else {
            path.push('.');
            path.push_str(&segment.replace("~1", "/").replace("~0", "~"));
        }
    }
    path
}
