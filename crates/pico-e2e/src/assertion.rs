//! Assertion results: expected vs actual, recorded per check

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::E2eError;

/// Outcome of a single check inside a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub description: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
}

impl AssertionResult {
    /// `actual == expected`
    pub fn equals<T: PartialEq + Debug>(description: &str, expected: T, actual: T) -> Self {
        Self {
            description: description.to_string(),
            passed: expected == actual,
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// `after != before`
    pub fn differs<T: PartialEq + Debug>(description: &str, before: T, after: T) -> Self {
        Self {
            description: description.to_string(),
            passed: before != after,
            expected: format!("anything but {:?}", before),
            actual: format!("{:?}", after),
        }
    }

    /// Non-empty once surrounding whitespace is removed
    pub fn non_empty(description: &str, actual: &str) -> Self {
        Self {
            description: description.to_string(),
            passed: !actual.trim().is_empty(),
            expected: "non-empty text".to_string(),
            actual: format!("{:?}", actual),
        }
    }

    /// `actual` parses as JSON
    pub fn parses_as_json(description: &str, actual: &str) -> Self {
        let (passed, detail) = match serde_json::from_str::<serde_json::Value>(actual) {
            Ok(_) => (true, "valid JSON".to_string()),
            Err(e) => (false, format!("invalid JSON: {}", e)),
        };
        Self {
            description: description.to_string(),
            passed,
            expected: "valid JSON".to_string(),
            actual: detail,
        }
    }

    /// `actual` parses as a JSON object
    pub fn json_object(description: &str, actual: &str) -> Self {
        let kind = match serde_json::from_str::<serde_json::Value>(actual) {
            Ok(serde_json::Value::Object(_)) => "object",
            Ok(serde_json::Value::Array(_)) => "array",
            Ok(serde_json::Value::Null) => "null",
            Ok(_) => "scalar",
            Err(_) => "invalid JSON",
        };
        Self {
            description: description.to_string(),
            passed: kind == "object",
            expected: "object".to_string(),
            actual: kind.to_string(),
        }
    }

    /// Convert a failed result into an error
    pub fn into_error(self) -> Option<E2eError> {
        (!self.passed).then(|| E2eError::AssertionFailed {
            description: self.description,
            expected: self.expected,
            actual: self.actual,
        })
    }
}
