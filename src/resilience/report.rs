//! Error reports.
//!
//! Failures of arbitrary shape are flattened into an [`ErrorReport`] before
//! they reach retry state or the degradation controller: a required message
//! plus an optional structured cause.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Value>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Value) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Capture an error's display text, keeping its source chain as the cause.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(inner) = source {
            chain.push(Value::String(inner.to_string()));
            source = inner.source();
        }

        let report = Self::new(error.to_string());
        if chain.is_empty() {
            report
        } else {
            report.with_cause(Value::Array(chain))
        }
    }

    /// Capture anything printable; used where the failure type is not an `Error`.
    pub fn from_display<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Self::new(error.to_string())
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&str> for ErrorReport {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ErrorReport {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
