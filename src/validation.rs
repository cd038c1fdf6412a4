//! Validation outcome aggregation.
//!
//! Checks append messages to a [`ValidationResult`] instead of failing
//! one at a time; results from independent sources (field checks, object
//! checks, extension hooks) fold together with
//! [`combine_and`](ValidationResult::combine_and) without re-running any
//! check. A terminal validation step turns an invalid result into
//! [`OrmError::Validation`](crate::error::OrmError::Validation).

use std::fmt;

use crate::error::OrmError;

/// How severe a validation message is. Only `Error` affects validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// One validation message, optionally tied to a field and carrying a
/// symbolic dedup code.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationMessage {
    pub message: String,
    pub field: Option<String>,
    pub severity: Severity,
    pub code: Option<String>,
}

/// The aggregated outcome of a validation run.
///
/// Starts valid; registering an error-severity message flips it invalid
/// for the rest of its lifetime. No message ever un-registers.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    valid: bool,
    messages: Vec<ValidationMessage>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        ValidationResult {
            valid: true,
            messages: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn messages(&self) -> &[ValidationMessage] {
        &self.messages
    }

    /// Register an error-severity message, marking the result invalid.
    pub fn add_error(&mut self, message: impl Into<String>) -> &mut Self {
        // infallible: no code to validate
        let _ = self.add_message(message, Severity::Error, None);
        self
    }

    /// Register an error-severity message against one field.
    pub fn add_field_error(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        let _ = self.add_field_message(field, message, Severity::Error, None);
        self
    }

    /// Register a message with an explicit severity and optional dedup
    /// code.
    ///
    /// A message whose code matches an already-registered one replaces
    /// that message in place rather than appending. Codes must be
    /// symbolic: a strictly numeric code is rejected with an argument
    /// error, since it usually means the caller passed a count or index
    /// by mistake.
    pub fn add_message(
        &mut self,
        message: impl Into<String>,
        severity: Severity,
        code: Option<&str>,
    ) -> Result<&mut Self, OrmError> {
        self.push(ValidationMessage {
            message: message.into(),
            field: None,
            severity,
            code: Self::check_code(code)?,
        });
        Ok(self)
    }

    /// Like [`add_message`](Self::add_message), tied to one field.
    pub fn add_field_message(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        code: Option<&str>,
    ) -> Result<&mut Self, OrmError> {
        self.push(ValidationMessage {
            message: message.into(),
            field: Some(field.into()),
            severity,
            code: Self::check_code(code)?,
        });
        Ok(self)
    }

    fn check_code(code: Option<&str>) -> Result<Option<String>, OrmError> {
        match code {
            Some(c) if c.parse::<i64>().is_ok() => Err(OrmError::usage(format!(
                "message code '{c}' is numeric; codes must be symbolic"
            ))),
            Some(c) => Ok(Some(c.to_string())),
            None => Ok(None),
        }
    }

    fn push(&mut self, message: ValidationMessage) {
        if message.severity == Severity::Error {
            self.valid = false;
        }
        if let Some(code) = &message.code {
            if let Some(slot) = self
                .messages
                .iter_mut()
                .find(|m| m.code.as_deref() == Some(code))
            {
                *slot = message;
                return;
            }
        }
        self.messages.push(message);
    }

    /// Fold another result into this one: validity becomes the AND of
    /// both, messages concatenate with this result's first, each
    /// operand's internal order preserved.
    pub fn combine_and(&mut self, other: &ValidationResult) -> &mut Self {
        self.valid = self.valid && other.valid;
        self.messages.extend(other.messages.iter().cloned());
        self
    }

    /// One-line description for logs and error display.
    pub fn summary(&self) -> String {
        let errors = self
            .messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .count();
        match self.messages.iter().find(|m| m.severity == Severity::Error) {
            Some(first) => format!(
                "{errors} error(s), first: {}",
                first
                    .field
                    .as_ref()
                    .map(|f| format!("[{f}] {}", first.message))
                    .unwrap_or_else(|| first.message.clone())
            ),
            None => format!("{} message(s), no errors", self.messages.len()),
        }
    }

    /// `Ok(())` when valid, otherwise an [`OrmError::Validation`]
    /// carrying this result.
    pub fn into_result(self) -> Result<(), OrmError> {
        if self.valid {
            Ok(())
        } else {
            Err(OrmError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
