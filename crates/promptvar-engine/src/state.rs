//! Per-variable editing state and validation rules.

use regex::Regex;
use serde::Serialize;

use promptvar_core::{TemplateVariable, ValidationError, ValidationErrorKind};

/// Where a variable is in its editing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VariableStatus {
    /// Untouched since load or reset; the default or initial value applies.
    Clean,
    /// Edited and passing validation.
    Valid,
    /// Edited and failing validation.
    Invalid,
}

/// Editing state of one template variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateVariableState {
    /// Current text value.
    pub value: String,
    /// Set once the value has been edited.
    pub is_dirty: bool,
    /// Whether the current value satisfies the rules.
    pub is_valid: bool,
    /// Failures from the last validation.
    pub errors: Vec<ValidationError>,
}

impl TemplateVariableState {
    /// Clean state for `variable`, using `initial` over the parsed default.
    pub fn clean(variable: &TemplateVariable, initial: Option<&str>) -> Self {
        let value = initial
            .unwrap_or_else(|| variable.default_or_empty())
            .to_string();
        Self {
            is_valid: !variable.is_required || !value.trim().is_empty(),
            value,
            is_dirty: false,
            errors: Vec::new(),
        }
    }

    /// Lifecycle status.
    pub fn status(&self) -> VariableStatus {
        match (self.is_dirty, self.is_valid) {
            (false, _) => VariableStatus::Clean,
            (true, true) => VariableStatus::Valid,
            (true, false) => VariableStatus::Invalid,
        }
    }
}

/// Optional constraints on a variable's value.
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    /// Minimum length in characters.
    pub min_length: Option<usize>,
    /// Maximum length in characters.
    pub max_length: Option<usize>,
    /// Pattern the whole value must match.
    pub pattern: Option<Regex>,
}

impl ValidationRules {
    /// No constraints beyond required-ness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require at least `min` characters.
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Allow at most `max` characters.
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Require the value to match `pattern`.
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Check `value` against required-ness and these rules.
    ///
    /// An empty optional value passes without consulting the other rules.
    pub fn validate(&self, variable: &TemplateVariable, value: &str) -> Vec<ValidationError> {
        let name = &variable.name;
        if value.trim().is_empty() {
            if variable.is_required {
                return vec![ValidationError::new(
                    ValidationErrorKind::Required,
                    format!("{name} is required"),
                )];
            }
            return Vec::new();
        }

        let mut errors = Vec::new();
        let length = value.chars().count();
        if let Some(min) = self.min_length.filter(|min| length < *min) {
            errors.push(ValidationError::new(
                ValidationErrorKind::MinLength,
                format!("{name} must be at least {min} characters"),
            ));
        }
        if let Some(max) = self.max_length.filter(|max| length > *max) {
            errors.push(ValidationError::new(
                ValidationErrorKind::MaxLength,
                format!("{name} must be at most {max} characters"),
            ));
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(value) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::Pattern,
                    format!("{name} must match {}", pattern.as_str()),
                ));
            }
        }
        errors
    }
}
