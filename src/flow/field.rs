//! Field descriptions and validators

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of validating one raw input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    /// Rejected; `reason_key` overrides the field's invalid-value text
    Invalid {
        reason_key: Option<String>,
        args: Vec<String>,
    },
}

impl Validation {
    pub fn invalid() -> Self {
        Validation::Invalid {
            reason_key: None,
            args: Vec::new(),
        }
    }

    pub fn invalid_because(reason_key: impl Into<String>, args: Vec<String>) -> Self {
        Validation::Invalid {
            reason_key: Some(reason_key.into()),
            args,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }
}

impl From<bool> for Validation {
    fn from(valid: bool) -> Self {
        if valid {
            Validation::Valid
        } else {
            Validation::invalid()
        }
    }
}

/// Values accepted so far in a flow, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldValues(BTreeMap<String, String>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Checks one raw input against the values accepted earlier in the flow
pub trait Validator: Send + Sync {
    fn validate(&self, input: &str, context: &FieldValues) -> Validation;
}

impl<F> Validator for F
where
    F: Fn(&str, &FieldValues) -> Validation + Send + Sync,
{
    fn validate(&self, input: &str, context: &FieldValues) -> Validation {
        self(input, context)
    }
}

/// Adapts a plain yes/no check into a [`Validator`]
pub struct Predicate<F>(F);

impl<F> Validator for Predicate<F>
where
    F: Fn(&str, &FieldValues) -> bool + Send + Sync,
{
    fn validate(&self, input: &str, context: &FieldValues) -> Validation {
        (self.0)(input, context).into()
    }
}

pub fn predicate<F>(check: F) -> Predicate<F>
where
    F: Fn(&str, &FieldValues) -> bool + Send + Sync,
{
    Predicate(check)
}

/// One field of a flow: where its value goes and how it is asked for
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub prompt_key: String,
    pub prompt_args: Vec<String>,
    pub invalid_key: String,
    pub validator: Arc<dyn Validator>,
}

impl FieldSpec {
    /// Field accepting any non-blank text
    pub fn new(name: impl Into<String>, prompt_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt_key: prompt_key.into(),
            prompt_args: Vec::new(),
            invalid_key: "invalid_value".to_string(),
            validator: Arc::new(predicate(|input: &str, _: &FieldValues| {
                !input.is_empty()
            })),
        }
    }

    #[must_use]
    pub fn prompt_args(mut self, args: Vec<String>) -> Self {
        self.prompt_args = args;
        self
    }

    #[must_use]
    pub fn invalid_key(mut self, key: impl Into<String>) -> Self {
        self.invalid_key = key.into();
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Validate trimmed input; returns the value to store when accepted
    pub fn check(&self, raw: &str, context: &FieldValues) -> Result<String, Validation> {
        let input = raw.trim();
        match self.validator.validate(input, context) {
            Validation::Valid => Ok(input.to_string()),
            invalid @ Validation::Invalid { .. } => Err(invalid),
        }
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("prompt_key", &self.prompt_key)
            .field("invalid_key", &self.invalid_key)
            .finish_non_exhaustive()
    }
}
