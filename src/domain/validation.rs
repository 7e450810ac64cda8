//! Post content validation.
//!
//! The rules applied to new posts are a policy object so deployments can
//! tighten or relax them without touching the mutation path.

use chirp_api_types::FieldErrors;

pub const DEFAULT_MIN_CONTENT_CHARS: usize = 1;
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 280;

/// Structured validation failure: field name to messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: FieldErrors,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &FieldErrors {
        &self.fields
    }

    pub fn into_fields(self) -> FieldErrors {
        self.fields
    }

    /// First message of the first rejected field, in field-name order.
    pub fn first_message(&self) -> Option<&str> {
        self.fields
            .values()
            .flat_map(|messages| messages.iter())
            .map(String::as_str)
            .next()
    }
}

impl From<FieldErrors> for ValidationErrors {
    fn from(fields: FieldErrors) -> Self {
        Self { fields }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Validates and normalizes the content of a new post.
pub trait ContentPolicy: Send + Sync {
    /// Returns the content to store, or the reasons it was rejected.
    fn validate(&self, content: &str) -> Result<String, ValidationErrors>;
}

/// Bounds the trimmed content length in characters.
#[derive(Debug, Clone, Copy)]
pub struct LengthPolicy {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CONTENT_CHARS,
            max_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

impl ContentPolicy for LengthPolicy {
    fn validate(&self, content: &str) -> Result<String, ValidationErrors> {
        let trimmed = content.trim();
        let chars = trimmed.chars().count();

        let mut errors = ValidationErrors::new();
        if chars < self.min_chars {
            errors.add(
                "content",
                format!("must contain at least {} character(s)", self.min_chars),
            );
        }
        if chars > self.max_chars {
            errors.add(
                "content",
                format!("must contain at most {} character(s)", self.max_chars),
            );
        }

        if errors.is_empty() {
            Ok(trimmed.to_string())
        } else {
            Err(errors)
        }
    }
}
