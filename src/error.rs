use serde::{Deserialize, Serialize};

/// A struct that represents an error with a context and possibly the propagated source error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContextError {
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextError {
    /// Create a new `ContextError` with the given context.
    pub fn with_context<S: Into<String>>(context: S) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `ContextError` with the given context and source error.
    pub fn with_error<S: Into<String>>(context: S, error: &dyn std::error::Error) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }
}

/// The error taxonomy of the request pipeline. Every failure aborts the request which caused it
/// and is reported to the caller verbatim through the JSON error envelope: there is no local
/// recovery anywhere in the pipeline, so no failure can pass silently.
///
/// The only variant answered with a 400 status is `Validation`; every other variant signals a
/// failure of a downstream collaborator (the identity provider, the Graph drive, the PDF
/// construction) and is answered with a 500 status.
#[derive(Debug, Clone)]
pub enum ServiceError {
    /// The request is missing a required input or carries a malformed body.
    Validation(String),
    /// The identity provider rejected the credentials or answered with a malformed payload.
    Auth(ContextError),
    /// The drive rejected the PUT of the file contents.
    Upload(ContextError),
    /// The embedded canvas image could not be decoded from its base64 payload.
    ImageDecode(ContextError),
    /// The PDF document could not be constructed or serialized.
    Render(ContextError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Validation(message) => write!(formatter, "{}", message),
            ServiceError::Auth(error)
            | ServiceError::Upload(error)
            | ServiceError::ImageDecode(error)
            | ServiceError::Render(error) => write!(formatter, "{}", error),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}
