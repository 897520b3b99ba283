//! Error types for the component runtime.

use thiserror::Error;

// ============================================================================
// Error
// ============================================================================

/// Errors returned by component, reaction and loop operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{component} has no property `{name}`")]
    UnknownProperty { component: String, name: String },

    #[error("{component} has no action `{name}`")]
    UnknownAction { component: String, name: String },

    #[error("{component} has no emitter `{name}`")]
    UnknownEmitter { component: String, name: String },

    #[error("{component} has no member `{name}`")]
    UnknownMember { component: String, name: String },

    /// Property mutated outside an action or the owner's construction.
    #[error("cannot mutate `{name}` of {component}: properties can only be mutated by actions")]
    InvalidMutationContext { component: String, name: String },

    #[error("invalid value for property `{name}`: {reason}")]
    Validation { name: String, reason: String },

    #[error("invalid index {index} for {mutation} on `{name}`: {reason}")]
    InvalidIndex {
        name: String,
        mutation: &'static str,
        index: isize,
        reason: &'static str,
    },

    #[error("cannot {mutation} `{name}` in place: value is a {value_type}")]
    UnsupportedMutation {
        name: String,
        mutation: &'static str,
        value_type: &'static str,
    },

    #[error("invalid connection string `{input}`: {reason}")]
    InvalidConnectionString { input: String, reason: String },

    #[error("could not connect `{path}`: {reason}")]
    UnresolvableConnection { path: String, reason: String },

    #[error("cannot emit `{event_type}`: event types must not carry a label")]
    LabelledEmit { event_type: String },

    #[error("{what} has been disposed")]
    Disposed { what: String },

    #[error("the loop is already iterating")]
    ReentrantIter,

    #[error("invalid component type `{type_name}`: {reason}")]
    Schema { type_name: String, reason: String },

    /// Raised by user handlers.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Convenience for handlers that want to fail with a message.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    pub fn validation(name: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn disposed(what: impl Into<String>) -> Self {
        Error::Disposed { what: what.into() }
    }

    pub(crate) fn connection(input: &str, reason: impl Into<String>) -> Self {
        Error::InvalidConnectionString {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(type_name: &str, reason: impl Into<String>) -> Self {
        Error::Schema {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = Error::UnknownProperty {
            component: "Person1".into(),
            name: "foo".into(),
        };
        assert_eq!(err.to_string(), "Person1 has no property `foo`");

        let err = Error::validation("age", "must be >= 0");
        assert_eq!(err.to_string(), "invalid value for property `age`: must be >= 0");

        assert_eq!(Error::custom("boom").to_string(), "boom");
    }
}
