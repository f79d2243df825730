//! Error taxonomy for catalog construction and policy operations.
//!
//! Load-time problems are `Definition` errors and abort the whole catalog
//! build; per-policy operation errors return to the caller without touching
//! catalog state. Every variant carries enough context (file path, prefixed
//! name, element id, offending token) to diagnose a failure from the message
//! alone.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("definition error in {source_name}: {message}")]
    Definition {
        source_name: String,
        message: String,
    },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("policy {policy}: element '{element}' is required but no value was supplied")]
    MissingValue { policy: String, element: String },

    #[error("element '{element}': expected {expected}, got '{token}'")]
    TypeMismatch {
        element: String,
        expected: String,
        token: String,
    },

    #[error("element '{element}': value {value} outside range {min}..={max}")]
    Range {
        element: String,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("element '{element}': unknown item '{item}'")]
    UnknownItem { element: String, item: String },

    #[error("policy {policy}: cannot {operation} while {state}")]
    InvalidState {
        policy: String,
        operation: String,
        state: String,
    },

    #[error("store rejected staged batch: {0}")]
    Transaction(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PolicyError {
    pub fn definition(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Definition {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn missing_value(policy: impl Into<String>, element: impl Into<String>) -> Self {
        Self::MissingValue {
            policy: policy.into(),
            element: element.into(),
        }
    }

    pub fn type_mismatch(
        element: impl Into<String>,
        expected: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            element: element.into(),
            expected: expected.into(),
            token: token.into(),
        }
    }

    pub fn range(element: impl Into<String>, value: u64, min: u64, max: u64) -> Self {
        Self::Range {
            element: element.into(),
            value,
            min,
            max,
        }
    }

    pub fn unknown_item(element: impl Into<String>, item: impl Into<String>) -> Self {
        Self::UnknownItem {
            element: element.into(),
            item: item.into(),
        }
    }

    pub fn invalid_state(
        policy: impl Into<String>,
        operation: impl Into<String>,
        state: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidState {
            policy: policy.into(),
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// True for errors caused by the loaded definition files rather than by
    /// caller input or the store.
    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Definition { .. })
    }
}

/// What a `NotFound` error failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Policy,
    Category,
    Namespace,
    SupportedOn,
    Element,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy => write!(f, "policy"),
            Self::Category => write!(f, "category"),
            Self::Namespace => write!(f, "namespace"),
            Self::SupportedOn => write!(f, "supported-on definition"),
            Self::Element => write!(f, "element"),
        }
    }
}

/// Transport failure reported by a store collaborator. The state machine maps
/// read failures to `PolicyState::Unknown` and apply failures to
/// `PolicyError::Transaction`; nothing in between inspects the message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
