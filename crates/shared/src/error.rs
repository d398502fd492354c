use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("invalid {kind} value '{value}': {reason}")]
    InvalidValue {
        kind: &'static str,
        value: String,
        reason: String,
    },
}

impl ParseError {
    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }

    pub fn invalid(kind: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            kind,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
