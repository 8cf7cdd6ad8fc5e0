use thiserror::Error;

/// Vector operations that have no meaningful answer for the given operands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// The operation needs a direction and the vector has none.
    #[error("cannot {operation} a zero-length vector")]
    ZeroLength { operation: &'static str },

    /// An operand or the result is NaN or infinite.
    #[error("non-finite value in {operation}")]
    NonFinite { operation: &'static str },
}

/// Errors surfaced by normalization and by the animation of a tree.
#[derive(Debug, Error)]
pub enum FractalError {
    /// Nothing to draw on, or nothing to draw.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// A numeric parameter that would never terminate or never draw.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidNumericConfig { field: String, reason: String },
}

impl FractalError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FractalError::InvalidNumericConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
