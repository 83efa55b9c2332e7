use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    UnknownBandBits(u32),
    UnknownBandName(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownBandBits(bits) => {
                write!(f, "unknown band bits: {bits:#x}")
            }
            ModelError::UnknownBandName(name) => {
                write!(f, "unknown band name: {name}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
