//! Validated domain types.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error raised when a newtype rejects its input
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeValidationError {
    /// Temperature outside 0.0..=2.0 or not finite
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    Temperature(f32),
    /// Max tokens of zero or above the global ceiling
    #[error("max_tokens must be between 1 and {max}, got {value}")]
    MaxTokens {
        /// Rejected value
        value: u32,
        /// Upper bound
        max: u32,
    },
}

impl From<TypeValidationError> for GatewayError {
    fn from(err: TypeValidationError) -> Self {
        let (field, code) = match err {
            TypeValidationError::Temperature(_) => ("temperature", "invalid_temperature"),
            TypeValidationError::MaxTokens { .. } => ("max_tokens", "invalid_max_tokens"),
        };
        Self::validation(err.to_string(), Some(field.to_string()), code)
    }
}

/// Sampling temperature, 0.0 to 2.0 inclusive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Temperature(f32);

impl Temperature {
    /// Lowest accepted temperature
    pub const MIN: f32 = 0.0;
    /// Highest accepted temperature
    pub const MAX: f32 = 2.0;

    /// Validate and wrap a temperature
    pub fn new(value: f32) -> Result<Self, TypeValidationError> {
        if value.is_finite() && (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TypeValidationError::Temperature(value))
        }
    }

    /// Raw value
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self(0.7)
    }
}

impl TryFrom<f32> for Temperature {
    type Error = TypeValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(t: Temperature) -> Self {
        t.0
    }
}

/// Output token budget accepted at the gateway boundary.
///
/// Adapters clamp this further to their own vendor ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MaxTokens(u32);

impl MaxTokens {
    /// Largest budget any caller may ask for
    pub const MAX: u32 = 200_000;

    /// Validate and wrap a token budget
    pub fn new(value: u32) -> Result<Self, TypeValidationError> {
        if value == 0 || value > Self::MAX {
            Err(TypeValidationError::MaxTokens {
                value,
                max: Self::MAX,
            })
        } else {
            Ok(Self(value))
        }
    }

    /// Raw value
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Clamp to a provider ceiling
    #[must_use]
    pub fn clamp_to(self, ceiling: u32) -> Self {
        Self(self.0.min(ceiling.max(1)))
    }
}

impl Default for MaxTokens {
    fn default() -> Self {
        Self(1024)
    }
}

impl TryFrom<u32> for MaxTokens {
    type Error = TypeValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaxTokens> for u32 {
    fn from(t: MaxTokens) -> Self {
        t.0
    }
}

/// Identifier attached to every inbound generation call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow as str
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
