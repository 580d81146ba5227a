//! Uniform `{success, message}` result for the presentation layer.

use serde::{Deserialize, Serialize};

use crate::OncoError;

/// What the presentation layer shows after a mutating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<crate::Result<String>> for Outcome {
    fn from(result: crate::Result<String>) -> Self {
        match result {
            Ok(message) => Self::ok(message),
            Err(e) => Self::from(&e),
        }
    }
}

impl From<&OncoError> for Outcome {
    fn from(e: &OncoError) -> Self {
        Self::failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result() {
        let ok: Outcome = Ok::<_, OncoError>("Sign up successful!".to_string()).into();
        assert!(ok.success);
        assert_eq!(ok.message, "Sign up successful!");

        let err: Outcome = Err::<String, _>(OncoError::InvalidCredentials).into();
        assert!(!err.success);
        assert_eq!(err.message, "Invalid username or password.");
    }
}
