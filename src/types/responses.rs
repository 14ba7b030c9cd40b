use serde::{Deserialize, Serialize};

use crate::error::SmsError;

/// Outcome of a bulk maintenance operation (archive, delete, mark-read).
///
/// These operations never return `Err`: failures are captured here with a
/// message the UI can show in a dismissible banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ActionOutcome<T> {
    #[serde(rename = "success")]
    Success { data: T },
    #[serde(rename = "error")]
    Error { message: String, code: Option<String> },
}

impl<T> ActionOutcome<T> {
    pub fn success(data: T) -> Self {
        ActionOutcome::Success { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ActionOutcome::Error {
            message: message.into(),
            code: None,
        }
    }

    pub fn error_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        ActionOutcome::Error {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ActionOutcome::Success { .. } => None,
            ActionOutcome::Error { message, .. } => Some(message),
        }
    }
}

impl<T> From<crate::error::Result<T>> for ActionOutcome<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(data) => ActionOutcome::success(data),
            Err(e) => e.into(),
        }
    }
}

impl<T> From<SmsError> for ActionOutcome<T> {
    fn from(err: SmsError) -> Self {
        ActionOutcome::error_with_code(err.to_string(), err.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let ok: ActionOutcome<usize> = ActionOutcome::success(3);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"], 3);

        let failed: ActionOutcome<usize> = SmsError::Provider("busy".to_string()).into();
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Provider error: busy");
        assert_eq!(json["code"], "provider");
        assert_eq!(failed.error_message(), Some("Provider error: busy"));
    }
}
