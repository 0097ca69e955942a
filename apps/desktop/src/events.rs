//! Mapping of session failures to user-facing terminal messages.

use client_core::SessionError;
use shared::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
}

pub fn classify(error: &SessionError) -> UiErrorCategory {
    match error {
        SessionError::NotSignedIn => UiErrorCategory::Auth,
        SessionError::EmptyPost => UiErrorCategory::Validation,
        SessionError::Auth(exception) => match exception.code {
            ErrorCode::Unauthorized | ErrorCode::InvalidCredentials => UiErrorCategory::Auth,
            ErrorCode::EmailTaken | ErrorCode::Validation => UiErrorCategory::Validation,
            ErrorCode::NotFound | ErrorCode::Internal => UiErrorCategory::Transport,
        },
        SessionError::Store(_) | SessionError::Subscribe(_) => UiErrorCategory::Transport,
    }
}

pub fn describe(error: &SessionError) -> String {
    match classify(error) {
        UiErrorCategory::Auth => format!("Sign-in problem: {error}"),
        UiErrorCategory::Validation => error.to_string(),
        UiErrorCategory::Transport => {
            format!("Service unreachable or rejected the request: {error}")
        }
    }
}

/// Auth-classified failures send the user back to the sign-in form.
pub fn requires_reauth(error: &SessionError) -> bool {
    classify(error) == UiErrorCategory::Auth
}
