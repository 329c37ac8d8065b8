//! Picker controller for choosing images from an Instagram library.
//!
//! The controller owns the picker's state, the displayed media and the
//! selection. It never performs I/O itself: every operation returns a
//! [`Step`] that a driver runs through [`Session::execute`], feeding the
//! resulting [`SessionEvent`] back into [`PickerController::handle`]. The
//! iced front end drives it through `Command`s, headless hosts through
//! [`PickerController::drive`].

mod controller;
mod delegate;
mod selection;
mod session;

pub use api_client::{MediaItem, MediaPage, MediaType};
pub use auth::Credential;
pub use controller::{PickerController, PickerState};
pub use delegate::{OutcomeDelegate, PickerDelegate, PickerOutcome};
pub use selection::Selection;
pub use session::{Session, SessionEvent, Step, DEFAULT_PAGE_SIZE};

use api_client::ApiClientError;
use auth::AuthError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PickerError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Instagram API error: {0}")]
    Api(String),
    #[error("Access token rejected: {0}")]
    Unauthorized(String),
}

impl From<AuthError> for PickerError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Denied(msg) => PickerError::AuthorizationDenied(msg),
            other => PickerError::Auth(other.to_string()),
        }
    }
}

impl From<ApiClientError> for PickerError {
    fn from(e: ApiClientError) -> Self {
        match e {
            ApiClientError::RequestError(msg) => PickerError::Network(msg),
            ApiClientError::Unauthorized(msg) => PickerError::Unauthorized(msg),
            ApiClientError::InstagramApiError(msg) | ApiClientError::Other(msg) => PickerError::Api(msg),
        }
    }
}
