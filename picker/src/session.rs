use crate::PickerError;
use api_client::{ApiClient, ApiClientError, MediaPage};
use auth::{Authenticator, Credential};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// The next asynchronous operation the controller needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    ResolveCredential { force_login: bool },
    FetchPage { credential: Credential, after: Option<String> },
    Idle,
}

/// Result of running a [`Step`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    CredentialResolved(Result<Credential, PickerError>),
    PageLoaded(Result<MediaPage, ApiClientError>),
}

/// Network side of the picker: authentication and media fetches.
/// Cheap to clone so each step can own one.
#[derive(Clone)]
pub struct Session {
    authenticator: Arc<Authenticator>,
    api: ApiClient,
    page_size: u32,
}

impl Session {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        let api = ApiClient::with_base_url(String::new(), authenticator.graph_url().to_string());
        Self {
            authenticator,
            api,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// With `force_login` the cached credential is dropped and the user is
    /// sent through authorization again.
    pub async fn resolve_credential(&self, force_login: bool) -> Result<Credential, PickerError> {
        if force_login {
            if let Err(e) = self.authenticator.invalidate() {
                tracing::warn!(error = %e, "Failed to clear cached credential");
            }
            return self.authenticator.authorize().await.map_err(PickerError::from);
        }
        self.authenticator.ensure_credential().await.map_err(PickerError::from)
    }

    pub async fn fetch_page(&self, credential: &Credential, after: Option<&str>) -> Result<MediaPage, ApiClientError> {
        let mut api = self.api.clone();
        api.set_access_token(credential.access_token.clone());
        api.list_media(self.page_size, after).await
    }

    /// Run `step`; `None` for [`Step::Idle`].
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, step)))]
    pub async fn execute(&self, step: Step) -> Option<SessionEvent> {
        match step {
            Step::ResolveCredential { force_login } => {
                Some(SessionEvent::CredentialResolved(self.resolve_credential(force_login).await))
            }
            Step::FetchPage { credential, after } => {
                Some(SessionEvent::PageLoaded(self.fetch_page(&credential, after.as_deref()).await))
            }
            Step::Idle => None,
        }
    }
}
