use crate::{PickerDelegate, PickerError, Selection, Session, SessionEvent, Step};
use api_client::{ApiClientError, MediaItem, MediaPage};
use auth::Credential;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum PickerState {
    Idle,
    Authorizing,
    Loading,
    Ready,
    Finished,
    Cancelled,
    Failed(PickerError),
}

impl PickerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PickerState::Finished | PickerState::Cancelled | PickerState::Failed(_))
    }
}

pub struct PickerController {
    session: Session,
    delegate: Arc<dyn PickerDelegate>,
    state: PickerState,
    media: Vec<MediaItem>,
    seen: HashSet<String>,
    selection: Selection,
    credential: Option<Credential>,
    next_cursor: Option<String>,
    requested_after: Option<String>,
    reauthorized: bool,
}

impl PickerController {
    pub fn new(session: Session, delegate: Arc<dyn PickerDelegate>) -> Self {
        Self {
            session,
            delegate,
            state: PickerState::Idle,
            media: Vec::new(),
            seen: HashSet::new(),
            selection: Selection::new(),
            credential: None,
            next_cursor: None,
            requested_after: None,
            reauthorized: false,
        }
    }

    pub fn with_selection(mut self, items: Vec<MediaItem>) -> Self {
        self.selection.replace(items);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> &PickerState {
        &self.state
    }

    /// Media that passed the delegate's display filter, in fetch order.
    pub fn media(&self) -> &[MediaItem] {
        &self.media
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn selected(&self) -> &[MediaItem] {
        self.selection.items()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    /// Replace the selection. Items need not be among the fetched media.
    pub fn set_selected(&mut self, items: Vec<MediaItem>) {
        self.selection.replace(items);
    }

    /// Begin the session. Only valid once.
    pub fn start(&mut self) -> Step {
        if self.state != PickerState::Idle {
            return Step::Idle;
        }
        tracing::info!("Starting Instagram picker session");
        self.state = PickerState::Authorizing;
        Step::ResolveCredential { force_login: false }
    }

    /// Request the next page, if there is one and nothing is in flight.
    pub fn load_more(&mut self) -> Step {
        if self.state != PickerState::Ready {
            return Step::Idle;
        }
        match (&self.credential, &self.next_cursor) {
            (Some(credential), Some(cursor)) => {
                let step = Step::FetchPage {
                    credential: credential.clone(),
                    after: Some(cursor.clone()),
                };
                self.requested_after = Some(cursor.clone());
                self.state = PickerState::Loading;
                step
            }
            _ => Step::Idle,
        }
    }

    /// Feed the result of a [`Step`] back in and get the next one.
    pub fn handle(&mut self, event: SessionEvent) -> Step {
        if self.state.is_terminal() {
            tracing::debug!("Ignoring session event after picker closed");
            return Step::Idle;
        }
        match event {
            SessionEvent::CredentialResolved(result) => self.on_credential(result),
            SessionEvent::PageLoaded(result) => self.on_page(result),
        }
    }

    fn on_credential(&mut self, result: Result<Credential, PickerError>) -> Step {
        if self.state != PickerState::Authorizing {
            tracing::warn!(state = ?self.state, "Unexpected credential");
            return Step::Idle;
        }
        match result {
            Ok(credential) => {
                self.credential = Some(credential.clone());
                self.state = PickerState::Loading;
                Step::FetchPage {
                    credential,
                    after: self.requested_after.clone(),
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_page(&mut self, result: Result<MediaPage, ApiClientError>) -> Step {
        if self.state != PickerState::Loading {
            tracing::warn!(state = ?self.state, "Unexpected media page");
            return Step::Idle;
        }
        match result {
            Ok(page) => {
                self.reauthorized = false;
                let added = self.append(page.items);
                self.next_cursor = page.next_cursor;
                tracing::info!(added, total = self.media.len(), more = self.has_more(), "Media page loaded");

                // A page the display filter emptied would leave the grid stuck.
                if added == 0 && self.next_cursor.is_some() {
                    self.state = PickerState::Ready;
                    return self.load_more();
                }
                self.state = PickerState::Ready;
                Step::Idle
            }
            Err(ApiClientError::Unauthorized(msg)) if !self.reauthorized => {
                tracing::warn!("Access token rejected ({}), re-authorizing", msg);
                self.reauthorized = true;
                self.credential = None;
                self.state = PickerState::Authorizing;
                Step::ResolveCredential { force_login: true }
            }
            Err(e) => self.fail(e.into()),
        }
    }

    fn append(&mut self, items: Vec<MediaItem>) -> usize {
        let mut added = 0;
        for item in items {
            if self.seen.contains(&item.id) || !self.delegate.should_display(&item) {
                continue;
            }
            self.seen.insert(item.id.clone());
            self.media.push(item);
            added += 1;
        }
        added
    }

    fn fail(&mut self, error: PickerError) -> Step {
        tracing::error!(error = %error, "Instagram picker failed");
        self.state = PickerState::Failed(error.clone());
        self.delegate.did_fail(&error);
        Step::Idle
    }

    /// Flip the selection state of the item with `id`. Returns whether the
    /// item is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.state.is_terminal() {
            return self.selection.contains(id);
        }
        if self.selection.remove(id).is_some() {
            return false;
        }
        let item = match self.media.iter().find(|m| m.id == id) {
            Some(item) => item.clone(),
            None => {
                tracing::warn!(id, "Toggle for unknown media item");
                return false;
            }
        };
        if !self.delegate.should_select(&item) {
            return false;
        }
        self.delegate.did_select(&item);
        self.selection.insert(item);
        true
    }

    /// Confirm the selection.
    pub fn finish(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!(count = self.selection.len(), "Picker finished");
        self.state = PickerState::Finished;
        self.delegate.did_finish_picking(self.selection.items());
    }

    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!("Picker cancelled");
        self.state = PickerState::Cancelled;
        self.delegate.did_cancel();
    }

    /// Run steps until the controller has nothing left to do.
    pub async fn drive(&mut self, mut step: Step) {
        let session = self.session.clone();
        while let Some(event) = session.execute(step).await {
            step = self.handle(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::MediaType;
    use auth::{Authenticator, MemoryStore, OAuthConfig};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        veto: Option<&'static str>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl PickerDelegate for Recorder {
        fn did_fail(&self, error: &PickerError) {
            self.events.lock().unwrap().push(format!("fail:{}", error));
        }
        fn did_finish_picking(&self, items: &[MediaItem]) {
            let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
            self.events.lock().unwrap().push(format!("finish:{}", ids.join(",")));
        }
        fn did_cancel(&self) {
            self.events.lock().unwrap().push("cancel".into());
        }
        fn did_select(&self, item: &MediaItem) {
            self.events.lock().unwrap().push(format!("select:{}", item.id));
        }
        fn should_select(&self, item: &MediaItem) -> bool {
            self.veto != Some(item.id.as_str())
        }
    }

    fn item(id: &str, media_type: MediaType) -> MediaItem {
        MediaItem {
            id: id.into(),
            media_type,
            media_url: Some(format!("https://cdn.example.com/{}", id)),
            thumbnail_url: None,
            caption: None,
            permalink: None,
            timestamp: None,
            username: None,
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> MediaPage {
        MediaPage {
            items: ids.iter().map(|id| item(id, MediaType::Image)).collect(),
            next_cursor: next.map(str::to_string),
        }
    }

    fn controller(delegate: Arc<Recorder>) -> PickerController {
        let config = OAuthConfig::new("id", "secret", "http://127.0.0.1:1/cb");
        let auth = Arc::new(Authenticator::new(config, Arc::new(MemoryStore::new())));
        PickerController::new(Session::new(auth), delegate)
    }

    fn ready(delegate: Arc<Recorder>, first: MediaPage) -> PickerController {
        let mut c = controller(delegate);
        c.start();
        c.handle(SessionEvent::CredentialResolved(Ok(Credential::new("tok", None))));
        c.handle(SessionEvent::PageLoaded(Ok(first)));
        c
    }

    #[test]
    fn test_start_resolves_then_fetches_first_page() {
        let mut c = controller(Arc::new(Recorder::default()));
        assert_eq!(c.start(), Step::ResolveCredential { force_login: false });
        assert_eq!(c.start(), Step::Idle);
        let cred = Credential::new("tok", None);
        let step = c.handle(SessionEvent::CredentialResolved(Ok(cred.clone())));
        assert_eq!(step, Step::FetchPage { credential: cred, after: None });
        assert_eq!(c.state(), &PickerState::Loading);
    }

    #[test]
    fn test_pages_append_and_paginate() {
        let mut c = ready(Arc::new(Recorder::default()), page(&["1", "2"], Some("c1")));
        assert_eq!(c.state(), &PickerState::Ready);
        assert!(c.has_more());
        match c.load_more() {
            Step::FetchPage { after, .. } => assert_eq!(after.as_deref(), Some("c1")),
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(c.load_more(), Step::Idle);
        c.handle(SessionEvent::PageLoaded(Ok(page(&["2", "3"], None))));
        let ids: Vec<&str> = c.media().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(!c.has_more());
        assert_eq!(c.load_more(), Step::Idle);
    }

    #[test]
    fn test_videos_hidden_and_empty_page_skipped() {
        let mut c = controller(Arc::new(Recorder::default()));
        c.start();
        c.handle(SessionEvent::CredentialResolved(Ok(Credential::new("tok", None))));
        let videos = MediaPage {
            items: vec![item("v1", MediaType::Video)],
            next_cursor: Some("c1".into()),
        };
        match c.handle(SessionEvent::PageLoaded(Ok(videos))) {
            Step::FetchPage { after, .. } => assert_eq!(after.as_deref(), Some("c1")),
            other => panic!("unexpected step {:?}", other),
        }
        assert!(c.media().is_empty());
    }

    #[test]
    fn test_items_without_url_hidden() {
        let mut flagged = item("2", MediaType::Image);
        flagged.media_url = None;
        let first = MediaPage {
            items: vec![item("1", MediaType::Image), flagged, item("3", MediaType::Image)],
            next_cursor: None,
        };
        let mut c = ready(Arc::new(Recorder::default()), first);
        let ids: Vec<&str> = c.media().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(!c.toggle("2"));
    }

    #[test]
    fn test_selection_matches_taps() {
        let delegate = Arc::new(Recorder::default());
        let mut c = ready(delegate.clone(), page(&["1", "2", "3"], None));
        assert!(c.toggle("3"));
        assert!(c.toggle("1"));
        assert!(!c.toggle("3"));
        assert!(c.toggle("2"));
        assert!(!c.toggle("missing"));
        let ids: Vec<&str> = c.selected().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(delegate.events(), vec!["select:3", "select:1", "select:2"]);
    }

    #[test]
    fn test_preset_selection_can_be_deselected() {
        let delegate = Arc::new(Recorder::default());
        let mut c = controller(delegate.clone()).with_selection(vec![item("old", MediaType::Image)]);
        c.start();
        c.handle(SessionEvent::CredentialResolved(Ok(Credential::new("tok", None))));
        c.handle(SessionEvent::PageLoaded(Ok(page(&["1"], None))));
        assert!(c.is_selected("old"));
        assert!(!c.toggle("old"));
        assert!(c.toggle("1"));
        c.finish();
        assert_eq!(delegate.events(), vec!["select:1", "finish:1"]);
    }

    #[test]
    fn test_should_select_veto() {
        let delegate = Arc::new(Recorder { veto: Some("2"), ..Default::default() });
        let mut c = ready(delegate.clone(), page(&["1", "2"], None));
        assert!(!c.toggle("2"));
        assert!(!c.is_selected("2"));
        assert!(delegate.events().is_empty());
    }

    #[test]
    fn test_finish_reports_selection_once() {
        let delegate = Arc::new(Recorder::default());
        let mut c = ready(delegate.clone(), page(&["1", "2"], None));
        c.set_selected(vec![item("2", MediaType::Image), item("9", MediaType::Image)]);
        c.finish();
        c.finish();
        c.cancel();
        assert!(!c.toggle("1"));
        assert_eq!(delegate.events(), vec!["finish:2,9"]);
        assert_eq!(c.state(), &PickerState::Finished);
    }

    #[test]
    fn test_cancel_while_loading_ignores_late_page() {
        let delegate = Arc::new(Recorder::default());
        let mut c = controller(delegate.clone());
        c.start();
        c.handle(SessionEvent::CredentialResolved(Ok(Credential::new("tok", None))));
        c.cancel();
        assert_eq!(c.handle(SessionEvent::PageLoaded(Ok(page(&["1"], None)))), Step::Idle);
        assert!(c.media().is_empty());
        assert_eq!(delegate.events(), vec!["cancel"]);
    }

    #[test]
    fn test_unauthorized_reauthorizes_once() {
        let delegate = Arc::new(Recorder::default());
        let mut c = controller(delegate.clone());
        c.start();
        c.handle(SessionEvent::CredentialResolved(Ok(Credential::new("stale", None))));
        let rejected = || SessionEvent::PageLoaded(Err(ApiClientError::Unauthorized("expired".into())));

        assert_eq!(c.handle(rejected()), Step::ResolveCredential { force_login: true });
        assert!(delegate.events().is_empty());
        c.handle(SessionEvent::CredentialResolved(Ok(Credential::new("fresh", None))));
        assert_eq!(c.handle(rejected()), Step::Idle);
        assert_eq!(delegate.events(), vec!["fail:Access token rejected: expired"]);
        assert!(matches!(c.state(), PickerState::Failed(PickerError::Unauthorized(_))));
    }

    #[test]
    fn test_network_error_reported_once() {
        let delegate = Arc::new(Recorder::default());
        let mut c = controller(delegate.clone());
        c.start();
        c.handle(SessionEvent::CredentialResolved(Ok(Credential::new("tok", None))));
        c.handle(SessionEvent::PageLoaded(Err(ApiClientError::RequestError("refused".into()))));
        c.handle(SessionEvent::PageLoaded(Err(ApiClientError::RequestError("refused".into()))));
        c.cancel();
        assert_eq!(delegate.events(), vec!["fail:Network error: refused"]);
    }

    #[test]
    fn test_auth_failure_reported() {
        let delegate = Arc::new(Recorder::default());
        let mut c = controller(delegate.clone());
        c.start();
        let step = c.handle(SessionEvent::CredentialResolved(Err(PickerError::AuthorizationDenied(
            "user_denied".into(),
        ))));
        assert_eq!(step, Step::Idle);
        assert_eq!(delegate.events(), vec!["fail:Authorization denied: user_denied"]);
    }
}
