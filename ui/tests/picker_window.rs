use auth::{Authenticator, MemoryStore, OAuthConfig};
use iced::Application;
use picker::*;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;
use ui::{ImagePicker, Message, PickerFlags};

fn item(id: &str, media_type: MediaType) -> MediaItem {
    MediaItem {
        id: id.into(),
        media_type,
        media_url: Some(format!("http://127.0.0.1:9/{}.jpg", id)),
        thumbnail_url: None,
        caption: None,
        permalink: None,
        timestamp: None,
        username: None,
    }
}

fn open_picker(cache: &std::path::Path) -> (ImagePicker, UnboundedReceiver<PickerOutcome>) {
    let config = OAuthConfig::new("client", "secret", "http://127.0.0.1:1/callback");
    let auth = Arc::new(Authenticator::new(config, Arc::new(MemoryStore::new())));
    let (delegate, rx) = OutcomeDelegate::channel();
    let controller = PickerController::new(Session::new(auth), Arc::new(delegate));
    let (picker, _) = ImagePicker::new(PickerFlags {
        controller,
        cache_dir: cache.to_path_buf(),
        preload: 2,
        selection_updates: None,
    });
    (picker, rx)
}

fn load(picker: &mut ImagePicker, items: Vec<MediaItem>, next: Option<&str>) {
    let _ = picker.update(Message::Session(Some(SessionEvent::CredentialResolved(Ok(Credential::new(
        "tok", None,
    ))))));
    let _ = picker.update(Message::Session(Some(SessionEvent::PageLoaded(Ok(MediaPage {
        items,
        next_cursor: next.map(str::to_string),
    })))));
}

#[test]
fn test_initial_state_waits_for_authorization() {
    let dir = tempdir().unwrap();
    let (picker, _) = open_picker(dir.path());
    assert_eq!(picker.state(), &PickerState::Authorizing);
    assert_eq!(picker.media_count(), 0);
    assert!(picker.selected_ids().is_empty());
}

#[test]
fn test_grid_shows_images_only() {
    let dir = tempdir().unwrap();
    let (mut picker, _) = open_picker(dir.path());
    load(
        &mut picker,
        vec![item("1", MediaType::Image), item("2", MediaType::Video), item("3", MediaType::CarouselAlbum)],
        None,
    );
    assert_eq!(picker.state(), &PickerState::Ready);
    assert_eq!(picker.media_count(), 2);
}

#[test]
fn test_toggle_and_done_reports_selection() {
    let dir = tempdir().unwrap();
    let (mut picker, mut rx) = open_picker(dir.path());
    load(&mut picker, vec![item("1", MediaType::Image), item("2", MediaType::Image)], None);

    let _ = picker.update(Message::ToggleItem("2".into()));
    let _ = picker.update(Message::ToggleItem("1".into()));
    let _ = picker.update(Message::ToggleItem("2".into()));
    assert_eq!(picker.selected_ids(), vec!["1".to_string()]);

    let _ = picker.update(Message::Done);
    assert_eq!(picker.state(), &PickerState::Finished);
    match rx.try_recv() {
        Ok(PickerOutcome::Finished(items)) => assert_eq!(items.len(), 1),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_escape_cancels_once() {
    let dir = tempdir().unwrap();
    let (mut picker, mut rx) = open_picker(dir.path());
    load(&mut picker, vec![item("1", MediaType::Image)], None);

    let _ = picker.update(Message::Cancel);
    let _ = picker.update(Message::CloseRequested);
    assert_eq!(rx.try_recv().ok(), Some(PickerOutcome::Cancelled));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_host_replaces_selection() {
    let dir = tempdir().unwrap();
    let (mut picker, _) = open_picker(dir.path());
    load(&mut picker, vec![item("1", MediaType::Image)], Some("c1"));

    let _ = picker.update(Message::SelectionReplaced(vec![item("7", MediaType::Image), item("1", MediaType::Image)]));
    assert_eq!(picker.selected_ids(), vec!["7".to_string(), "1".to_string()]);
    let _ = picker.update(Message::ToggleItem("7".into()));
    assert_eq!(picker.selected_ids(), vec!["1".to_string()]);
}

#[test]
fn test_failure_shows_banner() {
    let dir = tempdir().unwrap();
    let (mut picker, mut rx) = open_picker(dir.path());
    let _ = picker.update(Message::Session(Some(SessionEvent::CredentialResolved(Err(
        PickerError::AuthorizationDenied("user_denied".into()),
    )))));
    assert_eq!(picker.error_message().as_deref(), Some("Authorization denied: user_denied"));
    assert!(matches!(rx.try_recv(), Ok(PickerOutcome::Failed(_))));

    let _ = picker.update(Message::Cancel);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_thumbnail_failure_keeps_placeholder() {
    let dir = tempdir().unwrap();
    let (mut picker, _) = open_picker(dir.path());
    load(&mut picker, vec![item("1", MediaType::Image)], None);
    let _ = picker.update(Message::ThumbnailLoaded("1".into(), Err(ui::ImageLoaderError::NotFound)));
    assert_eq!(picker.thumbnail_count(), 0);
}
