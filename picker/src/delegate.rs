use crate::PickerError;
use api_client::MediaItem;
use tokio::sync::mpsc;

/// Receives the outcome of a picking session.
///
/// All methods are called on the thread driving the controller. Exactly one
/// of `did_finish_picking`, `did_cancel` or `did_fail` is called per session.
pub trait PickerDelegate: Send + Sync {
    fn did_fail(&self, error: &PickerError);

    /// `items` is empty when the user confirmed without picking anything.
    fn did_finish_picking(&self, items: &[MediaItem]);

    fn did_cancel(&self);

    fn did_select(&self, _item: &MediaItem) {}

    fn should_select(&self, _item: &MediaItem) -> bool {
        true
    }

    /// Filter applied to every fetched item before it is shown. Items without
    /// any displayable URL are hidden by default.
    fn should_display(&self, item: &MediaItem) -> bool {
        item.is_image() && item.preview_url().is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerOutcome {
    Finished(Vec<MediaItem>),
    Cancelled,
    Failed(PickerError),
}

/// Forwards the session outcome over a channel.
pub struct OutcomeDelegate {
    tx: mpsc::UnboundedSender<PickerOutcome>,
}

impl OutcomeDelegate {
    pub fn new(tx: mpsc::UnboundedSender<PickerOutcome>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PickerOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, outcome: PickerOutcome) {
        if let Err(e) = self.tx.send(outcome) {
            tracing::error!("Failed to forward picker outcome: {}", e);
        }
    }
}

impl PickerDelegate for OutcomeDelegate {
    fn did_fail(&self, error: &PickerError) {
        self.send(PickerOutcome::Failed(error.clone()));
    }

    fn did_finish_picking(&self, items: &[MediaItem]) {
        self.send(PickerOutcome::Finished(items.to_vec()));
    }

    fn did_cancel(&self) {
        self.send(PickerOutcome::Cancelled);
    }
}
