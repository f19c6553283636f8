use parking_lot::Mutex;
use shared::events::{Notice, StudyEvent};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Fan-out of [`StudyEvent`]s to every live subscriber.
///
/// Subscribers that dropped their receiver are pruned on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<StudyEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<StudyEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: StudyEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn notice(&self, notice: Notice) {
        self.publish(StudyEvent::Notice(notice));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
