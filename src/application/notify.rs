//! User-facing feedback for mutation outcomes.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::lock::mutex_lock;

const SOURCE: &str = "application::notify";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Success,
    Error,
}

impl ToastKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub title: String,
    pub description: String,
}

impl Toast {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Receives exactly one toast per completed mutation.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Writes toasts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Success => info!(
                toast_kind = toast.kind.as_str(),
                title = %toast.title,
                description = %toast.description,
                "Notification"
            ),
            ToastKind::Error => warn!(
                toast_kind = toast.kind.as_str(),
                title = %toast.title,
                description = %toast.description,
                "Notification"
            ),
        }
    }
}

/// Keeps every toast in memory, in emission order.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    toasts: Arc<Mutex<Vec<Toast>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        mutex_lock(&self.toasts, SOURCE, "toasts").clone()
    }

    pub fn count(&self, kind: ToastKind) -> usize {
        mutex_lock(&self.toasts, SOURCE, "count")
            .iter()
            .filter(|toast| toast.kind == kind)
            .count()
    }

    pub fn take(&self) -> Vec<Toast> {
        std::mem::take(&mut *mutex_lock(&self.toasts, SOURCE, "take"))
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, toast: Toast) {
        mutex_lock(&self.toasts, SOURCE, "notify").push(toast);
    }
}

/// Forwards toasts to a presentation task. Toasts sent after the receiver
/// is gone are dropped with a debug log.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Toast>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, toast: Toast) {
        if let Err(err) = self.sender.send(toast) {
            debug!(title = %err.0.title, "Notification receiver closed; toast dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_counts_by_kind() {
        let sink = MemorySink::new();
        sink.notify(Toast::success("Cliente agregado", "ok"));
        sink.notify(Toast::error("Error", "fallo"));
        sink.notify(Toast::success("Turno creado", "ok"));

        assert_eq!(sink.count(ToastKind::Success), 2);
        assert_eq!(sink.count(ToastKind::Error), 1);
        assert_eq!(sink.take().len(), 3);
        assert!(sink.toasts().is_empty());
    }

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (sink, mut receiver) = ChannelSink::new();
        sink.notify(Toast::success("a", "1"));
        sink.notify(Toast::error("b", "2"));

        assert_eq!(receiver.recv().await.map(|toast| toast.title), Some("a".to_string()));
        assert_eq!(
            receiver.recv().await.map(|toast| toast.kind),
            Some(ToastKind::Error)
        );
    }

    #[test]
    fn channel_sink_tolerates_closed_receiver() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.notify(Toast::success("late", "ignored"));
    }
}
