//! Outbound mail queue abstraction.
//!
//! Callers hand a pre-rendered message to a [`MailQueue`] and move on. The
//! queue never blocks and [`MailQueue::send`] never fails into the caller:
//! a rejected message is logged and dropped. Actual delivery happens
//! elsewhere, on the receiving end of the queue.

pub mod templates;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

/// A rendered email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl MailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: String) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html,
        }
    }
}

/// Why a message could not be enqueued
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail queue is full")]
    QueueFull,

    #[error("Mail queue is closed")]
    QueueClosed,
}

/// One-way mail dispatch
pub trait MailQueue: Send + Sync {
    /// Enqueue without waiting, reporting why the message was rejected
    fn try_enqueue(&self, message: MailMessage) -> Result<(), MailError>;

    /// Fire-and-forget enqueue; failures are logged and swallowed
    fn send(&self, message: MailMessage) {
        let to = message.to.clone();
        let subject = message.subject.clone();
        if let Err(e) = self.try_enqueue(message) {
            log::error!("Dropping mail '{}' to {}: {}", subject, to, e);
        }
    }
}

/// Queue backed by a bounded tokio channel
#[derive(Clone)]
pub struct ChannelMailQueue {
    sender: mpsc::Sender<MailMessage>,
}

impl ChannelMailQueue {
    /// Create a queue and the receiver a delivery worker drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MailMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl MailQueue for ChannelMailQueue {
    fn try_enqueue(&self, message: MailMessage) -> Result<(), MailError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => MailError::QueueClosed,
        })
    }
}

/// Queue that only logs what it would have sent
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailQueue;

impl MailQueue for LogMailQueue {
    fn try_enqueue(&self, message: MailMessage) -> Result<(), MailError> {
        log::info!("Mail to {}: {}", message.to, message.subject);
        Ok(())
    }
}

/// Queue that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryMailQueue {
    messages: Mutex<Vec<MailMessage>>,
    closed: AtomicBool,
}

impl MemoryMailQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything enqueued so far
    pub fn messages(&self) -> Vec<MailMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages addressed to `to`
    pub fn messages_to(&self, to: &str) -> Vec<MailMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.to.eq_ignore_ascii_case(to))
            .collect()
    }

    /// Make every further enqueue fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MailQueue for MemoryMailQueue {
    fn try_enqueue(&self, message: MailMessage) -> Result<(), MailError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MailError::QueueClosed);
        }
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}

/// Pull the `token=` query value out of a rendered link in `html`
pub fn extract_token(html: &str) -> Option<String> {
    let start = html.find("token=")? + "token=".len();
    let token: String = html[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MailMessage {
        MailMessage::new("ann@example.com", "Hello", "<p>hi</p>".to_string())
    }

    #[test]
    fn test_channel_queue_reports_full_and_closed() {
        let (queue, mut receiver) = ChannelMailQueue::new(1);
        assert!(queue.try_enqueue(message()).is_ok());
        assert!(matches!(queue.try_enqueue(message()), Err(MailError::QueueFull)));

        assert_eq!(receiver.try_recv().unwrap().to, "ann@example.com");
        drop(receiver);
        assert!(matches!(queue.try_enqueue(message()), Err(MailError::QueueClosed)));
    }

    #[test]
    fn test_send_swallows_failures() {
        let queue = MemoryMailQueue::new();
        queue.send(message());
        queue.close();
        queue.send(message());
        assert_eq!(queue.messages().len(), 1);
    }

    #[test]
    fn test_extract_token() {
        let html = r#"<a href="https://app.test/reset?token=ab12ef">x</a>"#;
        assert_eq!(extract_token(html).as_deref(), Some("ab12ef"));
        assert!(extract_token("<p>no link</p>").is_none());
    }
}
