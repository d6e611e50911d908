//! Messages exchanged between connection tasks and the broadcaster.
//!
//! The broadcaster owns every piece of shared state. Everything else talks to
//! it by pushing an [`Event`] into its mailbox through an [`EventSender`].

use std::{fmt, net::SocketAddr};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};

use crate::{
    error::{RelayError, Result},
    game::Challenge,
};

/// Events buffered in the broadcaster mailbox before producers wait.
pub const EVENT_MAILBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Routes lines to one connection's outbound queue.
///
/// The handle is the only sender for that queue once the connection has
/// joined, so dropping it inside the broadcaster is what stops the writer.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    queue: mpsc::Sender<String>,
}

impl ClientHandle {
    /// Creates a handle and the receiving end its writer drains.
    pub fn new(id: ClientId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (queue, outbound) = mpsc::channel(capacity.max(1));
        (Self { id, queue }, outbound)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Waits for room in the queue. Returns `false` once the writer is gone.
    pub async fn deliver(&self, line: String) -> bool {
        self.queue.send(line).await.is_ok()
    }

    pub fn try_deliver(&self, line: String) -> Result<(), TrySendError<String>> {
        self.queue.try_send(line)
    }
}

/// One registry entry as reported by [`Event::Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: ClientId,
    pub name: String,
}

#[derive(Debug)]
pub enum Event {
    Join {
        handle: ClientHandle,
        addr: SocketAddr,
        name: String,
    },
    Leave(ClientId),
    Message(String),
    StartChallenge(Challenge),
    /// A chat line that parsed as an integer.
    Guess { name: String, value: i64 },
    Snapshot(oneshot::Sender<Vec<Member>>),
    Shutdown,
}

/// Cloneable producer side of the broadcaster mailbox.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(inner: mpsc::Sender<Event>) -> Self {
        Self { inner }
    }

    pub async fn send(&self, event: Event) -> Result<()> {
        self.inner
            .send(event)
            .await
            .map_err(|_| RelayError::BroadcasterClosed)
    }

    /// For producers running on plain threads, such as the operator console.
    pub fn blocking_send(&self, event: Event) -> Result<()> {
        self.inner
            .blocking_send(event)
            .map_err(|_| RelayError::BroadcasterClosed)
    }

    pub async fn message(&self, line: impl Into<String>) -> Result<()> {
        self.send(Event::Message(line.into())).await
    }

    /// Asks the broadcaster for the current membership.
    pub async fn snapshot(&self) -> Result<Vec<Member>> {
        let (reply, response) = oneshot::channel();
        self.send(Event::Snapshot(reply)).await?;
        response.await.map_err(|_| RelayError::BroadcasterClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_reports_closed_writer() {
        let (handle, outbound) = ClientHandle::new(ClientId::new(1), 1);
        drop(outbound);
        assert!(!handle.deliver("hello".into()).await);
    }

    #[tokio::test]
    async fn try_deliver_reports_full_queue() {
        let (handle, _outbound) = ClientHandle::new(ClientId::new(1), 1);
        handle.try_deliver("one".into()).expect("first line fits");
        let err = handle.try_deliver("two".into()).expect_err("queue is full");
        assert!(matches!(err, TrySendError::Full(line) if line == "two"));
    }

    #[tokio::test]
    async fn sender_fails_once_mailbox_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let events = EventSender::new(tx);
        assert!(matches!(
            events.message("lost").await,
            Err(RelayError::BroadcasterClosed)
        ));
    }
}
