//! Per-connection tasks.
//!
//! Every accepted socket is split in two. The [`ClientWriter`] drains the
//! connection's outbound queue onto the write half; the [`ConnectionReader`]
//! turns lines from the read half into broadcaster events. Neither touches the
//! registry.

use std::{future, io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    select,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info};

use crate::{
    config::IdentityMode,
    error::Result,
    event::{ClientHandle, ClientId, Event, EventSender},
    game::parse_guess,
};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// How long a departing connection's writer may keep flushing before it is aborted.
pub const DEFAULT_WRITER_GRACE: Duration = Duration::from_secs(2);

/// Reads one line without its terminator. `Ok(None)` means end of stream.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let len = line.trim_end_matches(LINE_ENDINGS).len();
    line.truncate(len);
    Ok(Some(line))
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Resolves once shutdown has been requested or the signal's sender is gone.
pub async fn shutdown_requested(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|stop| *stop).await;
}

pub struct ClientWriter<W> {
    peer: SocketAddr,
    writer: W,
    outbound: mpsc::Receiver<String>,
}

impl<W> ClientWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(peer: SocketAddr, writer: W, outbound: mpsc::Receiver<String>) -> Self {
        Self {
            peer,
            writer,
            outbound,
        }
    }

    /// Writes queued lines in order until the queue closes, then shuts the
    /// write half down. A failed write ends this writer only.
    pub async fn run(mut self) -> io::Result<()> {
        while let Some(line) = self.outbound.recv().await {
            write_line(&mut self.writer, &line).await?;
        }
        self.writer.shutdown().await
    }

    pub fn spawn(self) -> JoinHandle<()> {
        let peer = self.peer;
        tokio::spawn(async move {
            if let Err(error) = self.run().await {
                debug!(peer = %peer, ?error, "client writer stopped");
            }
        })
    }
}

/// The reader's view of its connection's writer task.
///
/// Dropping it aborts the writer, so a reader that is itself aborted never
/// leaves a writer stuck on a socket nobody reads.
struct WriterTask {
    handle: JoinHandle<()>,
    done: bool,
}

impl WriterTask {
    fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle,
            done: false,
        }
    }

    /// Resolves when the writer ends on its own; pending forever afterwards.
    async fn stopped(&mut self) {
        if self.done {
            return future::pending().await;
        }
        let _ = (&mut self.handle).await;
        self.done = true;
    }

    /// Waits up to `grace` for queued lines to reach the socket, then aborts.
    async fn finish(mut self, grace: Duration) {
        if self.done {
            return;
        }
        match timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(?error, "client writer task failed"),
            Err(_) => debug!("client writer still blocked after grace period, aborting"),
        }
    }
}

impl Drop for WriterTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Why a reader stopped relaying lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    ReadFailed,
    WriterGone,
    Shutdown,
    BroadcasterGone,
}

pub struct ConnectionReader<R> {
    id: ClientId,
    peer: SocketAddr,
    reader: R,
    identity: IdentityMode,
    events: EventSender,
    shutdown: watch::Receiver<bool>,
    writer_grace: Duration,
}

impl<R> ConnectionReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(
        id: ClientId,
        peer: SocketAddr,
        reader: R,
        identity: IdentityMode,
        events: EventSender,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            peer,
            reader,
            identity,
            events,
            shutdown,
            writer_grace: DEFAULT_WRITER_GRACE,
        }
    }

    pub fn with_writer_grace(mut self, grace: Duration) -> Self {
        self.writer_grace = grace;
        self
    }

    /// Drives the connection from greeting to departure.
    ///
    /// `handle` is this connection's queue; it is handed to the broadcaster on
    /// join. `writer` is the task draining that queue. The connection is fully
    /// closed once this returns, at most one grace period after the leave.
    pub async fn run(mut self, handle: ClientHandle, writer: JoinHandle<()>) -> Result<()> {
        let mut writer = WriterTask::new(writer);

        let name = match self.identify(&mut writer).await {
            Some(name) => name,
            None => {
                debug!(peer = %self.peer, "connection closed before choosing a name");
                drop(handle);
                writer.finish(self.writer_grace).await;
                return Ok(());
            }
        };

        handle.deliver(format!("You are {name}")).await;
        self.events.message(format!("{name} has arrived")).await?;
        self.events
            .send(Event::Join {
                handle,
                addr: self.peer,
                name: name.clone(),
            })
            .await?;
        info!(client = %self.id, peer = %self.peer, %name, "client arrived");

        let stop = self.relay(&name, &mut writer).await;

        let departed = self.depart(&name).await;
        info!(client = %self.id, %name, reason = ?stop, "client left");
        writer.finish(self.writer_grace).await;
        departed
    }

    async fn identify(&mut self, writer: &mut WriterTask) -> Option<String> {
        if self.identity == IdentityMode::Address {
            return Some(self.peer.to_string());
        }

        let line = select! {
            line = read_line(&mut self.reader) => line.ok().flatten()?,
            _ = shutdown_requested(&mut self.shutdown) => return None,
            _ = writer.stopped() => return None,
        };

        if line.is_empty() {
            Some(self.peer.to_string())
        } else {
            Some(line)
        }
    }

    async fn relay(&mut self, name: &str, writer: &mut WriterTask) -> Stop {
        loop {
            let line = select! {
                line = read_line(&mut self.reader) => line,
                _ = shutdown_requested(&mut self.shutdown) => return Stop::Shutdown,
                _ = writer.stopped() => return Stop::WriterGone,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return Stop::Eof,
                Err(error) => {
                    debug!(client = %self.id, ?error, "read failed");
                    return Stop::ReadFailed;
                }
            };

            if self.forward(name, line).await.is_err() {
                return Stop::BroadcasterGone;
            }
        }
    }

    async fn forward(&self, name: &str, line: String) -> Result<()> {
        let guess = parse_guess(&line);
        self.events.message(format!("{name}: {line}")).await?;
        if let Some(value) = guess {
            self.events
                .send(Event::Guess {
                    name: name.to_string(),
                    value,
                })
                .await?;
        }
        Ok(())
    }

    async fn depart(&self, name: &str) -> Result<()> {
        self.events.send(Event::Leave(self.id)).await?;
        self.events.message(format!("{name} has left")).await
    }
}
