use std::{future::Future, io, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
    sync::watch,
    task::{JoinError, JoinHandle, JoinSet},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    broadcaster::Broadcaster,
    config::RelayConfig,
    connection::{ClientWriter, ConnectionReader},
    error::RelayError,
    event::{ClientHandle, ClientId, Event, EventSender},
    game::Console,
};

/// Accepts connections and wires each one to the broadcaster.
///
/// The acceptor never sees the registry; it only creates a queue, a writer
/// and a reader per connection.
pub struct Server {
    listener: TcpListener,
    config: RelayConfig,
    events: EventSender,
    broadcaster: JoinHandle<()>,
}

impl Server {
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self::from_listener(listener, config))
    }

    /// Uses an already bound listener; `config.listen` is ignored.
    ///
    /// The broadcaster starts here, so this must be called inside a runtime.
    pub fn from_listener(listener: TcpListener, config: RelayConfig) -> Self {
        let (events, broadcaster) = Broadcaster::new(config.delivery).spawn();
        Self {
            listener,
            config,
            events,
            broadcaster,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A producer handle onto the broadcaster mailbox, valid until the server stops.
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    /// Serves until `shutdown` resolves, then stops accepting, lets every
    /// connection announce its departure and stops the broadcaster.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            config,
            events,
            broadcaster,
        } = self;
        tokio::pin!(shutdown);

        if config.console {
            Console::new(config.game_keyword.clone(), config.max_operand)
                .spawn(std::io::BufReader::new(std::io::stdin()), events.clone())
                .context("failed to start operator console")?;
            info!(
                keyword = %config.game_keyword,
                "type the keyword on the console to start a math game"
            );
        }

        let (stop, stop_signal) = watch::channel(false);
        let mut acceptor = Acceptor {
            config: &config,
            events: events.clone(),
            stop_signal,
            connections: JoinSet::new(),
            next_id: 1,
        };

        loop {
            select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => acceptor.handle_accept_result(accepted),
                Some(finished) = acceptor.connections.join_next(),
                    if !acceptor.connections.is_empty() =>
                {
                    log_connection_result(finished);
                }
            }
        }

        info!("relay shutting down");
        drop(listener);
        let _ = stop.send(true);
        let drained = timeout(config.shutdown_grace, async {
            while let Some(finished) = acceptor.connections.join_next().await {
                log_connection_result(finished);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = acceptor.connections.len(),
                "connections did not close within the shutdown grace period, aborting them"
            );
            acceptor.connections.shutdown().await;
        }

        if events.send(Event::Shutdown).await.is_err() {
            debug!("broadcaster already stopped");
        }
        broadcaster.await.context("broadcaster task failed")?;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

struct Acceptor<'a> {
    config: &'a RelayConfig,
    events: EventSender,
    stop_signal: watch::Receiver<bool>,
    connections: JoinSet<()>,
    next_id: u64,
}

impl Acceptor<'_> {
    fn handle_accept_result(&mut self, result: io::Result<(TcpStream, SocketAddr)>) {
        match result {
            Ok((stream, peer)) => self.spawn_connection(stream, peer),
            Err(err) => warn!(error = ?err, "failed to accept connection"),
        }
    }

    fn spawn_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = ClientId::new(self.next_id);
        self.next_id += 1;
        debug!(client = %id, peer = %peer, "accepted connection");

        let (read_half, write_half) = stream.into_split();
        let (handle, outbound) = ClientHandle::new(id, self.config.effective_queue_capacity());
        let writer = ClientWriter::new(peer, write_half, outbound).spawn();
        let reader = ConnectionReader::new(
            id,
            peer,
            BufReader::new(read_half),
            self.config.identity,
            self.events.clone(),
            self.stop_signal.clone(),
        )
        .with_writer_grace(self.config.shutdown_grace);

        self.connections.spawn(async move {
            if let Err(err) = reader.run(handle, writer).await {
                warn!(peer = %peer, error = %err, "connection closed with error");
            }
        });
    }
}

fn log_connection_result(result: Result<(), JoinError>) {
    if let Err(err) = result {
        warn!(error = ?err, "connection task failed");
    }
}
