use std::{net::SocketAddr, time::Duration};

use clap::ValueEnum;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8001";
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;
pub const DEFAULT_GAME_KEYWORD: &str = "game";
pub const DEFAULT_MAX_OPERAND: u32 = 1000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

/// How the broadcaster hands a message to a client whose outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeliveryPolicy {
    /// Wait for room in the queue. A stalled client holds up every other client
    /// and every pending join or leave until its writer catches up.
    #[default]
    Block,
    /// Skip the full queue for this message only and keep fanning out.
    Drop,
}

/// What a connection is called in chat lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum IdentityMode {
    /// The peer's transport address, e.g. `127.0.0.1:53412`.
    #[default]
    Address,
    /// The first line the client sends.
    Name,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    /// Outbound lines buffered per client before delivery policy kicks in.
    pub queue_capacity: usize,
    pub delivery: DeliveryPolicy,
    pub identity: IdentityMode,
    /// Console line that starts a new math challenge.
    pub game_keyword: String,
    /// Challenge operands are drawn from `0..max_operand`.
    pub max_operand: u32,
    pub console: bool,
    /// How long a closing connection may spend flushing to a peer that does
    /// not read, and how long the server waits for connections at shutdown
    /// before aborting them.
    pub shutdown_grace: Duration,
}

impl RelayConfig {
    /// Tokio channels cannot be created with zero capacity.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8001)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            delivery: DeliveryPolicy::default(),
            identity: IdentityMode::default(),
            game_keyword: DEFAULT_GAME_KEYWORD.to_string(),
            max_operand: DEFAULT_MAX_OPERAND,
            console: false,
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}
