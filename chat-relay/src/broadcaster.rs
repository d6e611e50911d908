//! The single owner of relay state.
//!
//! One task drains the event mailbox and applies each event to completion
//! before looking at the next. Joins, leaves, fan-outs and challenge rounds
//! therefore never interleave, and nothing outside this task can observe a
//! half-updated registry.

use std::{collections::HashMap, net::SocketAddr};

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::DeliveryPolicy,
    event::{ClientHandle, ClientId, EVENT_MAILBOX_CAPACITY, Event, EventSender, Member},
    game::{Challenge, GameState, winner_announcement},
    registry::{NameRegistry, Registry},
};

pub struct Broadcaster {
    registry: Registry,
    names: NameRegistry,
    addrs: HashMap<ClientId, SocketAddr>,
    game: GameState,
    delivery: DeliveryPolicy,
}

impl Broadcaster {
    pub fn new(delivery: DeliveryPolicy) -> Self {
        Self {
            registry: Registry::new(),
            names: NameRegistry::new(),
            addrs: HashMap::new(),
            game: GameState::new(),
            delivery,
        }
    }

    /// Starts the event loop on its own task.
    pub fn spawn(self) -> (EventSender, JoinHandle<()>) {
        let (tx, mailbox) = mpsc::channel(EVENT_MAILBOX_CAPACITY);
        let task = tokio::spawn(self.run(mailbox));
        (EventSender::new(tx), task)
    }

    /// Runs until [`Event::Shutdown`] arrives or every producer is gone, then
    /// closes the queues of any clients still registered.
    pub async fn run(mut self, mut mailbox: mpsc::Receiver<Event>) {
        while let Some(event) = mailbox.recv().await {
            if !self.handle(event).await {
                break;
            }
        }

        if !self.registry.is_empty() {
            debug!(clients = self.registry.len(), "closing remaining client queues");
            self.registry.drain();
        }
        info!("broadcaster stopped");
    }

    /// Applies one event. Returns `false` when the loop should stop.
    pub async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Join { handle, addr, name } => self.join(handle, addr, name),
            Event::Leave(id) => self.leave(id),
            Event::Message(line) => self.fan_out(&line).await,
            Event::StartChallenge(challenge) => self.start_challenge(challenge).await,
            Event::Guess { name, value } => self.guess(&name, value).await,
            Event::Snapshot(reply) => {
                let _ = reply.send(self.members());
            }
            Event::Shutdown => return false,
        }
        true
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn members(&self) -> Vec<Member> {
        self.registry
            .ids()
            .map(|id| Member {
                id,
                name: self
                    .addrs
                    .get(&id)
                    .and_then(|addr| self.names.name_of(addr))
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect()
    }

    fn join(&mut self, handle: ClientHandle, addr: SocketAddr, name: String) {
        let id = handle.id();
        if !self.registry.insert(handle) {
            warn!(client = %id, "ignoring duplicate join");
            return;
        }
        self.names.record(addr, name);
        self.addrs.insert(id, addr);
        debug!(client = %id, clients = self.registry.len(), "client registered");
    }

    fn leave(&mut self, id: ClientId) {
        // Dropping the handle closes the queue, which ends the client's writer.
        let Some(handle) = self.registry.remove(id) else {
            debug!(client = %id, "leave for unknown client");
            return;
        };
        drop(handle);

        if let Some(addr) = self.addrs.remove(&id) {
            self.names.forget(&addr);
        }
        debug!(client = %id, clients = self.registry.len(), "client deregistered");
    }

    async fn fan_out(&self, line: &str) {
        for handle in self.registry.handles() {
            match self.delivery {
                DeliveryPolicy::Block => {
                    if !handle.deliver(line.to_string()).await {
                        debug!(client = %handle.id(), "writer gone, awaiting leave");
                    }
                }
                DeliveryPolicy::Drop => match handle.try_deliver(line.to_string()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(client = %handle.id(), "outbound queue full, dropping line");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(client = %handle.id(), "writer gone, awaiting leave");
                    }
                },
            }
        }
    }

    async fn start_challenge(&mut self, challenge: Challenge) {
        if self.game.is_active() {
            debug!("replacing unfinished math game");
        }
        self.game.start(challenge);
        self.fan_out(&challenge.announcement()).await;
    }

    async fn guess(&mut self, name: &str, value: i64) {
        if !self.game.try_win(value) {
            return;
        }
        let announcement = winner_announcement(name);
        info!(winner = name, "math game won");
        self.fan_out(&announcement).await;
    }
}
