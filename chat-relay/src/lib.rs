//! Line-oriented chat relay over TCP.
//!
//! Clients connect, send text lines, and receive every other client's lines
//! plus arrival and departure notices, all in one global order. The modules
//! split the work the same way the running relay does:
//!
//! - [`server`] accepts connections and starts a reader and writer for each.
//! - [`connection`] holds the per-connection [`connection::ConnectionReader`]
//!   and [`connection::ClientWriter`] tasks.
//! - [`broadcaster`] is the one task that owns the client registry and the
//!   math game; everyone else talks to it through [`event::Event`]s.
//! - [`registry`] and [`game`] are the state the broadcaster owns.
//! - [`config`] and [`cli`] describe the recognised options; [`client`] is a
//!   small terminal client.
//!
//! Unit tests live next to each module; `tests/` drives real TCP clients
//! against a running [`server::Server`].

pub mod broadcaster;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod game;
pub mod registry;
pub mod server;
