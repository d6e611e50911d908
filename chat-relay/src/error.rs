use std::{io, net::SocketAddr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("broadcaster is no longer accepting events")]
    BroadcasterClosed,
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
