//! Failures while bringing the server's infrastructure up.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("cannot listen on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("cannot connect to the feed database")]
    Connect(#[source] sqlx::Error),
    #[error("cannot prepare the feed database schema")]
    Schema(#[source] sqlx::Error),
    #[error("tracing subscriber could not be installed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }
}
