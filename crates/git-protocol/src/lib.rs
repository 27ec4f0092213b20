//! Bundle format and server-side receive-pack, framed in pkt-line.
//!
//! This crate covers the wire-plumbing surface the core owns: reading and
//! writing bundle files, and running the receive-pack exchange against a
//! caller-supplied object store, ref store, and hook runner. Network
//! transport (HTTP/SSH/git-daemon) and the fetch/push client are external
//! collaborators that sit above this crate.

pub mod bundle;
pub mod pktline;
pub mod receive_pack;

/// Errors that can occur during protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
