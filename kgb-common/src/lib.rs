//! Shared building blocks for the KGB commit notifier.
//!
//! Both the hook-side client and the IRC-facing daemon depend on this crate
//! for the commit model, the RPC wire codec, and the byte-encoding rules
//! that keep the two sides agreeing on what gets hashed and sent.

#![forbid(unsafe_code)]

pub mod encoding;
pub mod protocol;
pub mod types;

pub use protocol::{
    CommitCall, Fault, FaultCode, ProtocolError, RpcRequest, RpcResponse, auth_checksum,
    decode_commit,
};
pub use types::{Action, Change, ChangeParseError, Commit};
