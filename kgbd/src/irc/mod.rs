//! IRC client side of the daemon: wire framing, per-network sessions and
//! the registry that fans announcements into them.

pub mod manager;
pub mod message;
pub mod session;

pub use manager::SessionManager;
pub use session::OutboundMessage;
