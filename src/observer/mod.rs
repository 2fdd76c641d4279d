//! # Kernel exit observation.
//!
//! - [`record`]: wire format of kernel process events and their decoder.
//! - [`channel`]: the transport ([`EventChannel`] trait, netlink proc
//!   connector implementation).
//! - [`bus`]: the process-wide [`ExitEventBus`] multiplexing one channel to
//!   many [`ExitListener`]s.

pub mod bus;
pub mod channel;
pub mod record;

pub use bus::{ExitEventBus, ExitListener};
pub use channel::{ChannelFactory, EventChannel, ProcConnector};
pub use record::{ExitEventKind, ExitRecord};
