//! Browser-facing side of the relay: the inbound chat payload and the
//! normalized events streamed back.

pub mod event;
pub mod request;

pub use event::OutboundEvent;
pub use request::{ChatRequest, Message, Role};
