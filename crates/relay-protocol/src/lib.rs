pub mod chat;
pub mod claude;
pub mod sse;
