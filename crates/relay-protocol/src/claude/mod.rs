pub mod create_message;
pub mod error;
pub mod types;
