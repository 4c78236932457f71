pub mod request;
pub mod stream;
pub mod types;

pub use request::{CreateMessageHeaders, CreateMessageRequest, CreateMessageRequestBody};
pub use stream::*;
pub use types::*;
