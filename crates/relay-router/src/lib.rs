mod chat;

pub use chat::{
    CHAT_EDGE_PATH, CHAT_SERVER_PATH, REQUEST_ID_HEADER, chat_edge, chat_router, chat_server,
};
