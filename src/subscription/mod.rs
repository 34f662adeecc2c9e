// WebSocket session handling and wire protocol

pub mod manager;
pub mod protocol;

pub use manager::Session;
pub use protocol::{ClientMessage, ErrorMessage};
