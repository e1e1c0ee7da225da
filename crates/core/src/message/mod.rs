//! Message and MessageHandler
mod payload;
pub use payload::decode_ring_reply;
pub use payload::encode_ring;
pub use payload::null_reply;
pub use payload::parse_fingers;
pub use payload::Envelope;

pub mod types;
pub use types::*;

pub mod handlers;
pub use handlers::AppRegistry;
pub use handlers::Application;
pub use handlers::HandleMsg;
pub use handlers::MessageHandler;
