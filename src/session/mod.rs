mod state;

pub use state::{CapturedMessage, DisconnectReason, Sender, Session};
