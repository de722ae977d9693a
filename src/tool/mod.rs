mod dispatcher;

pub use dispatcher::{Envelope, ToolDispatcher};
