mod compose;
mod runtime;

pub use compose::{compose_session_update, default_session_config, handle_client_frame, handle_upstream_frame};
pub use runtime::run;
