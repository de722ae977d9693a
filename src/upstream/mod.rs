mod client;

pub use client::{UpstreamClient, build_url};
