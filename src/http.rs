//! HTTP execution and request URI construction.

pub mod client;
pub mod uri;
