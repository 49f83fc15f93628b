// aegis-push/src/lib.rs

//! Signed Safari push packages and the web-service endpoints that serve them.

pub mod config;
pub mod dispatch;
pub mod package;
pub mod server;
