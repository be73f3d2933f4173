//! HTTP API: custom-role management over a role store.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
