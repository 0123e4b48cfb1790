// zsk-server: REST backend for the zsk knowledge base.

pub mod api;
pub mod auth;
pub mod backup;
pub mod config;
pub mod cors;
pub mod db;
pub mod error;
pub mod maintenance;
pub mod server;
pub mod state;
pub mod validation;
