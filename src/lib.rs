pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod schemas;
pub mod session;
pub mod state;
pub mod stats;
pub mod store;
pub mod workspace;
