pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod mail;
pub mod monitor;
pub mod notify;
pub mod seen;
pub mod store;
pub mod summary;
