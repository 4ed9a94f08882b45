//! Authenticating gateway in front of the trading dashboard backend.

pub mod api;
pub mod auth;
pub mod config;
pub mod gate;
pub mod upstream;
