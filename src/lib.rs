#![doc = "The `taskflow` library crate."]
#![doc = ""]
#![doc = "This crate contains the authentication session engine of the TaskFlow backend:"]
#![doc = "token signing, credential checks, rotating device-bound refresh sessions,"]
#![doc = "persistence, routing configuration and error handling."]
#![doc = "It is used by the main binary (`main.rs`) to construct and run the application."]

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;

pub use crate::error::AppError;
pub use crate::state::AppState;
