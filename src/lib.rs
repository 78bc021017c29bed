//! Mafia Nights - client for the Mafia party game
//!
//! This crate provides the client side of the game:
//! - Typed access to the hosted backend (auth, profiles, rooms, players, chat)
//! - Room and lobby synchronization by polling or by the realtime change feed
//! - Seating layout around the virtual table
//! - Join-code generation and input validation

pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod dto;
pub mod entities;
pub mod error;
pub mod layout;
pub mod realtime;
pub mod services;
pub mod sync;
pub mod utils;

pub use context::AppContext;
pub use error::AppError;
