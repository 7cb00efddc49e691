//! Atrium CMS admin kernel.
//!
//! Theme registry reconciliation and lifecycle, plus user account
//! administration. The `atrium` binary runs these operations against
//! PostgreSQL; tests drive them through the in-memory collaborators.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod links;
pub mod mail;
pub mod models;
pub mod permissions;
pub mod site;
pub mod state;
pub mod theme;
pub mod users;

pub use context::{ActingUser, AdminContext, MessageKind, StatusLog, StatusMessage};
pub use error::{AdminError, AdminResult};
pub use state::AdminState;
