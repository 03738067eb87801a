//! Outbound client for the court portal's case-status lookup.

mod client;
mod config;

pub use client::{CaseQueryClient, ClientError};
pub use config::PortalConfig;
