//! # VSC Account Page
//!
//! Client for the VSC account page, the authoritative store of accounts,
//! groups, virtual organisations, projects and their quota.
//!
//! - [`EntitySource`] - what the synchronisation needs from the account page
//! - [`AccountPageClient`] - the REST implementation
//! - [`models`] - wire payloads and their conversion into `vsc-core` records

pub mod client;
pub mod error;
pub mod models;
pub mod source;

pub use client::AccountPageClient;
pub use error::{SourceError, SourceResult};
pub use source::{ChangeFilter, EntitySource};
