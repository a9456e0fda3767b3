//! VSC Core Library
//!
//! Shared records and arithmetic for synchronising the account page with
//! the storage backends.
//!
//! # Modules
//!
//! - [`ids`] - Validated VSC identifiers (`vsc40001`, `gvo00012`, `proj_test01`)
//! - [`entity`] - Typed account, group and quota records
//! - [`quota`] - Hard/soft quota derivation
//! - [`watermark`] - The last-synchronised timestamp
//! - [`error`] - Shared error type
//!
//! # Example
//!
//! ```
//! use vsc_core::{QuotaLimits, QuotaPolicy};
//!
//! let policy = QuotaPolicy::new(0.95).unwrap();
//! let limits = QuotaLimits::from_kib(10, 2, &policy);
//! assert_eq!(limits.hard, 20480);
//! assert_eq!(limits.soft, 19456);
//! ```

pub mod entity;
pub mod error;
pub mod ids;
pub mod quota;
pub mod watermark;

pub use entity::{Account, Entity, EntityKind, EntityStatus, Group, QuotaRecord};
pub use error::{CoreError, CoreResult};
pub use ids::VscId;
pub use quota::{Fraction, QuotaLimits, QuotaPolicy};
pub use watermark::Watermark;
