//! Core register logic for Stockreg.
//!
//! This crate contains pure domain logic with ZERO database dependencies.
//! Movement and balance types, document rules, posting policies and the
//! turnover math live here; the db crate persists them.
//!
//! # Modules
//!
//! - `register` - Movements, balances, stock reservation and turnovers
//! - `document` - Documents, counterparties and their capability traits
//! - `posting` - Posting policies and the document state machine
//! - `clock` - Time and identity collaborators
//! - `units` - Units of measure
//! - `error` - The register error taxonomy

pub mod clock;
pub mod document;
pub mod error;
pub mod posting;
pub mod register;
pub mod units;

pub use clock::{Clock, FixedClock, IdGenerator, SequentialIdGenerator, SystemClock, UuidV7Generator};
pub use error::{RegisterError, RegisterResult};
