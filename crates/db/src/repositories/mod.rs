//! Repository abstractions for data access.
//!
//! Repositories borrow any `ConnectionTrait` implementor: the pool for
//! standalone reads, or the transaction of an open `TxScope` so every call
//! joins the caller's unit of work.

pub mod balance;
pub mod counterparty;
pub mod document;
pub mod movement;

pub use balance::BalanceRepository;
pub use counterparty::CounterpartyRepository;
pub use document::DocumentRepository;
pub use movement::MovementRepository;
