//! Accumulation register: movements, balances and turnovers.
//!
//! These are the pure parts of the register. Persistence lives in the db
//! crate; everything here can be tested without a database.

pub mod balance;
pub mod movement;
pub mod turnover;

pub use balance::{
    Balance, BalanceDrift, BalanceFilter, BalanceScope, RecalculationReport, StockRequirement,
    compare_balances, requirements_for_deltas, reservation_plan,
};
pub use movement::{
    Dimension, Movement, MovementFilter, RecordType, net_by_dimension, net_delta, validate_batch,
};
pub use turnover::{Turnover, TurnoverFilter};
