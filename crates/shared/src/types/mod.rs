//! Common types used across the application.

pub mod id;
pub mod money;
pub mod pagination;
pub mod quantity;

pub use id::*;
pub use money::{Currency, ExchangeRate, MAX_DECIMAL_PLACES, MinorUnits, Money, MoneyError};
pub use pagination::{PageMeta, PageRequest, PageResponse};
pub use quantity::{Quantity, QuantityError};
