//! Value objects - immutable identity types

mod account;

pub use account::{AccountId, AccountIdParseError};
