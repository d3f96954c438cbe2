mod balance;
mod currency;
mod ledger;
mod money;
mod operation;
mod register;

pub use balance::*;
pub use currency::*;
pub use ledger::*;
pub use money::*;
pub use operation::*;
pub use register::*;

pub(crate) use register::parse_currency;
