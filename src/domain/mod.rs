mod account;
pub mod amortization;
mod credit;
mod enforcement;
mod installment;
mod ledger;
mod money;
mod transaction;

pub use account::*;
pub use amortization::{ScheduleError, ScheduledPayment};
pub use credit::*;
pub use enforcement::*;
pub use installment::*;
pub use ledger::*;
pub use money::*;
pub use transaction::*;
