// Application layer - use cases and orchestration over the repository.
// Services here own validation, atomicity and logging; the CLI only parses
// input and prints results.

pub mod analytics;
pub mod credit;
pub mod error;
pub mod ledger;
pub mod overdue;
pub mod ports;
pub mod scheduler;

pub use analytics::*;
pub use credit::*;
pub use error::*;
pub use ledger::*;
pub use overdue::*;
pub use ports::*;
pub use scheduler::*;
