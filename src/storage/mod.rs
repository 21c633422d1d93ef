mod repository;

pub use repository::*;

/// SQL migration for accounts, transactions, credits and payment schedules
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for enforcement attempts and job leases
pub const MIGRATION_002_ENFORCEMENT: &str = include_str!("migrations/002_enforcement.sql");
