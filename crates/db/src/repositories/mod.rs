//! Repository implementations of the costing traits.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

mod convert;

pub mod cost_layer;
pub mod ledger;
pub mod product;

pub use cost_layer::CostLayerRepository;
pub use ledger::CostLedgerRepository;
pub use product::ProductRepository;
