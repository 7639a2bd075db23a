//! Inventory costing.
//!
//! This module implements cost layer accounting:
//! - Cost layers created by purchases and manual adjustments
//! - COGS by FIFO, LIFO, weighted average and specific identification
//! - The append-only costing ledger
//! - Read-only summaries, valuations and cost variances
//! - Landed cost calculation

pub mod engine;
pub mod error;
pub mod memory;
pub mod selection;
pub mod store;
pub mod summary;
pub mod types;
pub mod valuation;

#[cfg(test)]
mod selection_props;

pub use engine::{CostingEngine, EngineConfig};
pub use error::CostingError;
pub use memory::{MemoryCostingStore, MemoryLedger, MemoryProductDirectory};
pub use selection::{ConsumptionPlan, LayerDraw, LayerSelector};
pub use store::{
    CommitReceipt, CostLayerStore, LayerMutation, ProductDirectory, TransactionLedger, UnitOfWork,
};
pub use summary::InventorySummaryService;
pub use types::{
    AddCostLayerInput, AdjustCostLayerInput, AdjustmentDirection, CogsCalculation, CogsRequest,
    CostLayer, CostLayerSummary, CostLayerTransaction, CostingMethod, LayerConsumption,
    LayerOrder, LayerStatus, LayerTransactionType, LedgerEvent, NewCostLayer, ProductInfo,
    ProductValuation,
};
pub use valuation::{CostVariance, LandedCost, LandedCostCharges, ValuationService, VarianceType};
