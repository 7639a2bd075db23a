//! Conversions between domain enums and database enums.

use sea_orm::DbErr;
use stockcost_core::costing::{CostingError, CostingMethod, LayerStatus, LayerTransactionType};

use crate::entities::sea_orm_active_enums::{
    CostLayerStatus as DbLayerStatus, CostLayerTransactionType as DbTransactionType,
    CostingMethod as DbCostingMethod,
};

/// Maps a database failure onto the costing taxonomy.
pub(crate) fn persistence(e: DbErr) -> CostingError {
    CostingError::persistence(e.to_string())
}

/// Convert domain costing method to database enum.
pub(crate) fn to_db_method(method: CostingMethod) -> DbCostingMethod {
    match method {
        CostingMethod::Fifo => DbCostingMethod::Fifo,
        CostingMethod::Lifo => DbCostingMethod::Lifo,
        CostingMethod::WeightedAverage => DbCostingMethod::WeightedAverage,
        CostingMethod::SpecificIdentification => DbCostingMethod::SpecificIdentification,
        CostingMethod::StandardCost => DbCostingMethod::StandardCost,
    }
}

/// Convert database costing method to domain enum.
pub(crate) fn from_db_method(method: DbCostingMethod) -> CostingMethod {
    match method {
        DbCostingMethod::Fifo => CostingMethod::Fifo,
        DbCostingMethod::Lifo => CostingMethod::Lifo,
        DbCostingMethod::WeightedAverage => CostingMethod::WeightedAverage,
        DbCostingMethod::SpecificIdentification => CostingMethod::SpecificIdentification,
        DbCostingMethod::StandardCost => CostingMethod::StandardCost,
    }
}

pub(crate) fn to_db_status(status: LayerStatus) -> DbLayerStatus {
    match status {
        LayerStatus::Available => DbLayerStatus::Available,
        LayerStatus::Allocated => DbLayerStatus::Allocated,
        LayerStatus::Sold => DbLayerStatus::Sold,
        LayerStatus::Expired => DbLayerStatus::Expired,
        LayerStatus::Damaged => DbLayerStatus::Damaged,
    }
}

pub(crate) fn from_db_status(status: DbLayerStatus) -> LayerStatus {
    match status {
        DbLayerStatus::Available => LayerStatus::Available,
        DbLayerStatus::Allocated => LayerStatus::Allocated,
        DbLayerStatus::Sold => LayerStatus::Sold,
        DbLayerStatus::Expired => LayerStatus::Expired,
        DbLayerStatus::Damaged => LayerStatus::Damaged,
    }
}

pub(crate) fn to_db_transaction_type(kind: LayerTransactionType) -> DbTransactionType {
    match kind {
        LayerTransactionType::Purchase => DbTransactionType::Purchase,
        LayerTransactionType::Sale => DbTransactionType::Sale,
        LayerTransactionType::Adjustment => DbTransactionType::Adjustment,
        LayerTransactionType::Transfer => DbTransactionType::Transfer,
        LayerTransactionType::Return => DbTransactionType::Return,
    }
}

pub(crate) fn from_db_transaction_type(kind: DbTransactionType) -> LayerTransactionType {
    match kind {
        DbTransactionType::Purchase => LayerTransactionType::Purchase,
        DbTransactionType::Sale => LayerTransactionType::Sale,
        DbTransactionType::Adjustment => LayerTransactionType::Adjustment,
        DbTransactionType::Transfer => LayerTransactionType::Transfer,
        DbTransactionType::Return => LayerTransactionType::Return,
    }
}
