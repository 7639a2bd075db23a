//! Postgres enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "costing_method")]
pub enum CostingMethod {
    #[sea_orm(string_value = "FIFO")]
    Fifo,
    #[sea_orm(string_value = "LIFO")]
    Lifo,
    #[sea_orm(string_value = "WEIGHTED_AVERAGE")]
    WeightedAverage,
    #[sea_orm(string_value = "SPECIFIC_IDENTIFICATION")]
    SpecificIdentification,
    #[sea_orm(string_value = "STANDARD_COST")]
    StandardCost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "cost_layer_status")]
pub enum CostLayerStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "allocated")]
    Allocated,
    #[sea_orm(string_value = "sold")]
    Sold,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "damaged")]
    Damaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "cost_layer_transaction_type"
)]
pub enum CostLayerTransactionType {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "return")]
    Return,
}
