//! `SeaORM` entity definitions.

pub mod cost_layer_transactions;
pub mod cost_layers;
pub mod products;
pub mod sea_orm_active_enums;
