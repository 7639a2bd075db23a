//! `SeaORM` Entity for products table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub costing_method: Option<String>,
    pub standard_cost: Option<Decimal>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cost_layers::Entity")]
    CostLayers,
    #[sea_orm(has_many = "super::cost_layer_transactions::Entity")]
    CostLayerTransactions,
}

impl Related<super::cost_layers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CostLayers.def()
    }
}

impl Related<super::cost_layer_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CostLayerTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
