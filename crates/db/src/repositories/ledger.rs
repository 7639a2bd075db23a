//! Costing ledger repository.
//!
//! Entries are written by [`super::CostLayerRepository::commit`] inside the
//! same database transaction as the layer changes they describe; this
//! repository only reads them back.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use stockcost_core::costing::{CostLayerTransaction, CostingError, TransactionLedger};
use stockcost_shared::types::{
    CostLayerId, LayerTransactionId, OrganizationId, PageRequest, PageResponse, ProductId,
};

use super::convert::{from_db_method, from_db_transaction_type, persistence};
use crate::entities::cost_layer_transactions;

/// Ledger repository implementation.
#[derive(Debug, Clone)]
pub struct CostLedgerRepository {
    db: DatabaseConnection,
}

impl CostLedgerRepository {
    /// Create a new ledger repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl TransactionLedger for CostLedgerRepository {
    async fn list(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> Result<PageResponse<CostLayerTransaction>, CostingError> {
        let query = cost_layer_transactions::Entity::find()
            .filter(cost_layer_transactions::Column::ProductId.eq(product_id.into_inner()))
            .filter(
                cost_layer_transactions::Column::OrganizationId.eq(organization_id.into_inner()),
            );

        let total = query.clone().count(&self.db).await.map_err(persistence)?;

        // Ids are UUID v7, so they break created_at ties in write order.
        let models = query
            .order_by_desc(cost_layer_transactions::Column::CreatedAt)
            .order_by_desc(cost_layer_transactions::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(persistence)?;

        let data = models
            .into_iter()
            .map(to_domain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }
}

fn to_domain(model: cost_layer_transactions::Model) -> Result<CostLayerTransaction, CostingError> {
    let layer_ids: Vec<uuid::Uuid> = serde_json::from_value(model.cost_layer_ids)
        .map_err(|e| CostingError::persistence(e.to_string()))?;

    Ok(CostLayerTransaction {
        id: LayerTransactionId::from_uuid(model.id),
        organization_id: OrganizationId::from_uuid(model.organization_id),
        product_id: ProductId::from_uuid(model.product_id),
        transaction_type: from_db_transaction_type(model.transaction_type),
        quantity: model.quantity,
        unit_cost: model.unit_cost,
        total_cost: model.total_cost,
        method: from_db_method(model.method),
        cost_layer_ids: layer_ids.into_iter().map(CostLayerId::from_uuid).collect(),
        reference_id: model.reference_id,
        reference_type: model.reference_type,
        notes: model.notes,
        created_at: model.created_at.with_timezone(&Utc),
    })
}
