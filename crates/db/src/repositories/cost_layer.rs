//! Cost layer repository for database operations.
//!
//! Implements [`CostLayerStore`] using SeaORM. A unit of work runs in one
//! database transaction that first locks the product row with
//! `SELECT ... FOR UPDATE`, so writers for one product queue up across
//! processes. Under that lock the consumable layer set and every staged
//! mutation are checked against what the engine read; a concurrent writer
//! surfaces as `StaleSelection` or `StaleLayer` and the whole transaction
//! rolls back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, NotSet, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use stockcost_core::costing::{
    CommitReceipt, CostLayer, CostLayerStore, CostLayerTransaction, CostingError, LayerOrder,
    LayerStatus, NewCostLayer, UnitOfWork,
};
use stockcost_shared::types::{CostLayerId, OrganizationId, ProductId};
use tracing::{debug, warn};
use uuid::Uuid;

use super::convert::{
    from_db_method, from_db_status, persistence, to_db_method, to_db_status,
    to_db_transaction_type,
};
use crate::entities::{cost_layer_transactions, cost_layers, products};

/// Cost layer repository implementation.
#[derive(Debug, Clone)]
pub struct CostLayerRepository {
    db: DatabaseConnection,
}

impl CostLayerRepository {
    /// Create a new cost layer repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Sets a layer's status on behalf of an outside inventory process.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the layer does not exist, `Persistence` if the
    /// update fails.
    pub async fn mark_status(
        &self,
        layer_id: CostLayerId,
        status: LayerStatus,
    ) -> Result<(), CostingError> {
        let model = cost_layers::Entity::find_by_id(layer_id.into_inner())
            .one(&self.db)
            .await
            .map_err(persistence)?
            .ok_or_else(|| CostingError::not_found(format!("Cost layer {layer_id} not found")))?;

        let mut active = model.into_active_model();
        active.status = Set(to_db_status(status));
        active.updated_at = Set(Utc::now().into());
        active.update(&self.db).await.map_err(persistence)?;
        Ok(())
    }

    async fn find_layers(
        &self,
        query: sea_orm::Select<cost_layers::Entity>,
    ) -> Result<Vec<CostLayer>, CostingError> {
        let models = query.all(&self.db).await.map_err(persistence)?;
        models.into_iter().map(to_domain).collect()
    }
}

async fn apply_unit(
    txn: &DatabaseTransaction,
    work: UnitOfWork,
) -> Result<CommitReceipt, CostingError> {
    let now = Utc::now();
    let (product_id, organization_id) = (work.product_id(), work.organization_id());

    products::Entity::find_by_id(product_id.into_inner())
        .filter(products::Column::OrganizationId.eq(organization_id.into_inner()))
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(persistence)?
        .ok_or_else(|| CostingError::not_found(format!("Product {product_id} not found")))?;

    if work.planned_on.is_some() {
        let consumable: Vec<Uuid> = consumable_scope(product_id, organization_id)
            .select_only()
            .column(cost_layers::Column::Id)
            .into_tuple()
            .all(txn)
            .await
            .map_err(persistence)?;
        work.check_selection(consumable.into_iter().map(CostLayerId::from_uuid).collect())?;
    }

    let mut mutated = Vec::with_capacity(work.mutations.len());
    for mutation in &work.mutations {
        let current = cost_layers::Entity::find_by_id(mutation.layer_id.into_inner())
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                CostingError::not_found(format!("Cost layer {} not found", mutation.layer_id))
            })?;

        let updated = mutation.apply_to(&to_domain(current.clone())?, now)?;
        let mut active = current.into_active_model();
        active.quantity = Set(updated.quantity);
        active.total_cost = Set(updated.total_cost);
        active.status = Set(to_db_status(updated.status));
        active.updated_at = Set(now.into());
        active.update(txn).await.map_err(persistence)?;
        mutated.push(updated);
    }

    let mut inserted = Vec::with_capacity(work.new_layers.len());
    for layer in work.new_layers {
        let model = to_active_layer(layer, now)?
            .insert(txn)
            .await
            .map_err(persistence)?;
        inserted.push(to_domain(model)?);
    }

    to_active_transaction(&work.ledger_entry)?
        .insert(txn)
        .await
        .map_err(persistence)?;

    let remaining: Vec<(Decimal, Decimal)> = consumable_scope(product_id, organization_id)
        .select_only()
        .column(cost_layers::Column::Quantity)
        .column(cost_layers::Column::TotalCost)
        .into_tuple()
        .all(txn)
        .await
        .map_err(persistence)?;
    let (remaining_quantity, remaining_value) = remaining
        .into_iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(qty, value), (q, v)| {
            (qty + q, value + v)
        });

    Ok(CommitReceipt {
        inserted,
        mutated,
        transaction: work.ledger_entry,
        remaining_quantity,
        remaining_value,
    })
}

fn product_scope(
    product_id: ProductId,
    organization_id: OrganizationId,
) -> sea_orm::Select<cost_layers::Entity> {
    cost_layers::Entity::find()
        .filter(cost_layers::Column::ProductId.eq(product_id.into_inner()))
        .filter(cost_layers::Column::OrganizationId.eq(organization_id.into_inner()))
}

/// Layers that can feed a sale: available with a positive quantity.
fn consumable_scope(
    product_id: ProductId,
    organization_id: OrganizationId,
) -> sea_orm::Select<cost_layers::Entity> {
    product_scope(product_id, organization_id)
        .filter(cost_layers::Column::Status.eq(to_db_status(LayerStatus::Available)))
        .filter(cost_layers::Column::Quantity.gt(Decimal::ZERO))
}

impl CostLayerStore for CostLayerRepository {
    async fn available_layers(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        order: LayerOrder,
    ) -> Result<Vec<CostLayer>, CostingError> {
        let query = consumable_scope(product_id, organization_id);
        let query = match order {
            LayerOrder::OldestFirst => query
                .order_by_asc(cost_layers::Column::PurchaseDate)
                .order_by_asc(cost_layers::Column::Sequence),
            LayerOrder::NewestFirst => query
                .order_by_desc(cost_layers::Column::PurchaseDate)
                .order_by_desc(cost_layers::Column::Sequence),
        };

        let layers = self.find_layers(query).await?;
        debug!(
            product_id = %product_id,
            organization_id = %organization_id,
            layers = layers.len(),
            "Loaded available cost layers"
        );
        Ok(layers)
    }

    async fn layers_with_status(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        status: LayerStatus,
    ) -> Result<Vec<CostLayer>, CostingError> {
        let query = product_scope(product_id, organization_id)
            .filter(cost_layers::Column::Status.eq(to_db_status(status)))
            .order_by_asc(cost_layers::Column::PurchaseDate)
            .order_by_asc(cost_layers::Column::Sequence);
        self.find_layers(query).await
    }

    async fn layers_by_ids(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        ids: &[CostLayerId],
    ) -> Result<Vec<CostLayer>, CostingError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = product_scope(product_id, organization_id)
            .filter(cost_layers::Column::Id.is_in(ids.iter().map(|id| id.into_inner())));
        self.find_layers(query).await
    }

    async fn layers_purchased_between(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CostLayer>, CostingError> {
        let query = product_scope(product_id, organization_id)
            .filter(cost_layers::Column::PurchaseDate.gte(from))
            .filter(cost_layers::Column::PurchaseDate.lt(to))
            .order_by_asc(cost_layers::Column::PurchaseDate)
            .order_by_asc(cost_layers::Column::Sequence);
        self.find_layers(query).await
    }

    async fn commit(&self, work: UnitOfWork) -> Result<CommitReceipt, CostingError> {
        let ledger_id = work.ledger_entry.id;
        let txn = self.db.begin().await.map_err(persistence)?;

        // Dropping the transaction on error rolls it back.
        let receipt = apply_unit(&txn, work).await.inspect_err(|e| {
            if e.is_retryable() {
                warn!(transaction_id = %ledger_id, error = %e, "Cost layer commit rejected");
            }
        })?;

        txn.commit().await.map_err(persistence)?;
        Ok(receipt)
    }
}

/// Convert database model to domain layer.
fn to_domain(model: cost_layers::Model) -> Result<CostLayer, CostingError> {
    let serial_numbers: Vec<String> = serde_json::from_value(model.serial_numbers)
        .map_err(|e| CostingError::persistence(e.to_string()))?;

    Ok(CostLayer {
        id: CostLayerId::from_uuid(model.id),
        product_id: ProductId::from_uuid(model.product_id),
        organization_id: OrganizationId::from_uuid(model.organization_id),
        method: from_db_method(model.method),
        quantity: model.quantity,
        unit_cost: model.unit_cost,
        total_cost: model.total_cost,
        purchase_date: model.purchase_date.with_timezone(&Utc),
        purchase_order_id: model.purchase_order_id,
        supplier_id: model.supplier_id,
        batch_number: model.batch_number,
        lot_number: model.lot_number,
        serial_numbers,
        expiration_date: model.expiration_date,
        status: from_db_status(model.status),
        sequence: model.sequence,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn to_active_layer(
    layer: NewCostLayer,
    now: DateTime<Utc>,
) -> Result<cost_layers::ActiveModel, CostingError> {
    let serial_numbers = serde_json::to_value(&layer.serial_numbers)
        .map_err(|e| CostingError::persistence(e.to_string()))?;

    Ok(cost_layers::ActiveModel {
        id: Set(layer.id.into_inner()),
        sequence: NotSet,
        product_id: Set(layer.product_id.into_inner()),
        organization_id: Set(layer.organization_id.into_inner()),
        method: Set(to_db_method(layer.method)),
        quantity: Set(layer.quantity),
        unit_cost: Set(layer.unit_cost),
        total_cost: Set(layer.total_cost),
        purchase_date: Set(layer.purchase_date.into()),
        purchase_order_id: Set(layer.purchase_order_id),
        supplier_id: Set(layer.supplier_id),
        batch_number: Set(layer.batch_number),
        lot_number: Set(layer.lot_number),
        serial_numbers: Set(serial_numbers),
        expiration_date: Set(layer.expiration_date),
        status: Set(to_db_status(LayerStatus::Available)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    })
}

fn to_active_transaction(
    entry: &CostLayerTransaction,
) -> Result<cost_layer_transactions::ActiveModel, CostingError> {
    let layer_ids: Vec<Uuid> = entry
        .cost_layer_ids
        .iter()
        .map(|id| id.into_inner())
        .collect();
    let cost_layer_ids =
        serde_json::to_value(layer_ids).map_err(|e| CostingError::persistence(e.to_string()))?;

    Ok(cost_layer_transactions::ActiveModel {
        id: Set(entry.id.into_inner()),
        organization_id: Set(entry.organization_id.into_inner()),
        product_id: Set(entry.product_id.into_inner()),
        transaction_type: Set(to_db_transaction_type(entry.transaction_type)),
        quantity: Set(entry.quantity),
        unit_cost: Set(entry.unit_cost),
        total_cost: Set(entry.total_cost),
        method: Set(to_db_method(entry.method)),
        cost_layer_ids: Set(cost_layer_ids),
        reference_id: Set(entry.reference_id.clone()),
        reference_type: Set(entry.reference_type.clone()),
        notes: Set(entry.notes.clone()),
        created_at: Set(entry.created_at.into()),
    })
}

