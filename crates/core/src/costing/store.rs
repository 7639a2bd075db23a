//! Repository traits for cost layers, the costing ledger and product configuration.
//!
//! These traits are implemented by the db crate to provide actual database
//! operations, and by [`crate::costing::memory`] for in-process use and tests.
//!
//! A costing call never writes piecemeal. It stages a [`UnitOfWork`] holding
//! every new layer, every layer mutation and exactly one ledger entry, and
//! hands it to [`CostLayerStore::commit`], which applies all of it or none of it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use stockcost_shared::types::{CostLayerId, OrganizationId, PageRequest, PageResponse, ProductId};

use super::error::CostingError;
use super::selection::LayerDraw;
use super::types::{
    CostLayer, CostLayerTransaction, LayerOrder, LayerStatus, LedgerEvent, NewCostLayer,
    ProductInfo,
};

/// A staged quantity change on one layer, guarded by the quantity last read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMutation {
    /// Layer to change.
    pub layer_id: CostLayerId,
    /// Quantity the layer must still hold for the mutation to apply.
    pub expected_quantity: Decimal,
    /// Quantity after the mutation.
    pub new_quantity: Decimal,
}

impl LayerMutation {
    /// Stages the draw of a selection plan.
    #[must_use]
    pub fn from_draw(draw: &LayerDraw) -> Self {
        Self {
            layer_id: draw.layer_id,
            expected_quantity: draw.quantity_before,
            new_quantity: draw.quantity_after(),
        }
    }

    /// Status the layer takes after the mutation: sold iff nothing remains.
    #[must_use]
    pub fn new_status(&self) -> LayerStatus {
        if self.new_quantity.is_zero() {
            LayerStatus::Sold
        } else {
            LayerStatus::Available
        }
    }

    /// Checks the optimistic precondition against the stored layer and
    /// returns the mutated copy.
    ///
    /// # Errors
    ///
    /// Returns `StaleLayer` if the layer is no longer available or its
    /// quantity changed since it was read.
    pub fn apply_to(&self, layer: &CostLayer, now: DateTime<Utc>) -> Result<CostLayer, CostingError> {
        if layer.status != LayerStatus::Available || layer.quantity != self.expected_quantity {
            return Err(CostingError::StaleLayer(self.layer_id));
        }
        let mut updated = layer.clone();
        updated.quantity = self.new_quantity;
        updated.total_cost = self.new_quantity * layer.unit_cost;
        updated.status = self.new_status();
        updated.updated_at = now;
        Ok(updated)
    }
}

/// Everything one costing call writes, committed as a single atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWork {
    /// Layers to create.
    pub new_layers: Vec<NewCostLayer>,
    /// Guarded quantity changes, applied in order.
    pub mutations: Vec<LayerMutation>,
    /// Consumable layers the selection was planned on, if the plan depends
    /// on the whole set rather than only on the layers it mutates.
    pub planned_on: Option<Vec<CostLayerId>>,
    /// The single ledger entry for the call.
    pub ledger_entry: CostLayerTransaction,
}

impl UnitOfWork {
    /// Starts a unit of work around its ledger entry.
    #[must_use]
    pub fn new(ledger_entry: CostLayerTransaction) -> Self {
        Self {
            new_layers: Vec::new(),
            mutations: Vec::new(),
            planned_on: None,
            ledger_entry,
        }
    }

    /// Product the unit of work belongs to.
    #[must_use]
    pub fn product_id(&self) -> ProductId {
        self.ledger_entry.product_id
    }

    /// Organization the unit of work belongs to.
    #[must_use]
    pub fn organization_id(&self) -> OrganizationId {
        self.ledger_entry.organization_id
    }

    /// Stages a new layer.
    #[must_use]
    pub fn insert(mut self, layer: NewCostLayer) -> Self {
        self.new_layers.push(layer);
        self
    }

    /// Stages guarded layer mutations.
    #[must_use]
    pub fn mutate(mut self, mutations: impl IntoIterator<Item = LayerMutation>) -> Self {
        self.mutations.extend(mutations);
        self
    }

    /// Requires the product's consumable layers at commit time to be exactly
    /// the ones the selection read.
    #[must_use]
    pub fn planned_on(mut self, layer_ids: impl IntoIterator<Item = CostLayerId>) -> Self {
        let mut ids: Vec<CostLayerId> = layer_ids.into_iter().collect();
        ids.sort_unstable();
        self.planned_on = Some(ids);
        self
    }

    /// Checks the selection precondition against the consumable layers found
    /// at commit time.
    ///
    /// # Errors
    ///
    /// Returns `StaleSelection` if a layer appeared or disappeared since the
    /// selection was planned.
    pub fn check_selection(&self, mut consumable: Vec<CostLayerId>) -> Result<(), CostingError> {
        let Some(planned) = &self.planned_on else {
            return Ok(());
        };
        consumable.sort_unstable();
        if *planned == consumable {
            Ok(())
        } else {
            Err(CostingError::StaleSelection(self.product_id()))
        }
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Layers created, in staging order.
    pub inserted: Vec<CostLayer>,
    /// Layers after mutation, in staging order.
    pub mutated: Vec<CostLayer>,
    /// The ledger entry as stored.
    pub transaction: CostLayerTransaction,
    /// Σ quantity of the product's consumable layers once the unit applied.
    pub remaining_quantity: Decimal,
    /// Σ total cost of the product's consumable layers once the unit applied.
    pub remaining_value: Decimal,
}

/// Durable cost layer records.
pub trait CostLayerStore: Send + Sync {
    /// Layers with status `available` and quantity > 0, ordered by purchase
    /// date then insertion sequence (both reversed for `NewestFirst`).
    fn available_layers(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        order: LayerOrder,
    ) -> impl std::future::Future<Output = Result<Vec<CostLayer>, CostingError>> + Send;

    /// Layers with the given status regardless of quantity, oldest first.
    fn layers_with_status(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        status: LayerStatus,
    ) -> impl std::future::Future<Output = Result<Vec<CostLayer>, CostingError>> + Send;

    /// Layers of the product with the given ids, any status. Unknown ids are
    /// simply absent from the result.
    fn layers_by_ids(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        ids: &[CostLayerId],
    ) -> impl std::future::Future<Output = Result<Vec<CostLayer>, CostingError>> + Send;

    /// Layers purchased in `[from, to)`, any status, oldest first.
    fn layers_purchased_between(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<CostLayer>, CostingError>> + Send;

    /// Applies a unit of work atomically and reports the remaining consumable
    /// totals as of the same commit.
    ///
    /// A mutation whose layer no longer exists fails with `NotFound`; one whose
    /// precondition no longer holds fails with `StaleLayer`, and a changed set
    /// of consumable layers fails with `StaleSelection`. Either way nothing
    /// from the unit is visible afterwards.
    fn commit(
        &self,
        work: UnitOfWork,
    ) -> impl std::future::Future<Output = Result<CommitReceipt, CostingError>> + Send;
}

/// Append-only log of costing events.
pub trait TransactionLedger: Send + Sync {
    /// Seals an event into an immutable entry. The entry becomes visible when
    /// the unit of work carrying it commits.
    fn record(&self, event: LedgerEvent) -> CostLayerTransaction {
        CostLayerTransaction::from_event(event, Utc::now())
    }

    /// Entries for a product, newest first.
    fn list(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> impl std::future::Future<Output = Result<PageResponse<CostLayerTransaction>, CostingError>>
    + Send;
}

/// Product configuration owned outside the costing engine.
pub trait ProductDirectory: Send + Sync {
    /// Looks up one product.
    fn product(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
    ) -> impl std::future::Future<Output = Result<Option<ProductInfo>, CostingError>> + Send;

    /// All products of an organization.
    fn products(
        &self,
        organization_id: OrganizationId,
    ) -> impl std::future::Future<Output = Result<Vec<ProductInfo>, CostingError>> + Send;
}
