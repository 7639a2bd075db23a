//! In-memory implementations of the costing repository traits.
//!
//! Used by tests and by embedders that keep inventory state in process.
//! The store and its ledger share one lock, so a unit of work is applied
//! under a single write guard and readers never observe half of it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stockcost_shared::types::{CostLayerId, OrganizationId, PageRequest, PageResponse, ProductId};
use tokio::sync::RwLock;

use super::error::CostingError;
use super::selection::LayerSelector;
use super::store::{CommitReceipt, CostLayerStore, ProductDirectory, TransactionLedger, UnitOfWork};
use super::types::{CostLayer, CostLayerTransaction, LayerOrder, LayerStatus, ProductInfo};

#[derive(Debug, Default)]
struct MemoryState {
    layers: HashMap<CostLayerId, CostLayer>,
    transactions: Vec<CostLayerTransaction>,
    next_sequence: i64,
}

impl MemoryState {
    fn product_layers(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
    ) -> impl Iterator<Item = &CostLayer> {
        self.layers
            .values()
            .filter(move |l| l.product_id == product_id && l.organization_id == organization_id)
    }
}

fn oldest_first(mut layers: Vec<CostLayer>) -> Vec<CostLayer> {
    layers.sort_by(CostLayer::cmp_oldest_first);
    layers
}

/// Cost layer store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCostingStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryCostingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger backed by the same state as this store.
    #[must_use]
    pub fn ledger(&self) -> MemoryLedger {
        MemoryLedger {
            state: Arc::clone(&self.state),
        }
    }

    /// Sets a layer's status from outside the costing engine
    /// (expiry, damage, allocation).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the layer does not exist.
    pub async fn mark_status(
        &self,
        layer_id: CostLayerId,
        status: LayerStatus,
    ) -> Result<(), CostingError> {
        let mut state = self.state.write().await;
        let layer = state
            .layers
            .get_mut(&layer_id)
            .ok_or_else(|| CostingError::not_found(format!("Cost layer {layer_id} not found")))?;
        layer.status = status;
        layer.updated_at = Utc::now();
        Ok(())
    }

    /// Current copy of one layer.
    pub async fn layer(&self, layer_id: CostLayerId) -> Option<CostLayer> {
        self.state.read().await.layers.get(&layer_id).cloned()
    }

    /// Every layer of every product, oldest first.
    pub async fn all_layers(&self) -> Vec<CostLayer> {
        let state = self.state.read().await;
        oldest_first(state.layers.values().cloned().collect())
    }

    /// Every ledger entry in append order.
    pub async fn all_transactions(&self) -> Vec<CostLayerTransaction> {
        self.state.read().await.transactions.clone()
    }
}

impl CostLayerStore for MemoryCostingStore {
    async fn available_layers(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        order: LayerOrder,
    ) -> Result<Vec<CostLayer>, CostingError> {
        let state = self.state.read().await;
        let mut layers = oldest_first(
            state
                .product_layers(product_id, organization_id)
                .filter(|l| l.is_consumable())
                .cloned()
                .collect(),
        );
        if order == LayerOrder::NewestFirst {
            layers.reverse();
        }
        Ok(layers)
    }

    async fn layers_with_status(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        status: LayerStatus,
    ) -> Result<Vec<CostLayer>, CostingError> {
        let state = self.state.read().await;
        Ok(oldest_first(
            state
                .product_layers(product_id, organization_id)
                .filter(|l| l.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn layers_by_ids(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        ids: &[CostLayerId],
    ) -> Result<Vec<CostLayer>, CostingError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.layers.get(id))
            .filter(|l| l.product_id == product_id && l.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn layers_purchased_between(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CostLayer>, CostingError> {
        let state = self.state.read().await;
        Ok(oldest_first(
            state
                .product_layers(product_id, organization_id)
                .filter(|l| l.purchase_date >= from && l.purchase_date < to)
                .cloned()
                .collect(),
        ))
    }

    async fn commit(&self, work: UnitOfWork) -> Result<CommitReceipt, CostingError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let (product_id, organization_id) = (work.product_id(), work.organization_id());

        // Validate every precondition before touching anything.
        work.check_selection(
            state
                .product_layers(product_id, organization_id)
                .filter(|l| l.is_consumable())
                .map(|l| l.id)
                .collect(),
        )?;
        let mut mutated = Vec::with_capacity(work.mutations.len());
        for mutation in &work.mutations {
            let current = state.layers.get(&mutation.layer_id).ok_or_else(|| {
                CostingError::not_found(format!("Cost layer {} not found", mutation.layer_id))
            })?;
            mutated.push(mutation.apply_to(current, now)?);
        }

        for layer in &mutated {
            state.layers.insert(layer.id, layer.clone());
        }

        let mut inserted = Vec::with_capacity(work.new_layers.len());
        for new_layer in work.new_layers {
            state.next_sequence += 1;
            let layer = new_layer.into_layer(state.next_sequence, now);
            state.layers.insert(layer.id, layer.clone());
            inserted.push(layer);
        }

        state.transactions.push(work.ledger_entry.clone());

        let remaining: Vec<CostLayer> = state
            .product_layers(product_id, organization_id)
            .cloned()
            .collect();
        let (remaining_quantity, remaining_value) = LayerSelector::available_totals(&remaining);

        Ok(CommitReceipt {
            inserted,
            mutated,
            transaction: work.ledger_entry,
            remaining_quantity,
            remaining_value,
        })
    }
}

/// Ledger view over a [`MemoryCostingStore`].
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    state: Arc<RwLock<MemoryState>>,
}

impl TransactionLedger for MemoryLedger {
    async fn list(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> Result<PageResponse<CostLayerTransaction>, CostingError> {
        let state = self.state.read().await;

        // Stable sort over reversed append order, so equal timestamps stay newest first.
        let mut newest_first: Vec<&CostLayerTransaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.product_id == product_id && t.organization_id == organization_id)
            .collect();
        newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = newest_first.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let data = newest_first
            .into_iter()
            .skip(offset)
            .take(page.per_page as usize)
            .cloned()
            .collect();

        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }
}

/// Product directory held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProductDirectory {
    products: Arc<RwLock<HashMap<(ProductId, OrganizationId), ProductInfo>>>,
}

impl MemoryProductDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a product.
    pub async fn upsert(&self, product: ProductInfo) {
        self.products
            .write()
            .await
            .insert((product.id, product.organization_id), product);
    }
}

impl ProductDirectory for MemoryProductDirectory {
    async fn product(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
    ) -> Result<Option<ProductInfo>, CostingError> {
        Ok(self
            .products
            .read()
            .await
            .get(&(product_id, organization_id))
            .cloned())
    }

    async fn products(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ProductInfo>, CostingError> {
        let mut products: Vec<ProductInfo> = self
            .products
            .read()
            .await
            .values()
            .filter(|p| p.organization_id == organization_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costing::store::LayerMutation;
    use crate::costing::types::{
        AddCostLayerInput, AdjustCostLayerInput, AdjustmentDirection, CostingMethod,
        LayerTransactionType, LedgerEvent, NewCostLayer,
    };
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn purchase(
        product: ProductId,
        org: OrganizationId,
        quantity: Decimal,
        day: u32,
    ) -> NewCostLayer {
        NewCostLayer::purchase(AddCostLayerInput::new(
            product,
            org,
            CostingMethod::Fifo,
            quantity,
            dec!(2),
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        ))
        .unwrap()
    }

    fn entry(product: ProductId, org: OrganizationId) -> CostLayerTransaction {
        CostLayerTransaction::from_event(
            LedgerEvent {
                organization_id: org,
                product_id: product,
                transaction_type: LayerTransactionType::Purchase,
                quantity: dec!(1),
                unit_cost: dec!(2),
                total_cost: dec!(2),
                method: CostingMethod::Fifo,
                cost_layer_ids: vec![],
                reference_id: None,
                reference_type: None,
                notes: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_available_layers_break_date_ties_by_sequence() {
        let store = MemoryCostingStore::new();
        let (product, org) = (ProductId::new(), OrganizationId::new());
        let first = purchase(product, org, dec!(1), 5);
        let second = purchase(product, org, dec!(2), 5);
        let earlier = purchase(product, org, dec!(3), 1);
        let ids = [first.id, second.id, earlier.id];
        store
            .commit(
                UnitOfWork::new(entry(product, org))
                    .insert(first)
                    .insert(second)
                    .insert(earlier),
            )
            .await
            .unwrap();

        let oldest = store
            .available_layers(product, org, LayerOrder::OldestFirst)
            .await
            .unwrap();
        let oldest_ids: Vec<_> = oldest.iter().map(|l| l.id).collect();
        assert_eq!(oldest_ids, vec![ids[2], ids[0], ids[1]]);

        let newest = store
            .available_layers(product, org, LayerOrder::NewestFirst)
            .await
            .unwrap();
        let newest_ids: Vec<_> = newest.iter().map(|l| l.id).collect();
        assert_eq!(newest_ids, vec![ids[1], ids[0], ids[2]]);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryCostingStore::new();
        let (product, org) = (ProductId::new(), OrganizationId::new());
        let layer = purchase(product, org, dec!(10), 1);
        let layer_id = layer.id;
        store
            .commit(UnitOfWork::new(entry(product, org)).insert(layer))
            .await
            .unwrap();

        let work = UnitOfWork::new(entry(product, org))
            .insert(purchase(product, org, dec!(4), 2))
            .mutate([
                LayerMutation {
                    layer_id,
                    expected_quantity: dec!(10),
                    new_quantity: dec!(5),
                },
                LayerMutation {
                    layer_id: CostLayerId::new(),
                    expected_quantity: dec!(1),
                    new_quantity: dec!(0),
                },
            ]);
        let err = store.commit(work).await.unwrap_err();
        assert!(matches!(err, CostingError::NotFound(_)));

        assert_eq!(store.all_layers().await.len(), 1);
        assert_eq!(store.layer(layer_id).await.unwrap().quantity, dec!(10));
        assert_eq!(store.all_transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_rejects_changed_layer_set() {
        let store = MemoryCostingStore::new();
        let (product, org) = (ProductId::new(), OrganizationId::new());
        let layer = purchase(product, org, dec!(10), 2);
        let layer_id = layer.id;
        store
            .commit(UnitOfWork::new(entry(product, org)).insert(layer))
            .await
            .unwrap();
        store
            .commit(UnitOfWork::new(entry(product, org)).insert(purchase(product, org, dec!(3), 1)))
            .await
            .unwrap();

        let work = UnitOfWork::new(entry(product, org))
            .mutate([LayerMutation {
                layer_id,
                expected_quantity: dec!(10),
                new_quantity: dec!(6),
            }])
            .planned_on([layer_id]);
        let err = store.commit(work).await.unwrap_err();
        assert_eq!(err, CostingError::StaleSelection(product));
        assert_eq!(store.layer(layer_id).await.unwrap().quantity, dec!(10));
        assert_eq!(store.all_transactions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_receipt_totals_skip_negative_layers() {
        let store = MemoryCostingStore::new();
        let (product, org) = (ProductId::new(), OrganizationId::new());
        let shortfall = NewCostLayer::adjustment(
            &AdjustCostLayerInput {
                product_id: product,
                organization_id: org,
                direction: AdjustmentDirection::Decrease,
                quantity: dec!(3),
                unit_cost: dec!(2),
                reason: "Count".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        let receipt = store
            .commit(
                UnitOfWork::new(entry(product, org))
                    .insert(purchase(product, org, dec!(10), 1))
                    .insert(shortfall),
            )
            .await
            .unwrap();
        assert_eq!(receipt.remaining_quantity, dec!(10));
        assert_eq!(receipt.remaining_value, dec!(20));
    }

    #[tokio::test]
    async fn test_mark_status_hides_layer_from_selection() {
        let store = MemoryCostingStore::new();
        let (product, org) = (ProductId::new(), OrganizationId::new());
        let layer = purchase(product, org, dec!(10), 1);
        let layer_id = layer.id;
        store
            .commit(UnitOfWork::new(entry(product, org)).insert(layer))
            .await
            .unwrap();

        store.mark_status(layer_id, LayerStatus::Damaged).await.unwrap();
        let available = store
            .available_layers(product, org, LayerOrder::OldestFirst)
            .await
            .unwrap();
        assert!(available.is_empty());

        let damaged = store
            .layers_with_status(product, org, LayerStatus::Damaged)
            .await
            .unwrap();
        assert_eq!(damaged.len(), 1);
    }

    #[tokio::test]
    async fn test_layers_by_ids_scoped_to_product() {
        let store = MemoryCostingStore::new();
        let (product, org) = (ProductId::new(), OrganizationId::new());
        let other = ProductId::new();
        let mine = purchase(product, org, dec!(1), 1);
        let theirs = purchase(other, org, dec!(1), 1);
        let ids = vec![mine.id, theirs.id, CostLayerId::new()];
        store
            .commit(UnitOfWork::new(entry(product, org)).insert(mine).insert(theirs))
            .await
            .unwrap();

        let found = store.layers_by_ids(product, org, &ids).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_ledger_pages_newest_first() {
        let store = MemoryCostingStore::new();
        let ledger = store.ledger();
        let (product, org) = (ProductId::new(), OrganizationId::new());
        let mut written = Vec::new();
        for _ in 0..5 {
            let tx = entry(product, org);
            written.push(tx.id);
            store.commit(UnitOfWork::new(tx)).await.unwrap();
        }
        store
            .commit(UnitOfWork::new(entry(ProductId::new(), org)))
            .await
            .unwrap();

        let page = ledger
            .list(product, org, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.meta.total, 5);
        assert_eq!(page.meta.total_pages, 3);
        assert_eq!(page.data[0].id, written[4]);
        assert_eq!(page.data[1].id, written[3]);

        let last = ledger
            .list(product, org, PageRequest::new(3, 2))
            .await
            .unwrap();
        assert_eq!(last.data.len(), 1);
        assert_eq!(last.data[0].id, written[0]);
    }
}
