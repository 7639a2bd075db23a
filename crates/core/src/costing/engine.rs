//! Costing engine.
//!
//! Every write goes through the same protocol: read a snapshot, compute,
//! stage one [`UnitOfWork`] with exactly one ledger entry, commit. Calls on
//! the same (product, organization) are serialized by an async mutex held for
//! the whole read-compute-commit. Writers outside this engine are caught by
//! the optimistic precondition on each layer mutation and on the set of
//! consumable layers a selection was planned on; a rejected commit restarts
//! the call from the read step.
//!
//! The remaining quantity and value reported with a sale come from the
//! commit itself, so a call that returns an error has written nothing.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use stockcost_shared::config::CostingConfig;
use stockcost_shared::types::{CostLayerId, OrganizationId, PageRequest, PageResponse, ProductId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::CostingError;
use super::selection::{ConsumptionPlan, LayerSelector};
use super::store::{CostLayerStore, LayerMutation, TransactionLedger, UnitOfWork};
use super::types::{
    AddCostLayerInput, AdjustCostLayerInput, CogsCalculation, CogsRequest, CostLayer,
    CostLayerTransaction, CostingMethod, LayerOrder, LayerTransactionType, LedgerEvent,
    NewCostLayer,
};

/// Retry policy for optimistic commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attempts per call, at least 1.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles after each further one.
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

impl From<&CostingConfig> for EngineConfig {
    fn from(config: &CostingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

type LayerKey = (ProductId, OrganizationId);

/// Computes cost of goods sold and books every layer change with its ledger entry.
pub struct CostingEngine<S: CostLayerStore, L: TransactionLedger> {
    store: Arc<S>,
    ledger: Arc<L>,
    config: EngineConfig,
    locks: DashMap<LayerKey, Arc<Mutex<()>>>,
}

impl<S: CostLayerStore, L: TransactionLedger> CostingEngine<S, L> {
    /// Creates an engine with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self::with_config(store, ledger, EngineConfig::default())
    }

    /// Creates an engine with an explicit retry policy.
    #[must_use]
    pub fn with_config(store: Arc<S>, ledger: Arc<L>, config: EngineConfig) -> Self {
        Self {
            store,
            ledger,
            config: EngineConfig {
                max_attempts: config.max_attempts.max(1),
                ..config
            },
            locks: DashMap::new(),
        }
    }

    /// Runs `work` while holding the key's mutex, then drops the key's entry
    /// if no other call is waiting on it.
    async fn serialized<T>(
        &self,
        key: LayerKey,
        work: impl Future<Output = Result<T, CostingError>>,
    ) -> Result<T, CostingError> {
        let lock = Arc::clone(&self.locks.entry(key).or_default());
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.locks.remove_if(&key, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.locks.len()
    }

    /// Records a purchased lot as a new available layer together with its
    /// `purchase` ledger entry.
    ///
    /// # Errors
    ///
    /// - `Validation` if quantity or unit cost is negative, or their product
    ///   is out of range
    /// - `Persistence` if the store fails
    pub async fn add_cost_layer(&self, input: AddCostLayerInput) -> Result<CostLayer, CostingError> {
        input.validate()?;
        let key = (input.product_id, input.organization_id);
        self.serialized(key, self.insert_purchase(input)).await
    }

    async fn insert_purchase(&self, input: AddCostLayerInput) -> Result<CostLayer, CostingError> {
        let layer = NewCostLayer::purchase(input)?;
        let reference_type = layer
            .purchase_order_id
            .as_ref()
            .map(|_| "purchase_order".to_string());
        let entry = self.ledger.record(LedgerEvent {
            organization_id: layer.organization_id,
            product_id: layer.product_id,
            transaction_type: LayerTransactionType::Purchase,
            quantity: layer.quantity,
            unit_cost: layer.unit_cost,
            total_cost: layer.total_cost,
            method: layer.method,
            cost_layer_ids: vec![layer.id],
            reference_id: layer.purchase_order_id.clone(),
            reference_type,
            notes: None,
        });

        let receipt = self.store.commit(UnitOfWork::new(entry).insert(layer)).await?;
        let layer = receipt
            .inserted
            .into_iter()
            .next()
            .ok_or_else(|| CostingError::persistence("Commit returned no cost layer"))?;

        info!(
            product_id = %layer.product_id,
            organization_id = %layer.organization_id,
            layer_id = %layer.id,
            quantity = %layer.quantity,
            unit_cost = %layer.unit_cost,
            "Cost layer added"
        );
        Ok(layer)
    }

    /// Computes and books cost of goods sold.
    ///
    /// A commit rejected by a stale precondition restarts the call from a
    /// fresh read, up to `max_attempts` times with exponential backoff.
    ///
    /// # Errors
    ///
    /// - `Validation` if the quantity is not positive, no ids were given
    ///   for specific identification, or the standard cost is negative
    /// - `NotFound` if there are no available layers, a named layer is
    ///   missing or unavailable, or a standard-cost request carries no
    ///   standard cost
    /// - `InsufficientInventory` if the available quantity is short
    /// - `Concurrency` if every attempt was rejected
    /// - `Persistence` if the store fails; never retried
    pub async fn compute_cogs(&self, request: CogsRequest) -> Result<CogsCalculation, CostingError> {
        let key = (request.product_id, request.organization_id);
        self.serialized(key, self.compute_with_retry(&request)).await
    }

    async fn compute_with_retry(&self, request: &CogsRequest) -> Result<CogsCalculation, CostingError> {
        let max_attempts = self.config.max_attempts;
        for attempt in 1..=max_attempts {
            match self.try_compute_cogs(request).await {
                Ok(calculation) => return Ok(calculation),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self
                        .config
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        product_id = %request.product_id,
                        organization_id = %request.organization_id,
                        method = %request.method,
                        attempt,
                        error = %e,
                        "Cost layer changed during costing, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if e.is_retryable() => break,
                Err(e) => return Err(e),
            }
        }

        warn!(
            product_id = %request.product_id,
            organization_id = %request.organization_id,
            attempts = max_attempts,
            "Costing abandoned after repeated concurrent modification"
        );
        Err(CostingError::Concurrency {
            attempts: max_attempts,
        })
    }

    async fn try_compute_cogs(&self, request: &CogsRequest) -> Result<CogsCalculation, CostingError> {
        let (plan, planned_on) = self.plan(request).await?;
        let quantity_sold = plan.quantity;
        let average_unit_cost = plan.average_unit_cost();

        let entry = self.ledger.record(LedgerEvent {
            organization_id: request.organization_id,
            product_id: request.product_id,
            transaction_type: LayerTransactionType::Sale,
            quantity: quantity_sold,
            unit_cost: average_unit_cost,
            total_cost: plan.total_cogs,
            method: request.method,
            cost_layer_ids: plan.layer_ids(),
            reference_id: request.reference_id.clone(),
            reference_type: request.reference_type.clone(),
            notes: request.notes.clone(),
        });
        let mut work =
            UnitOfWork::new(entry).mutate(plan.draws.iter().map(LayerMutation::from_draw));
        if let Some(layer_ids) = planned_on {
            work = work.planned_on(layer_ids);
        }
        let receipt = self.store.commit(work).await?;

        info!(
            product_id = %request.product_id,
            organization_id = %request.organization_id,
            method = %request.method,
            quantity_sold = %quantity_sold,
            total_cogs = %plan.total_cogs,
            layers = plan.draws.len(),
            "COGS booked"
        );

        Ok(CogsCalculation {
            product_id: request.product_id,
            organization_id: request.organization_id,
            method: request.method,
            quantity_sold,
            total_cogs: plan.total_cogs,
            average_unit_cost,
            remaining_quantity: receipt.remaining_quantity,
            remaining_value: receipt.remaining_value,
            layers_used: plan.draws.iter().map(|d| d.consumption()).collect(),
            transaction_id: receipt.transaction.id,
            calculated_at: receipt.transaction.created_at,
        })
    }

    /// Selects the draws for a request, together with the consumable layer
    /// set the selection depends on.
    async fn plan(
        &self,
        request: &CogsRequest,
    ) -> Result<(ConsumptionPlan, Option<Vec<CostLayerId>>), CostingError> {
        let (product_id, organization_id) = (request.product_id, request.organization_id);
        match request.method {
            CostingMethod::Fifo | CostingMethod::Lifo | CostingMethod::WeightedAverage => {
                if request.quantity <= Decimal::ZERO {
                    return Err(CostingError::validation("Quantity to sell must be positive"));
                }
                let order = if request.method == CostingMethod::Lifo {
                    LayerOrder::NewestFirst
                } else {
                    LayerOrder::OldestFirst
                };
                let layers = self
                    .store
                    .available_layers(product_id, organization_id, order)
                    .await?;
                debug!(
                    product_id = %product_id,
                    organization_id = %organization_id,
                    layers = layers.len(),
                    "Loaded available cost layers"
                );
                let plan = if request.method == CostingMethod::WeightedAverage {
                    LayerSelector::weighted_average(&layers, request.quantity)?
                } else {
                    LayerSelector::consume_in_order(&layers, request.quantity)?
                };
                Ok((plan, Some(layers.iter().map(|l| l.id).collect())))
            }
            CostingMethod::SpecificIdentification => {
                let mut seen = HashSet::new();
                let ids: Vec<CostLayerId> = request
                    .layer_ids
                    .iter()
                    .copied()
                    .filter(|id| seen.insert(*id))
                    .collect();
                if ids.is_empty() {
                    return Err(CostingError::validation(
                        "Specific identification requires at least one cost layer id",
                    ));
                }

                let found = self
                    .store
                    .layers_by_ids(product_id, organization_id, &ids)
                    .await?;
                let mut layers = Vec::with_capacity(ids.len());
                for id in &ids {
                    let layer = found
                        .iter()
                        .find(|l| l.id == *id)
                        .ok_or_else(|| CostingError::not_found(format!("Cost layer {id} not found")))?;
                    layers.push(layer.clone());
                }
                Ok((LayerSelector::specific(&layers)?, None))
            }
            CostingMethod::StandardCost => Ok((
                LayerSelector::standard_cost(request.quantity, request.standard_cost)?,
                None,
            )),
        }
    }

    /// Books a manual correction as a new signed weighted-average layer with
    /// an `adjustment` ledger entry carrying the reason.
    ///
    /// # Errors
    ///
    /// - `Validation` on a non-positive quantity, negative cost or blank reason
    /// - `Persistence` if the store fails
    pub async fn adjust_cost_layer(
        &self,
        input: AdjustCostLayerInput,
    ) -> Result<CostLayer, CostingError> {
        input.validate()?;
        let key = (input.product_id, input.organization_id);
        self.serialized(key, self.insert_adjustment(input)).await
    }

    async fn insert_adjustment(&self, input: AdjustCostLayerInput) -> Result<CostLayer, CostingError> {
        let layer = NewCostLayer::adjustment(&input, Utc::now())?;
        let entry = self.ledger.record(LedgerEvent {
            organization_id: layer.organization_id,
            product_id: layer.product_id,
            transaction_type: LayerTransactionType::Adjustment,
            quantity: layer.quantity,
            unit_cost: layer.unit_cost,
            total_cost: layer.total_cost,
            method: layer.method,
            cost_layer_ids: vec![layer.id],
            reference_id: None,
            reference_type: None,
            notes: Some(input.reason),
        });

        let receipt = self.store.commit(UnitOfWork::new(entry).insert(layer)).await?;
        let layer = receipt
            .inserted
            .into_iter()
            .next()
            .ok_or_else(|| CostingError::persistence("Commit returned no cost layer"))?;

        info!(
            product_id = %layer.product_id,
            organization_id = %layer.organization_id,
            layer_id = %layer.id,
            quantity = %layer.quantity,
            "Cost layer adjusted"
        );
        Ok(layer)
    }

    /// Ledger entries for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the ledger cannot be read.
    pub async fn cost_layer_transactions(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> Result<PageResponse<CostLayerTransaction>, CostingError> {
        self.ledger.list(product_id, organization_id, page).await
    }
}
