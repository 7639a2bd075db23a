//! Read-only inventory aggregates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use stockcost_shared::types::{OrganizationId, ProductId};
use tracing::debug;

use super::error::CostingError;
use super::store::{CostLayerStore, ProductDirectory};
use super::types::{CostLayerSummary, CostingMethod, LayerStatus, ProductInfo, ProductValuation};
use super::valuation::{CostVariance, ValuationService};

/// Summaries, valuations and variances over stored layers. Never writes.
pub struct InventorySummaryService<S: CostLayerStore, P: ProductDirectory> {
    store: Arc<S>,
    products: Arc<P>,
    default_method: CostingMethod,
}

impl<S: CostLayerStore, P: ProductDirectory> InventorySummaryService<S, P> {
    /// Creates a service that reports FIFO for products with no configured method.
    #[must_use]
    pub fn new(store: Arc<S>, products: Arc<P>) -> Self {
        Self {
            store,
            products,
            default_method: CostingMethod::Fifo,
        }
    }

    /// Overrides the method reported for unconfigured products.
    #[must_use]
    pub fn with_default_method(mut self, method: CostingMethod) -> Self {
        self.default_method = method;
        self
    }

    fn method_of(&self, product: Option<&ProductInfo>) -> Result<CostingMethod, CostingError> {
        match product.and_then(|p| p.costing_method.as_deref()) {
            Some(raw) if !raw.trim().is_empty() => raw.parse(),
            _ => Ok(self.default_method),
        }
    }

    /// Totals over a product's available layers plus its configured method.
    ///
    /// # Errors
    ///
    /// - `Validation` if the product's stored method is not recognised
    /// - `Persistence` if the store or directory fails
    pub async fn summary(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
    ) -> Result<CostLayerSummary, CostingError> {
        let product = self.products.product(product_id, organization_id).await?;
        let method = self.method_of(product.as_ref())?;
        let layers = self
            .store
            .layers_with_status(product_id, organization_id, LayerStatus::Available)
            .await?;

        debug!(
            product_id = %product_id,
            organization_id = %organization_id,
            layers = layers.len(),
            "Summarising cost layers"
        );
        Ok(CostLayerSummary::from_layers(layers, method))
    }

    /// One line per product the directory knows for the organization.
    ///
    /// # Errors
    ///
    /// Same as [`InventorySummaryService::summary`].
    pub async fn valuation(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ProductValuation>, CostingError> {
        let products = self.products.products(organization_id).await?;
        let mut lines = Vec::with_capacity(products.len());

        for product in products {
            let method = self.method_of(Some(&product))?;
            let layers = self
                .store
                .layers_with_status(product.id, organization_id, LayerStatus::Available)
                .await?;
            let summary = CostLayerSummary::from_layers(layers, method);
            lines.push(ProductValuation {
                product_id: product.id,
                product_name: product.name,
                quantity_on_hand: summary.total_quantity,
                total_value: summary.total_value,
                average_unit_cost: summary.average_cost,
                method,
            });
        }

        debug!(
            organization_id = %organization_id,
            products = lines.len(),
            "Inventory valuation computed"
        );
        Ok(lines)
    }

    /// Standard cost against the weighted cost of layers purchased in `[from, to)`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the product is unknown or has no standard cost
    /// - `Persistence` if the store or directory fails
    pub async fn cost_variance(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CostVariance, CostingError> {
        let standard_cost = self
            .products
            .product(product_id, organization_id)
            .await?
            .and_then(|p| p.standard_cost)
            .ok_or_else(|| {
                CostingError::not_found(format!("Standard cost not set for product {product_id}"))
            })?;

        let layers = self
            .store
            .layers_purchased_between(product_id, organization_id, from, to)
            .await?;
        Ok(ValuationService::cost_variance(standard_cost, &layers))
    }
}
