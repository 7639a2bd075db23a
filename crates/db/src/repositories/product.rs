//! Product directory repository.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use stockcost_core::costing::{CostingError, ProductDirectory, ProductInfo};
use stockcost_shared::types::{OrganizationId, ProductId};

use super::convert::persistence;
use crate::entities::products;

/// Product repository implementation.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    db: DatabaseConnection,
}

impl ProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a product.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the insert fails.
    pub async fn create(&self, product: ProductInfo) -> Result<ProductInfo, CostingError> {
        let now = Utc::now();
        let model = products::ActiveModel {
            id: Set(product.id.into_inner()),
            organization_id: Set(product.organization_id.into_inner()),
            name: Set(product.name),
            costing_method: Set(product.costing_method),
            standard_cost: Set(product.standard_cost),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&self.db)
        .await
        .map_err(persistence)?;

        Ok(to_domain(model))
    }
}

impl ProductDirectory for ProductRepository {
    async fn product(
        &self,
        product_id: ProductId,
        organization_id: OrganizationId,
    ) -> Result<Option<ProductInfo>, CostingError> {
        let model = products::Entity::find_by_id(product_id.into_inner())
            .filter(products::Column::OrganizationId.eq(organization_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(persistence)?;

        Ok(model.map(to_domain))
    }

    async fn products(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ProductInfo>, CostingError> {
        let models = products::Entity::find()
            .filter(products::Column::OrganizationId.eq(organization_id.into_inner()))
            .order_by_asc(products::Column::Name)
            .all(&self.db)
            .await
            .map_err(persistence)?;

        Ok(models.into_iter().map(to_domain).collect())
    }
}

fn to_domain(model: products::Model) -> ProductInfo {
    ProductInfo {
        id: ProductId::from_uuid(model.id),
        organization_id: OrganizationId::from_uuid(model.organization_id),
        name: model.name,
        costing_method: model.costing_method,
        standard_cost: model.standard_cost,
    }
}
