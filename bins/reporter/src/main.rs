//! Stockcost valuation report.
//!
//! Prints the inventory valuation of one organization as JSON:
//!
//! ```text
//! stockcost-report <organization-id>
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockcost_core::costing::{CostingMethod, InventorySummaryService};
use stockcost_db::{CostLayerRepository, ProductRepository, connect_with};
use stockcost_shared::AppConfig;
use stockcost_shared::types::OrganizationId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockcost=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let organization_id: OrganizationId = std::env::args()
        .nth(1)
        .context("usage: stockcost-report <organization-id>")?
        .parse()
        .context("organization id must be a UUID")?;

    let config = AppConfig::load().context("Failed to load configuration")?;
    let default_method: CostingMethod = config.costing.default_method.parse()?;

    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    let service = InventorySummaryService::new(
        Arc::new(CostLayerRepository::new(db.clone())),
        Arc::new(ProductRepository::new(db)),
    )
    .with_default_method(default_method);

    let valuation = service.valuation(organization_id).await?;
    info!(
        organization_id = %organization_id,
        products = valuation.len(),
        "Valuation computed"
    );

    println!("{}", serde_json::to_string_pretty(&valuation)?);
    Ok(())
}
