//! Inventory costing schema.
//!
//! Creates the products directory, cost layers and the append-only
//! cost layer transaction ledger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(PRODUCTS_SQL).await?;
        db.execute_unprepared(COST_LAYERS_SQL).await?;
        db.execute_unprepared(COST_LAYER_TRANSACTIONS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            r"
DROP TABLE IF EXISTS cost_layer_transactions CASCADE;
DROP TABLE IF EXISTS cost_layers CASCADE;
DROP TABLE IF EXISTS products CASCADE;
DROP FUNCTION IF EXISTS prevent_ledger_modification() CASCADE;
DROP TYPE IF EXISTS cost_layer_transaction_type;
DROP TYPE IF EXISTS cost_layer_status;
DROP TYPE IF EXISTS costing_method;
",
        )
        .await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE costing_method AS ENUM (
    'FIFO',
    'LIFO',
    'WEIGHTED_AVERAGE',
    'SPECIFIC_IDENTIFICATION',
    'STANDARD_COST'
);

CREATE TYPE cost_layer_status AS ENUM (
    'available',
    'allocated',
    'sold',
    'expired',
    'damaged'
);

CREATE TYPE cost_layer_transaction_type AS ENUM (
    'purchase',
    'sale',
    'adjustment',
    'transfer',
    'return'
);
";

const PRODUCTS_SQL: &str = r"
-- Product directory: costing configuration per product
CREATE TABLE products (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    name VARCHAR(255) NOT NULL,
    costing_method VARCHAR(50),
    standard_cost NUMERIC CHECK (standard_cost IS NULL OR standard_cost >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_products_org ON products(organization_id, name);
";

const COST_LAYERS_SQL: &str = r"
-- Purchased lots; never deleted, quantity only shrinks through costing
CREATE TABLE cost_layers (
    id UUID PRIMARY KEY,
    sequence BIGSERIAL NOT NULL UNIQUE,
    product_id UUID NOT NULL REFERENCES products(id),
    organization_id UUID NOT NULL,
    method costing_method NOT NULL,
    quantity NUMERIC NOT NULL,
    unit_cost NUMERIC NOT NULL CHECK (unit_cost >= 0),
    total_cost NUMERIC NOT NULL,
    purchase_date TIMESTAMPTZ NOT NULL,
    purchase_order_id VARCHAR(100),
    supplier_id VARCHAR(100),
    batch_number VARCHAR(100),
    lot_number VARCHAR(100),
    serial_numbers JSONB NOT NULL DEFAULT '[]',
    expiration_date DATE,
    status cost_layer_status NOT NULL DEFAULT 'available',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_sold_is_empty CHECK (status <> 'sold' OR quantity = 0)
);

-- Layer selection: available layers per product in purchase order
CREATE INDEX idx_cost_layers_product ON cost_layers(product_id, organization_id);
CREATE INDEX idx_cost_layers_selection ON cost_layers(product_id, organization_id, purchase_date, sequence)
    WHERE status = 'available';
";

const COST_LAYER_TRANSACTIONS_SQL: &str = r"
-- Append-only costing ledger
CREATE TABLE cost_layer_transactions (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    product_id UUID NOT NULL REFERENCES products(id),
    transaction_type cost_layer_transaction_type NOT NULL,
    quantity NUMERIC NOT NULL,
    unit_cost NUMERIC NOT NULL,
    total_cost NUMERIC NOT NULL,
    method costing_method NOT NULL,
    cost_layer_ids JSONB NOT NULL DEFAULT '[]',
    reference_id VARCHAR(100),
    reference_type VARCHAR(50),
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_cost_layer_transactions_product
    ON cost_layer_transactions(product_id, organization_id, created_at DESC);

-- Ledger entries are immutable
CREATE OR REPLACE FUNCTION prevent_ledger_modification()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'cost_layer_transactions is append-only';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_cost_layer_transactions_immutable
    BEFORE UPDATE OR DELETE ON cost_layer_transactions
    FOR EACH ROW EXECUTE FUNCTION prevent_ledger_modification();
";
