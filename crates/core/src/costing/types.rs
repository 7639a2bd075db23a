//! Costing domain types.
//!
//! Quantities and money are `Decimal` throughout. A layer's `total_cost` is
//! always `quantity * unit_cost`; every constructor and mutation in this
//! module recomputes it rather than trusting a caller-supplied value.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockcost_shared::types::{CostLayerId, LayerTransactionId, OrganizationId, ProductId};

use super::error::CostingError;

/// Inventory costing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostingMethod {
    /// First in, first out.
    Fifo,
    /// Last in, first out.
    Lifo,
    /// Blended cost across all available layers.
    WeightedAverage,
    /// Explicitly named layers.
    SpecificIdentification,
    /// The product's standard cost per unit; consumes no layers.
    StandardCost,
}

impl CostingMethod {
    /// Returns the canonical string form stored by the product directory.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
            Self::WeightedAverage => "WEIGHTED_AVERAGE",
            Self::SpecificIdentification => "SPECIFIC_IDENTIFICATION",
            Self::StandardCost => "STANDARD_COST",
        }
    }
}

impl std::fmt::Display for CostingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CostingMethod {
    type Err = CostingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FIFO" => Ok(Self::Fifo),
            "LIFO" => Ok(Self::Lifo),
            "WEIGHTED_AVERAGE" => Ok(Self::WeightedAverage),
            "SPECIFIC_IDENTIFICATION" => Ok(Self::SpecificIdentification),
            "STANDARD_COST" => Ok(Self::StandardCost),
            _ => Err(CostingError::validation(format!("Unknown costing method: {s}"))),
        }
    }
}

/// Lifecycle status of a cost layer.
///
/// Only `Sold` is driven by the costing engine. `Allocated`, `Expired` and
/// `Damaged` are set by outside inventory processes and make a layer
/// unavailable for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    /// Layer can be consumed.
    Available,
    /// Reserved by an outside process.
    Allocated,
    /// Fully consumed.
    Sold,
    /// Past its expiration date.
    Expired,
    /// Written off as damaged.
    Damaged,
}

impl LayerStatus {
    /// Returns the lowercase string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Allocated => "allocated",
            Self::Sold => "sold",
            Self::Expired => "expired",
            Self::Damaged => "damaged",
        }
    }
}

/// Kind of costing event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerTransactionType {
    /// New layer bought in.
    Purchase,
    /// Layers consumed by a sale.
    Sale,
    /// Manual correction layer.
    Adjustment,
    /// Movement between locations.
    Transfer,
    /// Goods returned.
    Return,
}

/// Ordering for available-layer queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOrder {
    /// Ascending purchase date, then ascending insertion sequence.
    OldestFirst,
    /// Descending purchase date, then descending insertion sequence.
    NewestFirst,
}

/// Direction of a manual inventory adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    /// Stock found or added.
    Increase,
    /// Stock lost or removed.
    Decrease,
}

impl AdjustmentDirection {
    /// Applies the direction's sign to a positive quantity.
    #[must_use]
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            Self::Increase => quantity,
            Self::Decrease => -quantity,
        }
    }
}

/// A lot of inventory bought at one unit cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLayer {
    /// Layer id.
    pub id: CostLayerId,
    /// Product the layer belongs to.
    pub product_id: ProductId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Costing method in effect when the layer was created.
    pub method: CostingMethod,
    /// Remaining quantity.
    pub quantity: Decimal,
    /// Cost per unit.
    pub unit_cost: Decimal,
    /// `quantity * unit_cost`.
    pub total_cost: Decimal,
    /// When the lot was purchased.
    pub purchase_date: DateTime<Utc>,
    /// Purchase order reference.
    pub purchase_order_id: Option<String>,
    /// Supplier reference.
    pub supplier_id: Option<String>,
    /// Batch number.
    pub batch_number: Option<String>,
    /// Lot number.
    pub lot_number: Option<String>,
    /// Serial numbers of the units in the lot.
    pub serial_numbers: Vec<String>,
    /// Expiration date, if perishable.
    pub expiration_date: Option<NaiveDate>,
    /// Lifecycle status.
    pub status: LayerStatus,
    /// Insertion sequence, the tie-breaker for equal purchase dates.
    pub sequence: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl CostLayer {
    /// Returns true if the engine may select this layer.
    #[must_use]
    pub fn is_consumable(&self) -> bool {
        self.status == LayerStatus::Available && self.quantity > Decimal::ZERO
    }

    /// Oldest-first ordering: purchase date, then insertion sequence.
    #[must_use]
    pub fn cmp_oldest_first(&self, other: &Self) -> std::cmp::Ordering {
        self.purchase_date
            .cmp(&other.purchase_date)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Input for recording a purchased lot.
#[derive(Debug, Clone)]
pub struct AddCostLayerInput {
    /// Product bought.
    pub product_id: ProductId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Costing method in effect for the product.
    pub method: CostingMethod,
    /// Quantity bought.
    pub quantity: Decimal,
    /// Cost per unit.
    pub unit_cost: Decimal,
    /// Purchase date.
    pub purchase_date: DateTime<Utc>,
    /// Purchase order reference.
    pub purchase_order_id: Option<String>,
    /// Supplier reference.
    pub supplier_id: Option<String>,
    /// Batch number.
    pub batch_number: Option<String>,
    /// Lot number.
    pub lot_number: Option<String>,
    /// Serial numbers.
    pub serial_numbers: Vec<String>,
    /// Expiration date.
    pub expiration_date: Option<NaiveDate>,
}

impl AddCostLayerInput {
    /// Creates an input with no optional references.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        organization_id: OrganizationId,
        method: CostingMethod,
        quantity: Decimal,
        unit_cost: Decimal,
        purchase_date: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            organization_id,
            method,
            quantity,
            unit_cost,
            purchase_date,
            purchase_order_id: None,
            supplier_id: None,
            batch_number: None,
            lot_number: None,
            serial_numbers: Vec::new(),
            expiration_date: None,
        }
    }

    /// Sets the purchase order reference.
    #[must_use]
    pub fn with_purchase_order(mut self, purchase_order_id: impl Into<String>) -> Self {
        self.purchase_order_id = Some(purchase_order_id.into());
        self
    }

    /// Validates quantity and unit cost.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if either is negative.
    pub fn validate(&self) -> Result<(), CostingError> {
        if self.quantity < Decimal::ZERO {
            return Err(CostingError::validation("Quantity cannot be negative"));
        }
        if self.unit_cost < Decimal::ZERO {
            return Err(CostingError::validation("Unit cost cannot be negative"));
        }
        Ok(())
    }
}

/// Input for a manual inventory correction.
#[derive(Debug, Clone)]
pub struct AdjustCostLayerInput {
    /// Product adjusted.
    pub product_id: ProductId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Increase or decrease.
    pub direction: AdjustmentDirection,
    /// Unsigned quantity.
    pub quantity: Decimal,
    /// Cost per unit.
    pub unit_cost: Decimal,
    /// Why the adjustment was made.
    pub reason: String,
}

impl AdjustCostLayerInput {
    /// Validates quantity, unit cost and reason.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on a non-positive quantity, negative cost or blank reason.
    pub fn validate(&self) -> Result<(), CostingError> {
        if self.quantity <= Decimal::ZERO {
            return Err(CostingError::validation(
                "Adjustment quantity must be positive",
            ));
        }
        if self.unit_cost < Decimal::ZERO {
            return Err(CostingError::validation("Unit cost cannot be negative"));
        }
        if self.reason.trim().is_empty() {
            return Err(CostingError::validation("Adjustment reason is required"));
        }
        Ok(())
    }
}

fn layer_total(quantity: Decimal, unit_cost: Decimal) -> Result<Decimal, CostingError> {
    quantity.checked_mul(unit_cost).ok_or_else(|| {
        CostingError::validation(format!(
            "Layer value {quantity} x {unit_cost} is out of range"
        ))
    })
}

/// A layer staged for insertion; the store assigns sequence and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCostLayer {
    /// Layer id.
    pub id: CostLayerId,
    /// Product.
    pub product_id: ProductId,
    /// Organization.
    pub organization_id: OrganizationId,
    /// Method tag.
    pub method: CostingMethod,
    /// Quantity; signed for adjustment layers.
    pub quantity: Decimal,
    /// Cost per unit.
    pub unit_cost: Decimal,
    /// `quantity * unit_cost`.
    pub total_cost: Decimal,
    /// Purchase date.
    pub purchase_date: DateTime<Utc>,
    /// Purchase order reference.
    pub purchase_order_id: Option<String>,
    /// Supplier reference.
    pub supplier_id: Option<String>,
    /// Batch number.
    pub batch_number: Option<String>,
    /// Lot number.
    pub lot_number: Option<String>,
    /// Serial numbers.
    pub serial_numbers: Vec<String>,
    /// Expiration date.
    pub expiration_date: Option<NaiveDate>,
}

impl NewCostLayer {
    /// Builds an available purchase layer from validated input.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `quantity * unit_cost` does not fit a decimal.
    pub fn purchase(input: AddCostLayerInput) -> Result<Self, CostingError> {
        let total_cost = layer_total(input.quantity, input.unit_cost)?;
        Ok(Self {
            id: CostLayerId::new(),
            product_id: input.product_id,
            organization_id: input.organization_id,
            method: input.method,
            total_cost,
            quantity: input.quantity,
            unit_cost: input.unit_cost,
            purchase_date: input.purchase_date,
            purchase_order_id: input.purchase_order_id,
            supplier_id: input.supplier_id,
            batch_number: input.batch_number,
            lot_number: input.lot_number,
            serial_numbers: input.serial_numbers,
            expiration_date: input.expiration_date,
        })
    }

    /// Builds a signed weighted-average layer for a manual correction.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `quantity * unit_cost` does not fit a decimal.
    pub fn adjustment(input: &AdjustCostLayerInput, at: DateTime<Utc>) -> Result<Self, CostingError> {
        let quantity = input.direction.signed(input.quantity);
        let total_cost = layer_total(quantity, input.unit_cost)?;
        Ok(Self {
            id: CostLayerId::new(),
            product_id: input.product_id,
            organization_id: input.organization_id,
            method: CostingMethod::WeightedAverage,
            quantity,
            unit_cost: input.unit_cost,
            total_cost,
            purchase_date: at,
            purchase_order_id: None,
            supplier_id: None,
            batch_number: None,
            lot_number: None,
            serial_numbers: Vec::new(),
            expiration_date: None,
        })
    }

    /// Materializes the stored layer.
    #[must_use]
    pub fn into_layer(self, sequence: i64, now: DateTime<Utc>) -> CostLayer {
        CostLayer {
            id: self.id,
            product_id: self.product_id,
            organization_id: self.organization_id,
            method: self.method,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            total_cost: self.total_cost,
            purchase_date: self.purchase_date,
            purchase_order_id: self.purchase_order_id,
            supplier_id: self.supplier_id,
            batch_number: self.batch_number,
            lot_number: self.lot_number,
            serial_numbers: self.serial_numbers,
            expiration_date: self.expiration_date,
            status: LayerStatus::Available,
            sequence,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Quantity drawn from one layer by a costing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConsumption {
    /// Layer drawn from.
    pub layer_id: CostLayerId,
    /// Quantity taken.
    pub quantity_consumed: Decimal,
    /// Unit cost charged for the draw.
    pub unit_cost: Decimal,
    /// `quantity_consumed * unit_cost`.
    pub cost: Decimal,
}

/// A request to compute and book cost of goods sold.
#[derive(Debug, Clone)]
pub struct CogsRequest {
    /// Product sold.
    pub product_id: ProductId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Costing method to apply.
    pub method: CostingMethod,
    /// Quantity sold; ignored for specific identification.
    pub quantity: Decimal,
    /// Explicit layers for specific identification.
    pub layer_ids: Vec<CostLayerId>,
    /// Cost per unit for the standard-cost method, as configured on the product.
    pub standard_cost: Option<Decimal>,
    /// Opaque external reference (e.g. invoice id).
    pub reference_id: Option<String>,
    /// Opaque external reference type (e.g. "invoice").
    pub reference_type: Option<String>,
    /// Free-form notes stored on the ledger entry.
    pub notes: Option<String>,
}

impl CogsRequest {
    /// Creates an ordering-based request (FIFO, LIFO or weighted average).
    #[must_use]
    pub fn new(
        product_id: ProductId,
        organization_id: OrganizationId,
        quantity: Decimal,
        method: CostingMethod,
    ) -> Self {
        Self {
            product_id,
            organization_id,
            method,
            quantity,
            layer_ids: Vec::new(),
            standard_cost: None,
            reference_id: None,
            reference_type: None,
            notes: None,
        }
    }

    /// Creates a specific-identification request over explicit layers.
    #[must_use]
    pub fn specific(
        product_id: ProductId,
        organization_id: OrganizationId,
        layer_ids: Vec<CostLayerId>,
    ) -> Self {
        Self {
            layer_ids,
            ..Self::new(
                product_id,
                organization_id,
                Decimal::ZERO,
                CostingMethod::SpecificIdentification,
            )
        }
    }

    /// Creates a standard-cost request. `standard_cost` is the product's
    /// configured standard cost, `None` when the product has none.
    #[must_use]
    pub fn standard(
        product_id: ProductId,
        organization_id: OrganizationId,
        quantity: Decimal,
        standard_cost: Option<Decimal>,
    ) -> Self {
        Self {
            standard_cost,
            ..Self::new(
                product_id,
                organization_id,
                quantity,
                CostingMethod::StandardCost,
            )
        }
    }

    /// Attaches an external reference to the ledger entry.
    #[must_use]
    pub fn with_reference(
        mut self,
        reference_id: impl Into<String>,
        reference_type: impl Into<String>,
    ) -> Self {
        self.reference_id = Some(reference_id.into());
        self.reference_type = Some(reference_type.into());
        self
    }
}

/// Result of a costing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CogsCalculation {
    /// Product sold.
    pub product_id: ProductId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Method applied.
    pub method: CostingMethod,
    /// Quantity sold.
    pub quantity_sold: Decimal,
    /// Exact cost removed, `Σ quantity_consumed * unit_cost`.
    pub total_cogs: Decimal,
    /// `total_cogs / quantity_sold`.
    pub average_unit_cost: Decimal,
    /// Quantity across still-available layers after the commit.
    pub remaining_quantity: Decimal,
    /// Value across still-available layers after the commit.
    pub remaining_value: Decimal,
    /// Per-layer draws in consumption order.
    pub layers_used: Vec<LayerConsumption>,
    /// Ledger entry written for this call.
    pub transaction_id: LayerTransactionId,
    /// When the calculation was committed.
    pub calculated_at: DateTime<Utc>,
}

/// A costing event before it becomes a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    /// Organization.
    pub organization_id: OrganizationId,
    /// Product.
    pub product_id: ProductId,
    /// Event kind.
    pub transaction_type: LayerTransactionType,
    /// Quantity moved; signed for adjustments.
    pub quantity: Decimal,
    /// Unit cost recorded.
    pub unit_cost: Decimal,
    /// Total cost recorded.
    pub total_cost: Decimal,
    /// Method used.
    pub method: CostingMethod,
    /// Layers the event touched.
    pub cost_layer_ids: Vec<CostLayerId>,
    /// Opaque external reference id.
    pub reference_id: Option<String>,
    /// Opaque external reference type.
    pub reference_type: Option<String>,
    /// Notes.
    pub notes: Option<String>,
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLayerTransaction {
    /// Entry id.
    pub id: LayerTransactionId,
    /// Organization.
    pub organization_id: OrganizationId,
    /// Product.
    pub product_id: ProductId,
    /// Event kind.
    pub transaction_type: LayerTransactionType,
    /// Quantity moved.
    pub quantity: Decimal,
    /// Unit cost recorded.
    pub unit_cost: Decimal,
    /// Total cost recorded.
    pub total_cost: Decimal,
    /// Method used.
    pub method: CostingMethod,
    /// Layers the event touched.
    pub cost_layer_ids: Vec<CostLayerId>,
    /// Opaque external reference id.
    pub reference_id: Option<String>,
    /// Opaque external reference type.
    pub reference_type: Option<String>,
    /// Notes.
    pub notes: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CostLayerTransaction {
    /// Seals an event into an entry.
    #[must_use]
    pub fn from_event(event: LedgerEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: LayerTransactionId::new(),
            organization_id: event.organization_id,
            product_id: event.product_id,
            transaction_type: event.transaction_type,
            quantity: event.quantity,
            unit_cost: event.unit_cost,
            total_cost: event.total_cost,
            method: event.method,
            cost_layer_ids: event.cost_layer_ids,
            reference_id: event.reference_id,
            reference_type: event.reference_type,
            notes: event.notes,
            created_at,
        }
    }
}

/// Product configuration supplied by the product directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    /// Product id.
    pub id: ProductId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name.
    pub name: String,
    /// Configured costing method, as stored.
    pub costing_method: Option<String>,
    /// Standard cost per unit, if set.
    pub standard_cost: Option<Decimal>,
}

/// Read-only aggregate over a product's available layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLayerSummary {
    /// Σ quantity.
    pub total_quantity: Decimal,
    /// Σ total_cost.
    pub total_value: Decimal,
    /// `total_value / total_quantity`, 0 when quantity is 0.
    pub average_cost: Decimal,
    /// Available layers, oldest first.
    pub layers: Vec<CostLayer>,
    /// Configured method, FIFO when unset.
    pub method: CostingMethod,
}

impl CostLayerSummary {
    /// Aggregates layers with status `available`, signed adjustment layers included.
    #[must_use]
    pub fn from_layers(mut layers: Vec<CostLayer>, method: CostingMethod) -> Self {
        layers.retain(|l| l.status == LayerStatus::Available);
        layers.sort_by(CostLayer::cmp_oldest_first);

        let (total_quantity, total_value) = layers
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(qty, value), l| {
                (qty + l.quantity, value + l.total_cost)
            });
        let average_cost = if total_quantity.is_zero() {
            Decimal::ZERO
        } else {
            total_value / total_quantity
        };

        Self {
            total_quantity,
            total_value,
            average_cost,
            layers,
            method,
        }
    }
}

/// One product's line in an organization valuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductValuation {
    /// Product id.
    pub product_id: ProductId,
    /// Display name.
    pub product_name: String,
    /// Quantity on hand.
    pub quantity_on_hand: Decimal,
    /// Value on hand.
    pub total_value: Decimal,
    /// Average unit cost.
    pub average_unit_cost: Decimal,
    /// Configured method.
    pub method: CostingMethod,
}
