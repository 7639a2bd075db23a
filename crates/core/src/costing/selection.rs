//! Layer selection algorithms.
//!
//! Pure functions that turn a snapshot of available layers into a
//! consumption plan. Nothing here touches a store; the engine stages the
//! resulting draws as layer mutations and commits them atomically.
//!
//! Weighted-average allocation rounds each layer's proportional share to a
//! whole unit (half away from zero), clamps it to the layer's quantity, and
//! hands the remainder to the last layer, spilling backwards only when the
//! last layer cannot absorb it. The draws always sum to the requested quantity.

use rust_decimal::{Decimal, RoundingStrategy};
use stockcost_shared::types::CostLayerId;

use super::error::CostingError;
use super::types::{CostLayer, LayerConsumption};

/// Quantity drawn from one layer, with the quantity observed at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerDraw {
    /// Layer drawn from.
    pub layer_id: CostLayerId,
    /// Layer quantity when the snapshot was taken.
    pub quantity_before: Decimal,
    /// Layer unit cost, used to keep `total_cost` consistent after the draw.
    pub layer_unit_cost: Decimal,
    /// Quantity taken.
    pub quantity: Decimal,
    /// Unit cost charged (blended cost for weighted average).
    pub unit_cost: Decimal,
}

impl LayerDraw {
    /// Cost charged for this draw.
    #[must_use]
    pub fn cost(&self) -> Decimal {
        self.quantity * self.unit_cost
    }

    /// Quantity left in the layer after the draw.
    #[must_use]
    pub fn quantity_after(&self) -> Decimal {
        self.quantity_before - self.quantity
    }

    /// Public view of the draw.
    #[must_use]
    pub fn consumption(&self) -> LayerConsumption {
        LayerConsumption {
            layer_id: self.layer_id,
            quantity_consumed: self.quantity,
            unit_cost: self.unit_cost,
            cost: self.cost(),
        }
    }
}

/// Outcome of a selection algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionPlan {
    /// Draws in consumption order.
    pub draws: Vec<LayerDraw>,
    /// Σ draw quantities.
    pub quantity: Decimal,
    /// Σ draw costs.
    pub total_cogs: Decimal,
}

impl ConsumptionPlan {
    fn from_draws(draws: Vec<LayerDraw>) -> Self {
        let quantity = draws.iter().map(|d| d.quantity).sum();
        let total_cogs = draws.iter().map(LayerDraw::cost).sum();
        Self {
            draws,
            quantity,
            total_cogs,
        }
    }

    /// `total_cogs / quantity`, 0 for an empty plan.
    #[must_use]
    pub fn average_unit_cost(&self) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.total_cogs / self.quantity
        }
    }

    /// Ids of every layer the plan touches, in consumption order.
    #[must_use]
    pub fn layer_ids(&self) -> Vec<CostLayerId> {
        self.draws.iter().map(|d| d.layer_id).collect()
    }
}

/// Layer selection for each costing method.
pub struct LayerSelector;

impl LayerSelector {
    /// Consumes layers in the order given, FIFO or LIFO depending on how the
    /// caller sorted them. Stops as soon as the quantity is satisfied.
    ///
    /// # Errors
    ///
    /// - `Validation` if `quantity <= 0`
    /// - `NotFound` if no layer is consumable
    /// - `InsufficientInventory` if the layers hold less than `quantity`
    pub fn consume_in_order(
        layers: &[CostLayer],
        quantity: Decimal,
    ) -> Result<ConsumptionPlan, CostingError> {
        let consumable = Self::check_supply(layers, quantity)?;

        let mut remaining = quantity;
        let mut draws = Vec::new();
        for layer in consumable {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(layer.quantity);
            remaining -= take;
            draws.push(LayerDraw {
                layer_id: layer.id,
                quantity_before: layer.quantity,
                layer_unit_cost: layer.unit_cost,
                quantity: take,
                unit_cost: layer.unit_cost,
            });
        }

        Ok(ConsumptionPlan::from_draws(draws))
    }

    /// Charges every unit at the blended cost of all available layers and
    /// draws from each layer in proportion to its share of the total.
    ///
    /// # Errors
    ///
    /// Same as [`LayerSelector::consume_in_order`].
    pub fn weighted_average(
        layers: &[CostLayer],
        quantity: Decimal,
    ) -> Result<ConsumptionPlan, CostingError> {
        let consumable = Self::check_supply(layers, quantity)?;

        let total_quantity: Decimal = consumable.iter().map(|l| l.quantity).sum();
        let total_value: Decimal = consumable.iter().map(|l| l.total_cost).sum();
        let blended = total_value / total_quantity;

        let shares = Self::proportional_shares(&consumable, quantity, total_quantity);

        let draws = consumable
            .iter()
            .zip(shares)
            .filter(|(_, share)| *share > Decimal::ZERO)
            .map(|(layer, share)| LayerDraw {
                layer_id: layer.id,
                quantity_before: layer.quantity,
                layer_unit_cost: layer.unit_cost,
                quantity: share,
                unit_cost: blended,
            })
            .collect();

        Ok(ConsumptionPlan::from_draws(draws))
    }

    /// Consumes each named layer in full.
    ///
    /// # Errors
    ///
    /// - `Validation` if `layers` is empty
    /// - `NotFound` if any layer is not available with a positive quantity
    pub fn specific(layers: &[CostLayer]) -> Result<ConsumptionPlan, CostingError> {
        if layers.is_empty() {
            return Err(CostingError::validation(
                "Specific identification requires at least one cost layer id",
            ));
        }
        if let Some(layer) = layers.iter().find(|l| !l.is_consumable()) {
            return Err(CostingError::not_found(format!(
                "Cost layer {} is not available",
                layer.id
            )));
        }

        let draws = layers
            .iter()
            .map(|layer| LayerDraw {
                layer_id: layer.id,
                quantity_before: layer.quantity,
                layer_unit_cost: layer.unit_cost,
                quantity: layer.quantity,
                unit_cost: layer.unit_cost,
            })
            .collect();

        Ok(ConsumptionPlan::from_draws(draws))
    }

    /// Charges the product's standard cost per unit without drawing from
    /// any layer.
    ///
    /// # Errors
    ///
    /// - `Validation` if `quantity <= 0`, the standard cost is negative, or
    ///   the charge is out of range
    /// - `NotFound` if the product has no standard cost
    pub fn standard_cost(
        quantity: Decimal,
        standard_cost: Option<Decimal>,
    ) -> Result<ConsumptionPlan, CostingError> {
        if quantity <= Decimal::ZERO {
            return Err(CostingError::validation("Quantity to sell must be positive"));
        }
        let unit_cost = standard_cost
            .ok_or_else(|| CostingError::not_found("Standard cost not set for product"))?;
        if unit_cost < Decimal::ZERO {
            return Err(CostingError::validation("Standard cost cannot be negative"));
        }
        let total_cogs = quantity.checked_mul(unit_cost).ok_or_else(|| {
            CostingError::validation(format!("COGS {quantity} x {unit_cost} is out of range"))
        })?;

        Ok(ConsumptionPlan {
            draws: Vec::new(),
            quantity,
            total_cogs,
        })
    }

    /// Σ quantity and Σ total cost over layers that are available with a
    /// positive quantity.
    #[must_use]
    pub fn available_totals(layers: &[CostLayer]) -> (Decimal, Decimal) {
        layers
            .iter()
            .filter(|l| l.is_consumable())
            .fold((Decimal::ZERO, Decimal::ZERO), |(qty, value), l| {
                (qty + l.quantity, value + l.total_cost)
            })
    }

    fn check_supply(
        layers: &[CostLayer],
        quantity: Decimal,
    ) -> Result<Vec<&CostLayer>, CostingError> {
        if quantity <= Decimal::ZERO {
            return Err(CostingError::validation(
                "Quantity to sell must be positive",
            ));
        }

        // Snapshots may still carry expired or damaged rows.
        let consumable: Vec<&CostLayer> = layers.iter().filter(|l| l.is_consumable()).collect();
        if consumable.is_empty() {
            return Err(CostingError::not_found("No available cost layers found"));
        }

        let available: Decimal = consumable.iter().map(|l| l.quantity).sum();
        if quantity > available {
            return Err(CostingError::InsufficientInventory {
                requested: quantity,
                available,
            });
        }

        Ok(consumable)
    }

    fn proportional_shares(
        layers: &[&CostLayer],
        quantity: Decimal,
        total_quantity: Decimal,
    ) -> Vec<Decimal> {
        let mut shares: Vec<Decimal> = layers
            .iter()
            .map(|layer| {
                (layer.quantity / total_quantity * quantity)
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .clamp(Decimal::ZERO, layer.quantity)
            })
            .collect();

        let mut remainder = quantity - shares.iter().copied().sum::<Decimal>();
        for (share, layer) in shares.iter_mut().zip(layers.iter()).rev() {
            if remainder.is_zero() {
                break;
            }
            if remainder > Decimal::ZERO {
                let add = remainder.min(layer.quantity - *share);
                *share += add;
                remainder -= add;
            } else {
                let sub = (-remainder).min(*share);
                *share -= sub;
                remainder += sub;
            }
        }

        shares
    }
}
