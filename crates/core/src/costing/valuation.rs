//! Landed cost and standard cost variance calculations.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::error::CostingError;
use super::types::CostLayer;

/// Charges added on top of a purchase's base cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCostCharges {
    /// Inbound freight.
    pub freight: Decimal,
    /// Customs duties.
    pub duties: Decimal,
    /// Handling fees.
    pub handling: Decimal,
    /// Insurance.
    pub insurance: Decimal,
    /// Anything else capitalised into inventory.
    pub other: Decimal,
}

impl LandedCostCharges {
    /// Sum of all charges.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.freight + self.duties + self.handling + self.insurance + self.other
    }

    fn validate(&self) -> Result<(), CostingError> {
        let components = [
            ("freight", self.freight),
            ("duties", self.duties),
            ("handling", self.handling),
            ("insurance", self.insurance),
            ("other", self.other),
        ];
        match components.iter().find(|(_, amount)| *amount < Decimal::ZERO) {
            Some((name, _)) => Err(CostingError::validation(format!(
                "Landed cost component '{name}' cannot be negative"
            ))),
            None => Ok(()),
        }
    }
}

/// Fully loaded cost of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCost {
    /// Base cost of the goods.
    pub base_cost: Decimal,
    /// Charges applied.
    pub charges: LandedCostCharges,
    /// Base cost plus charges.
    pub total_landed_cost: Decimal,
    /// Total divided by quantity, 4 dp; 0 when quantity is 0.
    pub landed_cost_per_unit: Decimal,
}

/// Direction of a cost variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceType {
    /// Actual cost below standard.
    Favorable,
    /// Actual cost at or above standard.
    Unfavorable,
}

/// Standard versus actual purchase cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostVariance {
    /// Standard cost per unit.
    pub standard_cost: Decimal,
    /// Weighted actual cost per unit.
    pub actual_cost: Decimal,
    /// `actual - standard`.
    pub variance: Decimal,
    /// `variance / standard * 100`, 2 dp; 0 when standard is 0.
    pub variance_percent: Decimal,
    /// Favorable iff variance is negative.
    pub variance_type: VarianceType,
}

impl CostVariance {
    /// Returns true if actual cost came in under standard.
    #[must_use]
    pub fn is_favorable(&self) -> bool {
        self.variance_type == VarianceType::Favorable
    }
}

/// Stateless valuation helpers.
pub struct ValuationService;

impl ValuationService {
    /// Loads base cost with freight, duties and other charges.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the base cost, a charge or the quantity is negative.
    pub fn landed_cost(
        base_cost: Decimal,
        charges: LandedCostCharges,
        quantity: Decimal,
    ) -> Result<LandedCost, CostingError> {
        if base_cost < Decimal::ZERO {
            return Err(CostingError::validation("Base cost cannot be negative"));
        }
        if quantity < Decimal::ZERO {
            return Err(CostingError::validation("Quantity cannot be negative"));
        }
        charges.validate()?;

        let total_landed_cost = base_cost + charges.total();
        let landed_cost_per_unit = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            (total_landed_cost / quantity)
                .round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven)
        };

        Ok(LandedCost {
            base_cost,
            charges,
            total_landed_cost,
            landed_cost_per_unit,
        })
    }

    /// Compares a standard cost with the weighted cost of the given layers.
    ///
    /// Actual cost is `Σ total_cost / Σ quantity` over layers still holding
    /// quantity, 0 when there are none.
    #[must_use]
    pub fn cost_variance(standard_cost: Decimal, layers: &[CostLayer]) -> CostVariance {
        let (quantity, value) = layers
            .iter()
            .filter(|l| l.quantity > Decimal::ZERO)
            .fold((Decimal::ZERO, Decimal::ZERO), |(qty, value), l| {
                (qty + l.quantity, value + l.total_cost)
            });
        let actual_cost = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            value / quantity
        };

        let variance = actual_cost - standard_cost;
        let variance_percent = if standard_cost.is_zero() {
            Decimal::ZERO
        } else {
            (variance / standard_cost * Decimal::ONE_HUNDRED).round_dp(2)
        };
        let variance_type = if variance < Decimal::ZERO {
            VarianceType::Favorable
        } else {
            VarianceType::Unfavorable
        };

        CostVariance {
            standard_cost,
            actual_cost,
            variance,
            variance_percent,
            variance_type,
        }
    }
}
