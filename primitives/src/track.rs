use serde::{Deserialize, Serialize};

use crate::{Balance, BlockNumber};

pub type TrackId = u16;

/// Parts per billion, the fixed point unit used by approval/support curves.
pub type Perbill = u32;

pub const PERBILL: Perbill = 1_000_000_000;

/// A curve describing how a threshold decays over the decision period.
///
/// `x` is always the elapsed fraction of the decision period, in perbill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    LinearDecreasing {
        length: Perbill,
        floor: Perbill,
        ceil: Perbill,
    },
    SteppedDecreasing {
        begin: Perbill,
        end: Perbill,
        step: Perbill,
        period: Perbill,
    },
    /// `factor / (x + x_offset) + y_offset`, all three in signed 1e9 fixed point.
    Reciprocal {
        factor: i64,
        x_offset: i64,
        y_offset: i64,
    },
}

impl Curve {
    /// Threshold required at progress `x`, clamped to `[0, PERBILL]`.
    pub fn threshold(&self, x: Perbill) -> Perbill {
        let x = x.min(PERBILL);
        match *self {
            Curve::LinearDecreasing {
                length,
                floor,
                ceil,
            } => {
                if length == 0 {
                    return floor;
                }
                let progress = u64::from(x.min(length)) * u64::from(PERBILL) / u64::from(length);
                let span = u64::from(ceil.saturating_sub(floor));
                ceil.saturating_sub((span * progress / u64::from(PERBILL)) as Perbill)
            }
            Curve::SteppedDecreasing {
                begin,
                end,
                step,
                period,
            } => {
                if period == 0 {
                    return end;
                }
                let steps = x / period;
                let drop = u64::from(step) * u64::from(steps);
                let value = u64::from(begin).saturating_sub(drop) as Perbill;
                value.max(end)
            }
            Curve::Reciprocal {
                factor,
                x_offset,
                y_offset,
            } => {
                let denominator = i128::from(x) + i128::from(x_offset);
                if denominator <= 0 {
                    return PERBILL;
                }
                let value =
                    i128::from(factor) * i128::from(PERBILL) / denominator + i128::from(y_offset);
                value.clamp(0, i128::from(PERBILL)) as Perbill
            }
        }
    }
}

/// Parameters of a governance track. Immutable for a given runtime version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub max_deciding: u32,
    pub decision_deposit: Balance,
    pub prepare_period: BlockNumber,
    pub decision_period: BlockNumber,
    pub confirm_period: BlockNumber,
    pub min_enactment_period: BlockNumber,
    pub min_approval: Curve,
    pub min_support: Curve,
}

impl Track {
    /// Approval and support thresholds `elapsed` blocks into the decision period.
    pub fn thresholds_at(&self, elapsed: BlockNumber) -> (Perbill, Perbill) {
        let x = if self.decision_period == 0 {
            PERBILL
        } else {
            (u64::from(elapsed.min(self.decision_period)) * u64::from(PERBILL)
                / u64::from(self.decision_period)) as Perbill
        };
        (self.min_approval.threshold(x), self.min_support.threshold(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_curve_decreases_to_floor() {
        let curve = Curve::LinearDecreasing {
            length: PERBILL,
            floor: 500_000_000,
            ceil: PERBILL,
        };
        assert_eq!(curve.threshold(0), PERBILL);
        assert_eq!(curve.threshold(PERBILL / 2), 750_000_000);
        assert_eq!(curve.threshold(PERBILL), 500_000_000);
    }

    #[test]
    fn stepped_curve_never_goes_below_end() {
        let curve = Curve::SteppedDecreasing {
            begin: 800_000_000,
            end: 500_000_000,
            step: 100_000_000,
            period: 250_000_000,
        };
        assert_eq!(curve.threshold(0), 800_000_000);
        assert_eq!(curve.threshold(260_000_000), 700_000_000);
        assert_eq!(curve.threshold(PERBILL), 500_000_000);
    }

    #[test]
    fn reciprocal_curve_is_clamped() {
        let curve = Curve::Reciprocal {
            factor: 222_222_224,
            x_offset: 333_333_335,
            y_offset: -166_666_668,
        };
        assert!(curve.threshold(0) <= PERBILL);
        assert!(curve.threshold(0) > curve.threshold(PERBILL));
    }
}
