use lagoon_core::payment::PaymentSplit;
use serde::{Deserialize, Serialize};

/// Commission rate in basis points (1100 = 11%). Integer so split
/// arithmetic is exact and reproducible from price tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionRate(u32);

impl CommissionRate {
    pub const MAX_BPS: u32 = 10_000;

    pub fn from_bps(bps: u32) -> Result<Self, SplitError> {
        if bps > Self::MAX_BPS {
            return Err(SplitError::RateTooHigh(bps));
        }
        Ok(Self(bps))
    }

    /// Converts a percentage (e.g. 11.0) to the nearest basis point. Used
    /// once at configuration load; everything downstream works in bps.
    pub fn from_percent(percent: f64) -> Result<Self, SplitError> {
        if !percent.is_finite() || percent < 0.0 {
            return Err(SplitError::RateTooHigh(u32::MAX));
        }
        let bps = (percent * 100.0).round() as u32;
        Self::from_bps(bps)
    }

    pub fn bps(self) -> u32 {
        self.0
    }
}

impl Default for CommissionRate {
    /// Platform default of 11%.
    fn default() -> Self {
        Self(1_100)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("total amount must be positive, got {0}")]
    NonPositiveTotal(i64),

    #[error("commission rate {0} bps exceeds 100%")]
    RateTooHigh(u32),

    #[error("operator amount rounds below one minor unit")]
    OperatorShareTooSmall,
}

/// Compute the operator payout and platform fee for an authorized amount.
///
/// The fee is `total * rate` rounded half-up; the operator amount is the
/// remainder, so the fee absorbs the rounding and the pair always sums back
/// to `total` exactly. Called once at authorization time; the result is
/// persisted verbatim and never recomputed from a later rate.
pub fn split(total: i64, rate: CommissionRate) -> Result<PaymentSplit, SplitError> {
    if total <= 0 {
        return Err(SplitError::NonPositiveTotal(total));
    }

    let platform_fee = (total * rate.bps() as i64 + 5_000) / 10_000;
    let operator_amount = total - platform_fee;

    if operator_amount < 1 {
        return Err(SplitError::OperatorShareTooSmall);
    }

    Ok(PaymentSplit {
        operator_amount,
        platform_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn eleven_percent_of_standard_adult_price() {
        // 15,000 XPF at 11%: fee 1,650, operator 13,350.
        let rate = CommissionRate::from_bps(1_100).unwrap();
        let split = split(15_000, rate).unwrap();
        assert_eq!(split.platform_fee, 1_650);
        assert_eq!(split.operator_amount, 13_350);
    }

    #[test]
    fn fee_absorbs_the_rounding_remainder() {
        // 10,001 at 11% = 1,100.11 -> fee 1,100, operator 8,901.
        let rate = CommissionRate::from_bps(1_100).unwrap();
        let split = split(10_001, rate).unwrap();
        assert_eq!(split.platform_fee, 1_100);
        assert_eq!(split.operator_amount, 8_901);
        assert_eq!(split.platform_fee + split.operator_amount, 10_001);

        // 95 at 12.34% = 11.723 -> rounds half-up to 12.
        let rate = CommissionRate::from_bps(1_234).unwrap();
        let split = super::split(95, rate).unwrap();
        assert_eq!(split.platform_fee, 12);
        assert_eq!(split.operator_amount, 83);
    }

    #[test]
    fn zero_rate_gives_everything_to_the_operator() {
        let rate = CommissionRate::from_bps(0).unwrap();
        let split = split(4_200, rate).unwrap();
        assert_eq!(split.platform_fee, 0);
        assert_eq!(split.operator_amount, 4_200);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let rate = CommissionRate::from_bps(1_100).unwrap();
        assert_eq!(split(0, rate), Err(SplitError::NonPositiveTotal(0)));
        assert_eq!(split(-5, rate), Err(SplitError::NonPositiveTotal(-5)));
        assert_eq!(
            CommissionRate::from_bps(10_001),
            Err(SplitError::RateTooHigh(10_001))
        );
        // 100% commission leaves the operator nothing.
        let full = CommissionRate::from_bps(10_000).unwrap();
        assert_eq!(split(1_000, full), Err(SplitError::OperatorShareTooSmall));
    }

    #[test]
    fn percent_conversion_rounds_to_nearest_bps() {
        assert_eq!(CommissionRate::from_percent(11.0).unwrap().bps(), 1_100);
        assert_eq!(CommissionRate::from_percent(12.345).unwrap().bps(), 1_235);
        assert!(CommissionRate::from_percent(-1.0).is_err());
        assert!(CommissionRate::from_percent(101.0).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        /// The split always sums back to the total and never goes negative.
        #[test]
        fn split_conserves_money(total in 1i64..=100_000_000, bps in 0u32..=9_900) {
            let rate = CommissionRate::from_bps(bps).unwrap();
            if let Ok(split) = split(total, rate) {
                prop_assert_eq!(split.operator_amount + split.platform_fee, total);
                prop_assert!(split.operator_amount >= 1);
                prop_assert!(split.platform_fee >= 0);
            }
        }

        /// Same inputs, same split: the calculator is a pure function.
        #[test]
        fn split_is_deterministic(total in 1i64..=10_000_000, bps in 0u32..=10_000) {
            let rate = CommissionRate::from_bps(bps).unwrap();
            prop_assert_eq!(split(total, rate), split(total, rate));
        }
    }
}
