// ============================================================================
// Fee Calculation - AlgoMint Marketplace Mirror
// ============================================================================
//
// Marketplace fees are expressed in basis points (1 bps = 0.01%) over prices
// held in integer base units, matching the ledger's fixed-point arithmetic.
// The mirror must reproduce on-chain fee values exactly, so everything here
// is integer math; no floats anywhere near money.
//
// ============================================================================

use serde::Serialize;

/// Denominator for basis-point arithmetic (10_000 bps = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Fee and proceeds split for a single sale
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub price: u128,
    pub fee: u128,
    pub proceeds: u128,
}

/// Pure, deterministic fee arithmetic. `fee_bps` is process-wide
/// configuration, never chosen by callers.
#[derive(Debug, Clone, Copy)]
pub struct FeeCalculator {
    fee_bps: u32,
}

impl FeeCalculator {
    pub fn new(fee_bps: u32) -> Self {
        Self { fee_bps }
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    /// `floor(price * fee_bps / 10_000)`, exact.
    ///
    /// Split into quotient and remainder so the intermediate product cannot
    /// overflow even for prices near `u128::MAX`.
    pub fn fee(&self, price: u128) -> u128 {
        let bps = self.fee_bps as u128;
        (price / BPS_DENOMINATOR) * bps + (price % BPS_DENOMINATOR) * bps / BPS_DENOMINATOR
    }

    /// Seller proceeds after the marketplace fee
    pub fn proceeds(&self, price: u128) -> u128 {
        price - self.fee(price)
    }

    pub fn breakdown(&self, price: u128) -> FeeBreakdown {
        let fee = self.fee(price);
        FeeBreakdown {
            price,
            fee,
            proceeds: price - fee,
        }
    }
}
