//! Retail price computation.

/// Retail markup over the wholesale price, in tenths (1.3×).
const MARKUP_TENTHS: u64 = 13;

/// Retail prices are rounded down to a multiple of this.
const ROUNDING_STEP: u64 = 50;

/// Largest multiple of the rounding step that fits in `u32`.
const MAX_RETAIL: u32 = u32::MAX / 50 * 50;

/// Map a wholesale price to the customer-facing retail price.
///
/// Multiplies by 1.3 and floors to the nearest multiple of 50. Integer
/// arithmetic only, so `floor(w * 1.3)` is exact.
pub fn retail_price(wholesale: u32) -> u32 {
    let marked_up = u64::from(wholesale) * MARKUP_TENTHS / 10;
    let rounded = marked_up / ROUNDING_STEP * ROUNDING_STEP;
    // u32::MAX * 1.3 does not fit in u32; saturate instead of wrapping.
    u32::try_from(rounded).unwrap_or(MAX_RETAIL)
}
