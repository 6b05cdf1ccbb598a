//! Amount arithmetic.

use ruint::aliases::U256;

/// Native value and stake amounts, in base units.
pub type Amount = u128;

/// One whole unit (18 decimals).
pub const UNIT: Amount = 1_000_000_000_000_000_000;

/// `floor(a * b / c)` with a 256-bit intermediate.
///
/// Returns `None` when `c == 0` or the quotient doesn't fit in 128 bits.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Option<Amount> {
    if c == 0 {
        return None;
    }
    let quotient = (U256::from(a) * U256::from(b)).checked_div(U256::from(c))?;
    u128::try_from(quotient).ok()
}
