// Monetary Amounts
// ================
//
// Amounts are counted in satoshis and carried as signed integers so that
// running balances can go negative while a transaction is being checked.

/// Amount in satoshis. Can be negative.
pub type Amount = i64;

/// The number of satoshis in one GLB.
pub const COIN: Amount = 100_000_000;

/// One hundredth of a GLB.
pub const CENT: Amount = 1_000_000;

/// No amount larger than this (in satoshi) is valid.
///
/// This is not the total money supply. It is a sanity bound used by
/// consensus-critical code, so its exact value is consensus critical.
pub const MAX_MONEY: Amount = 100_000_000 * COIN;

/// Returns true if `value` lies in `[0, MAX_MONEY]`.
pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}
