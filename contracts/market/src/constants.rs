/// Ray precision: scaled unit <-> underlying conversion factor base (1e27).
pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000u128;
pub const HALF_RAY: u128 = RAY / 2;

/// Basis-point denominator.
pub const BIP: u128 = 10_000u128;
pub const HALF_BIP: u128 = BIP / 2;

/// Accrual year length (365 days).
pub const SECONDS_PER_YEAR: u64 = 365 * 86_400;

pub const TTL_THRESHOLD: u32 = 100_000;
pub const TTL_EXTEND_TO: u32 = 200_000;
