//! Ray-precision fixed point arithmetic.
//!
//! Scaled/underlying conversions run at 1e27 precision, so products of two
//! ray-scale values do not fit in u128; intermediates go through the host
//! `U256` and come back checked. Every fallible operation surfaces
//! `ArithmeticOverflow` rather than wrapping.

use soroban_sdk::{Env, U256};

use crate::constants::{BIP, HALF_BIP, HALF_RAY, RAY, SECONDS_PER_YEAR};
use crate::errors::MarketError;

/// a * b / RAY, rounding half up.
pub fn ray_mul(env: &Env, a: u128, b: u128) -> Result<u128, MarketError> {
    let product = U256::from_u128(env, a).mul(&U256::from_u128(env, b));
    product
        .add(&U256::from_u128(env, HALF_RAY))
        .div(&U256::from_u128(env, RAY))
        .to_u128()
        .ok_or(MarketError::ArithmeticOverflow)
}

/// a * RAY / b, rounding half up.
pub fn ray_div(env: &Env, a: u128, b: u128) -> Result<u128, MarketError> {
    if b == 0 {
        return Err(MarketError::ArithmeticOverflow);
    }
    U256::from_u128(env, a)
        .mul(&U256::from_u128(env, RAY))
        .add(&U256::from_u128(env, b / 2))
        .div(&U256::from_u128(env, b))
        .to_u128()
        .ok_or(MarketError::ArithmeticOverflow)
}

/// a * bips / 10_000, rounding half up.
pub fn bip_mul(env: &Env, a: u128, bips: u32) -> Result<u128, MarketError> {
    U256::from_u128(env, a)
        .mul(&U256::from_u128(env, bips as u128))
        .add(&U256::from_u128(env, HALF_BIP))
        .div(&U256::from_u128(env, BIP))
        .to_u128()
        .ok_or(MarketError::ArithmeticOverflow)
}

/// a * b / c, rounding down.
pub fn mul_div(env: &Env, a: u128, b: u128, c: u128) -> Result<u128, MarketError> {
    if c == 0 {
        return Err(MarketError::ArithmeticOverflow);
    }
    U256::from_u128(env, a)
        .mul(&U256::from_u128(env, b))
        .div(&U256::from_u128(env, c))
        .to_u128()
        .ok_or(MarketError::ArithmeticOverflow)
}

/// Annualized basis points to a per-second ray rate.
pub fn annual_bips_to_ray_per_second(bips: u32) -> Result<u128, MarketError> {
    (bips as u128)
        .checked_mul(RAY)
        .map(|scaled| scaled / (BIP * SECONDS_PER_YEAR as u128))
        .ok_or(MarketError::ArithmeticOverflow)
}

/// max(0, a - b).
pub fn sat_sub(a: u128, b: u128) -> u128 {
    a.saturating_sub(b)
}

pub fn add(a: u128, b: u128) -> Result<u128, MarketError> {
    a.checked_add(b).ok_or(MarketError::ArithmeticOverflow)
}

pub fn sub(a: u128, b: u128) -> Result<u128, MarketError> {
    a.checked_sub(b).ok_or(MarketError::ArithmeticOverflow)
}

pub fn mul(a: u128, b: u128) -> Result<u128, MarketError> {
    a.checked_mul(b).ok_or(MarketError::ArithmeticOverflow)
}
