//! Time projection of the market state.
//!
//! Every entry point routes through `project` before reading or mutating
//! anything. Ordering is load-bearing: an expired batch is processed at the
//! scale as of its expiry, never at the scale of "now", and penalty interest
//! for the post-expiry stretch accrues only after the batch's reserve
//! reshuffle has happened.

use soroban_sdk::Env;

use crate::errors::MarketError;
use crate::math;
use crate::storage::{self, MarketState};
use crate::withdrawals;

/// Advance `state` to the current ledger timestamp, processing an expired
/// pending batch (and persisting its payment) along the way.
pub fn project(env: &Env, state: &mut MarketState) -> Result<(), MarketError> {
    let now = env.ledger().timestamp();
    if state.pending_withdrawal_expiry != 0 && now >= state.pending_withdrawal_expiry {
        let expiry = state.pending_withdrawal_expiry;
        if expiry > state.last_accrued_timestamp {
            accrue(env, state, expiry)?;
        }
        withdrawals::process_expired_batch(env, state)?;
    }
    if now > state.last_accrued_timestamp {
        accrue(env, state, now)?;
    }
    Ok(())
}

/// In-memory projection for views: identical math, but the expiry payment is
/// simulated against copies and nothing is written or emitted.
pub fn projected_state(env: &Env) -> Result<MarketState, MarketError> {
    let mut state = storage::read_state(env);
    let now = env.ledger().timestamp();
    if state.pending_withdrawal_expiry != 0 && now >= state.pending_withdrawal_expiry {
        let expiry = state.pending_withdrawal_expiry;
        if expiry > state.last_accrued_timestamp {
            accrue(env, &mut state, expiry)?;
        }
        let mut batch = storage::read_batch(env, expiry);
        withdrawals::pay_batch(env, &mut state, &mut batch)?;
        state.pending_withdrawal_expiry = 0;
    }
    if now > state.last_accrued_timestamp {
        accrue(env, &mut state, now)?;
    }
    state.is_delinquent = state.liquidity_required(env)? > storage::held_assets(env);
    Ok(state)
}

/// Accrue base interest, protocol fees and delinquency penalties from the
/// last accrual timestamp up to `to`.
fn accrue(env: &Env, state: &mut MarketState, to: u64) -> Result<(), MarketError> {
    let elapsed = to - state.last_accrued_timestamp;

    let base_rate = math::annual_bips_to_ray_per_second(state.annual_interest_bips)?;
    let base_delta = math::mul(base_rate, elapsed as u128)?;

    // The protocol's cut of base interest is carved out of scale growth and
    // accrued as a normalized liability at the pre-update scale.
    let protocol_fee_delta = math::bip_mul(env, base_delta, state.protocol_fee_bips)?;
    if protocol_fee_delta > 0 && state.scaled_total_supply > 0 {
        let fee_growth = math::ray_mul(env, state.scale_factor, protocol_fee_delta)?;
        let fee = math::ray_mul(env, state.scaled_total_supply, fee_growth)?;
        state.accrued_protocol_fees = math::add(state.accrued_protocol_fees, fee)?;
    }

    // The delinquency counter runs whether or not a penalty rate is set.
    let penalty_seconds = update_time_delinquent(state, elapsed);
    let delinquency_delta = if state.delinquency_fee_bips > 0 && penalty_seconds > 0 {
        let penalty_rate = math::annual_bips_to_ray_per_second(state.delinquency_fee_bips)?;
        math::mul(penalty_rate, penalty_seconds as u128)?
    } else {
        0
    };

    let net_interest = math::add(
        math::sub(base_delta, protocol_fee_delta)
            .map_err(|_| MarketError::ScaleFactorUnderflow)?,
        delinquency_delta,
    )?;
    let scale_growth = math::ray_mul(env, state.scale_factor, net_interest)?;
    state.scale_factor = math::add(state.scale_factor, scale_growth)?;
    state.last_accrued_timestamp = to;
    Ok(())
}

/// Advance the running delinquency counter over `elapsed` seconds and return
/// how many of them accrue the penalty rate.
///
/// While delinquent the counter climbs and only the stretch beyond the grace
/// period is penalized. While healthy the counter decays toward zero, and
/// the seconds it spends above the grace line on the way down still carry
/// the penalty.
fn update_time_delinquent(state: &mut MarketState, elapsed: u64) -> u64 {
    let previous = state.time_delinquent;
    if state.is_delinquent {
        state.time_delinquent = previous.saturating_add(elapsed);
        let grace_remaining = state.delinquency_grace_period.saturating_sub(previous);
        elapsed.saturating_sub(grace_remaining)
    } else {
        state.time_delinquent = previous.saturating_sub(elapsed);
        previous
            .saturating_sub(state.delinquency_grace_period)
            .min(elapsed)
    }
}
