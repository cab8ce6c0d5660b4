//! Withdrawal batch engine.
//!
//! At most one batch is pending at a time. Requests accumulate in it until
//! its expiry; whatever liquidity exists is burned against the batch as it
//! arrives. A batch that expires short of full payment joins the unpaid FIFO
//! queue and is drained oldest-first whenever a repayment brings assets in.

use soroban_sdk::{Address, Env};

use crate::errors::MarketError;
use crate::events::{
    WithdrawalBatchClosed, WithdrawalBatchCreated, WithdrawalBatchExpired,
    WithdrawalBatchPayment, WithdrawalQueued,
};
use crate::math;
use crate::storage::{self, AccountWithdrawalStatus, MarketState, WithdrawalBatch};

/// Open the pending batch if there is none; returns its expiry.
pub fn ensure_pending_batch(env: &Env, state: &mut MarketState) -> Result<u64, MarketError> {
    if state.pending_withdrawal_expiry != 0 {
        return Ok(state.pending_withdrawal_expiry);
    }
    let expiry = env
        .ledger()
        .timestamp()
        .checked_add(storage::withdrawal_batch_duration(env))
        .ok_or(MarketError::ArithmeticOverflow)?;
    state.pending_withdrawal_expiry = expiry;
    storage::write_batch(
        env,
        expiry,
        &WithdrawalBatch {
            scaled_total_amount: 0,
            scaled_amount_burned: 0,
            normalized_amount_paid: 0,
        },
    );
    WithdrawalBatchCreated { expiry }.publish(env);
    Ok(expiry)
}

/// Record a lender's claim in the pending batch. The scaled amount has
/// already been debited from the lender's balance; it stays inside
/// `scaled_total_supply` until a payment burns it.
pub fn add_to_batch(
    env: &Env,
    state: &mut MarketState,
    expiry: u64,
    lender: &Address,
    scaled_amount: u128,
) -> Result<(), MarketError> {
    let mut batch = storage::read_batch(env, expiry);
    batch.scaled_total_amount = math::add(batch.scaled_total_amount, scaled_amount)?;
    storage::write_batch(env, expiry, &batch);

    let mut status = storage::read_withdrawal_status(env, expiry, lender);
    status.scaled_amount = math::add(status.scaled_amount, scaled_amount)?;
    storage::write_withdrawal_status(env, expiry, lender, &status);

    state.scaled_pending_withdrawals =
        math::add(state.scaled_pending_withdrawals, scaled_amount)?;
    WithdrawalQueued {
        expiry,
        lender: lender.clone(),
        scaled_amount,
    }
    .publish(env);
    Ok(())
}

/// Burn as much of the batch as current liquidity allows, in memory.
/// Returns `(scaled_paid, normalized_paid)`.
///
/// Liquidity already spoken for — reserved assets, accrued fees, and the
/// normalized value of *other* batches' pending claims — is off limits. The
/// normalized leg is clamped to the available assets so rounding can never
/// reserve more than the market holds.
pub fn pay_batch(
    env: &Env,
    state: &mut MarketState,
    batch: &mut WithdrawalBatch,
) -> Result<(u128, u128), MarketError> {
    let owed = math::sub(batch.scaled_total_amount, batch.scaled_amount_burned)?;
    if owed == 0 {
        return Ok((0, 0));
    }
    let other_pending = math::sub(state.scaled_pending_withdrawals, owed)?;
    let unavailable = math::add(
        math::add(state.reserved_assets, state.accrued_protocol_fees)?,
        state.normalize(env, other_pending)?,
    )?;
    let available = math::sat_sub(storage::held_assets(env), unavailable);
    if available == 0 {
        return Ok((0, 0));
    }

    let scaled_paid = state.scale(env, available)?.min(owed);
    if scaled_paid == 0 {
        return Ok((0, 0));
    }
    let normalized_paid = state.normalize(env, scaled_paid)?.min(available);

    batch.scaled_amount_burned = math::add(batch.scaled_amount_burned, scaled_paid)?;
    batch.normalized_amount_paid = math::add(batch.normalized_amount_paid, normalized_paid)?;
    state.scaled_pending_withdrawals =
        math::sub(state.scaled_pending_withdrawals, scaled_paid)?;
    state.reserved_assets = math::add(state.reserved_assets, normalized_paid)?;
    // Interest stops accruing on the paid portion.
    state.scaled_total_supply = math::sub(state.scaled_total_supply, scaled_paid)?;
    Ok((scaled_paid, normalized_paid))
}

/// Pay the batch at `expiry` and persist the result.
pub fn apply_payment(env: &Env, state: &mut MarketState, expiry: u64) -> Result<(), MarketError> {
    let mut batch = storage::read_batch(env, expiry);
    let (scaled_paid, normalized_paid) = pay_batch(env, state, &mut batch)?;
    if scaled_paid > 0 {
        storage::write_batch(env, expiry, &batch);
        WithdrawalBatchPayment {
            expiry,
            scaled_burned: scaled_paid,
            normalized_paid,
        }
        .publish(env);
    }
    Ok(())
}

/// Projector step for a matured pending batch: attempt payment at the expiry
/// scale, then either close the batch or push it onto the unpaid queue.
pub fn process_expired_batch(env: &Env, state: &mut MarketState) -> Result<(), MarketError> {
    let expiry = state.pending_withdrawal_expiry;
    let mut batch = storage::read_batch(env, expiry);
    let (scaled_paid, normalized_paid) = pay_batch(env, state, &mut batch)?;
    if scaled_paid > 0 {
        WithdrawalBatchPayment {
            expiry,
            scaled_burned: scaled_paid,
            normalized_paid,
        }
        .publish(env);
    }
    storage::write_batch(env, expiry, &batch);
    WithdrawalBatchExpired {
        expiry,
        scaled_total: batch.scaled_total_amount,
        scaled_burned: batch.scaled_amount_burned,
        normalized_paid: batch.normalized_amount_paid,
    }
    .publish(env);
    if batch.scaled_amount_burned < batch.scaled_total_amount {
        let mut queue = storage::unpaid_batches(env);
        queue.push_back(expiry);
        storage::write_unpaid_batches(env, &queue);
    } else {
        WithdrawalBatchClosed { expiry }.publish(env);
    }
    state.pending_withdrawal_expiry = 0;
    Ok(())
}

/// Drain the unpaid queue oldest-first with whatever liquidity arrived.
/// Stops at the first batch that cannot be fully paid.
pub fn process_unpaid_batches(env: &Env, state: &mut MarketState) -> Result<(), MarketError> {
    let mut queue = storage::unpaid_batches(env);
    let mut popped = false;
    while let Some(expiry) = queue.first() {
        let mut batch = storage::read_batch(env, expiry);
        let (scaled_paid, normalized_paid) = pay_batch(env, state, &mut batch)?;
        if scaled_paid == 0 {
            break;
        }
        storage::write_batch(env, expiry, &batch);
        WithdrawalBatchPayment {
            expiry,
            scaled_burned: scaled_paid,
            normalized_paid,
        }
        .publish(env);
        if batch.scaled_amount_burned < batch.scaled_total_amount {
            break;
        }
        queue.pop_front();
        popped = true;
        WithdrawalBatchClosed { expiry }.publish(env);
    }
    if popped {
        storage::write_unpaid_batches(env, &queue);
    }
    Ok(())
}

/// Pro-rata payout currently claimable by a lender from a batch: their share
/// of everything paid so far, less what they have already withdrawn.
pub fn withdrawable_amount(
    env: &Env,
    batch: &WithdrawalBatch,
    status: &AccountWithdrawalStatus,
) -> Result<u128, MarketError> {
    if batch.scaled_total_amount == 0 {
        return Ok(0);
    }
    let total_entitled = math::mul_div(
        env,
        batch.normalized_amount_paid,
        status.scaled_amount,
        batch.scaled_total_amount,
    )?;
    Ok(math::sat_sub(
        total_entitled,
        status.normalized_amount_withdrawn,
    ))
}
