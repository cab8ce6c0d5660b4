use soroban_sdk::{contracttype, token, Address, Env, Vec};

use crate::constants::{TTL_EXTEND_TO, TTL_THRESHOLD};
use crate::errors::MarketError;
use crate::math;

/// Sanctions / escrow collaborator.
#[soroban_sdk::contractclient(name = "SentinelClient")]
pub trait SentinelContract {
    fn is_sanctioned(env: Env, borrower: Address, account: Address) -> bool;
    fn is_flagged(env: Env, account: Address) -> bool;
    fn create_escrow(env: Env, borrower: Address, account: Address, asset: Address) -> Address;
}

#[contracttype]
pub enum DataKey {
    Asset,
    Borrower,
    Controller,
    FeeRecipient,
    Sentinel,
    WithdrawalBatchDuration,
    State,
    Account(Address),
    WithdrawalBatch(u64),
    WithdrawalStatus(u64, Address),
    UnpaidBatches,
    Initialized,
    ReentrancyGuard,
}

/// Immutable numeric terms passed at construction.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketTerms {
    pub max_total_supply: u128,
    pub annual_interest_bips: u32,
    pub protocol_fee_bips: u32,
    pub delinquency_fee_bips: u32,
    pub delinquency_grace_period: u64,
    pub reserve_ratio_bips: u32,
    pub withdrawal_batch_duration: u64,
}

/// The single flat market record. All entry points project it to "now"
/// before reading or mutating anything else.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketState {
    pub is_closed: bool,
    pub max_total_supply: u128,
    pub accrued_protocol_fees: u128,
    pub reserved_assets: u128,
    pub scaled_total_supply: u128,
    pub scaled_pending_withdrawals: u128,
    pub pending_withdrawal_expiry: u64,
    pub is_delinquent: bool,
    pub time_delinquent: u64,
    pub annual_interest_bips: u32,
    pub reserve_ratio_bips: u32,
    pub protocol_fee_bips: u32,
    pub delinquency_fee_bips: u32,
    pub delinquency_grace_period: u64,
    pub scale_factor: u128,
    pub last_accrued_timestamp: u64,
}

impl MarketState {
    /// Scaled units -> underlying token units at the current scale factor.
    pub fn normalize(&self, env: &Env, scaled: u128) -> Result<u128, MarketError> {
        math::ray_mul(env, scaled, self.scale_factor)
    }

    /// Underlying token units -> scaled units at the current scale factor.
    pub fn scale(&self, env: &Env, normalized: u128) -> Result<u128, MarketError> {
        math::ray_div(env, normalized, self.scale_factor)
    }

    pub fn total_supply(&self, env: &Env) -> Result<u128, MarketError> {
        self.normalize(env, self.scaled_total_supply)
    }

    pub fn maximum_deposit(&self, env: &Env) -> Result<u128, MarketError> {
        Ok(math::sat_sub(self.max_total_supply, self.total_supply(env)?))
    }

    /// Reserved assets + accrued fees + the reserve-ratio share of the
    /// active (non-pending) supply.
    pub fn liquidity_required(&self, env: &Env) -> Result<u128, MarketError> {
        let active = math::sub(self.scaled_total_supply, self.scaled_pending_withdrawals)?;
        let reserve = math::bip_mul(env, self.normalize(env, active)?, self.reserve_ratio_bips)?;
        math::add(
            math::add(self.reserved_assets, self.accrued_protocol_fees)?,
            reserve,
        )
    }

    /// Total normalized liability: lender claims plus protocol fees.
    pub fn total_debts(&self, env: &Env) -> Result<u128, MarketError> {
        math::add(self.total_supply(env)?, self.accrued_protocol_fees)
    }
}

/// Lender record. Blocked accounts cannot act except to have their balance
/// moved to escrow.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Account {
    pub role: AccountRole,
    pub scaled_balance: u128,
    pub is_blocked: bool,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccountRole {
    None = 0,
    DepositAndWithdraw = 1,
    WithdrawOnly = 2,
}

/// A set of withdrawal requests maturing together. Paid once
/// `scaled_amount_burned == scaled_total_amount`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalBatch {
    pub scaled_total_amount: u128,
    pub scaled_amount_burned: u128,
    pub normalized_amount_paid: u128,
}

/// A lender's share of one batch. `normalized_amount_withdrawn` is the
/// high-water mark of what the lender has already claimed, so partially
/// paid batches can be claimed incrementally.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccountWithdrawalStatus {
    pub scaled_amount: u128,
    pub normalized_amount_withdrawn: u128,
}

pub fn ensure_initialized(env: &Env) -> Address {
    bump_core_ttl(env);
    env.storage()
        .persistent()
        .get(&DataKey::Asset)
        .expect("market not initialized")
}

pub fn bump_core_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::State) {
        persistent.extend_ttl(&DataKey::State, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Asset) {
        persistent.extend_ttl(&DataKey::Asset, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Borrower) {
        persistent.extend_ttl(&DataKey::Borrower, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Controller) {
        persistent.extend_ttl(&DataKey::Controller, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::UnpaidBatches) {
        persistent.extend_ttl(&DataKey::UnpaidBatches, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn bump_account_ttl(env: &Env, account: &Address) {
    let persistent = env.storage().persistent();
    let key = DataKey::Account(account.clone());
    if persistent.has(&key) {
        persistent.extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn bump_batch_ttl(env: &Env, expiry: u64) {
    let persistent = env.storage().persistent();
    let key = DataKey::WithdrawalBatch(expiry);
    if persistent.has(&key) {
        persistent.extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn read_state(env: &Env) -> MarketState {
    env.storage()
        .persistent()
        .get(&DataKey::State)
        .expect("market not initialized")
}

pub fn save_state(env: &Env, state: &MarketState) {
    env.storage().persistent().set(&DataKey::State, state);
}

pub fn read_account(env: &Env, account: &Address) -> Account {
    bump_account_ttl(env, account);
    env.storage()
        .persistent()
        .get(&DataKey::Account(account.clone()))
        .unwrap_or(Account {
            role: AccountRole::None,
            scaled_balance: 0,
            is_blocked: false,
        })
}

pub fn write_account(env: &Env, account: &Address, record: &Account) {
    env.storage()
        .persistent()
        .set(&DataKey::Account(account.clone()), record);
}

pub fn read_batch(env: &Env, expiry: u64) -> WithdrawalBatch {
    bump_batch_ttl(env, expiry);
    env.storage()
        .persistent()
        .get(&DataKey::WithdrawalBatch(expiry))
        .unwrap_or(WithdrawalBatch {
            scaled_total_amount: 0,
            scaled_amount_burned: 0,
            normalized_amount_paid: 0,
        })
}

pub fn write_batch(env: &Env, expiry: u64, batch: &WithdrawalBatch) {
    env.storage()
        .persistent()
        .set(&DataKey::WithdrawalBatch(expiry), batch);
}

pub fn read_withdrawal_status(env: &Env, expiry: u64, lender: &Address) -> AccountWithdrawalStatus {
    env.storage()
        .persistent()
        .get(&DataKey::WithdrawalStatus(expiry, lender.clone()))
        .unwrap_or(AccountWithdrawalStatus {
            scaled_amount: 0,
            normalized_amount_withdrawn: 0,
        })
}

pub fn write_withdrawal_status(
    env: &Env,
    expiry: u64,
    lender: &Address,
    status: &AccountWithdrawalStatus,
) {
    env.storage()
        .persistent()
        .set(&DataKey::WithdrawalStatus(expiry, lender.clone()), status);
}

pub fn unpaid_batches(env: &Env) -> Vec<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::UnpaidBatches)
        .unwrap_or(Vec::new(env))
}

pub fn write_unpaid_batches(env: &Env, queue: &Vec<u64>) {
    env.storage().persistent().set(&DataKey::UnpaidBatches, queue);
}

pub fn asset(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::Asset)
        .expect("market not initialized")
}

pub fn borrower(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::Borrower)
        .expect("borrower not set")
}

pub fn controller(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::Controller)
        .expect("controller not set")
}

pub fn fee_recipient(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::FeeRecipient)
        .expect("fee recipient not set")
}

pub fn sentinel(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::Sentinel)
        .expect("sentinel not set")
}

pub fn withdrawal_batch_duration(env: &Env) -> u64 {
    env.storage()
        .persistent()
        .get(&DataKey::WithdrawalBatchDuration)
        .expect("batch duration not set")
}

/// The stored borrower must both match and authorize the call.
pub fn require_borrower(env: &Env, who: &Address) -> Result<(), MarketError> {
    if borrower(env) != *who {
        return Err(MarketError::NotBorrower);
    }
    who.require_auth();
    Ok(())
}

/// The stored controller must both match and authorize the call.
pub fn require_controller(env: &Env, who: &Address) -> Result<(), MarketError> {
    if controller(env) != *who {
        return Err(MarketError::NotController);
    }
    who.require_auth();
    Ok(())
}

/// Single-entry lock around every mutating entry point. A failed call's
/// flag write unwinds with the frame, so the lock never sticks.
pub fn acquire_guard(env: &Env) -> Result<(), MarketError> {
    let instance = env.storage().instance();
    if instance
        .get::<_, bool>(&DataKey::ReentrancyGuard)
        .unwrap_or(false)
    {
        return Err(MarketError::Reentrancy);
    }
    instance.set(&DataKey::ReentrancyGuard, &true);
    Ok(())
}

pub fn release_guard(env: &Env) {
    env.storage().instance().remove(&DataKey::ReentrancyGuard);
}

/// Underlying balance held by the market itself.
pub fn held_assets(env: &Env) -> u128 {
    let balance = token::Client::new(env, &asset(env)).balance(&env.current_contract_address());
    if balance < 0 {
        0
    } else {
        balance as u128
    }
}

pub fn to_i128(amount: u128) -> i128 {
    if amount > i128::MAX as u128 {
        panic!("amount exceeds i128");
    }
    amount as i128
}
