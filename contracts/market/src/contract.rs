use soroban_sdk::{contract, contractimpl, token, Address, Env, Vec};

use crate::constants::{BIP, RAY};
use crate::errors::MarketError;
use crate::events::*;
use crate::interest;
use crate::math;
use crate::storage::{
    self, Account, AccountRole, AccountWithdrawalStatus, DataKey, MarketState, MarketTerms,
    SentinelClient, WithdrawalBatch,
};
use crate::withdrawals;

#[contract]
pub struct CreditMarket;

#[contractimpl]
impl CreditMarket {
    /// Initialize the market with its collaborators and frozen terms.
    /// Bips terms are capped at 10_000; the batch duration must be non-zero.
    pub fn initialize(
        env: Env,
        asset: Address,
        borrower: Address,
        controller: Address,
        fee_recipient: Address,
        sentinel: Address,
        terms: MarketTerms,
    ) {
        let persistent = env.storage().persistent();
        if persistent
            .get::<_, bool>(&DataKey::Initialized)
            .unwrap_or(false)
        {
            panic!("already initialized");
        }
        persistent.set(&DataKey::Initialized, &true);
        controller.require_auth();
        if terms.annual_interest_bips as u128 > BIP {
            panic!("invalid interest rate");
        }
        if terms.reserve_ratio_bips as u128 > BIP {
            panic!("invalid reserve ratio");
        }
        if terms.protocol_fee_bips as u128 > BIP {
            panic!("invalid protocol fee");
        }
        if terms.delinquency_fee_bips as u128 > BIP {
            panic!("invalid delinquency fee");
        }
        if terms.withdrawal_batch_duration == 0 {
            panic!("invalid batch duration");
        }

        persistent.set(&DataKey::Asset, &asset);
        persistent.set(&DataKey::Borrower, &borrower);
        persistent.set(&DataKey::Controller, &controller);
        persistent.set(&DataKey::FeeRecipient, &fee_recipient);
        persistent.set(&DataKey::Sentinel, &sentinel);
        persistent.set(
            &DataKey::WithdrawalBatchDuration,
            &terms.withdrawal_batch_duration,
        );

        let state = MarketState {
            is_closed: false,
            max_total_supply: terms.max_total_supply,
            accrued_protocol_fees: 0,
            reserved_assets: 0,
            scaled_total_supply: 0,
            scaled_pending_withdrawals: 0,
            pending_withdrawal_expiry: 0,
            is_delinquent: false,
            time_delinquent: 0,
            annual_interest_bips: terms.annual_interest_bips,
            reserve_ratio_bips: terms.reserve_ratio_bips,
            protocol_fee_bips: terms.protocol_fee_bips,
            delinquency_fee_bips: terms.delinquency_fee_bips,
            delinquency_grace_period: terms.delinquency_grace_period,
            scale_factor: RAY,
            last_accrued_timestamp: env.ledger().timestamp(),
        };
        storage::save_state(&env, &state);
    }

    /// Deposit up to `amount`, clamped to the remaining supply capacity.
    /// Returns the amount actually deposited. A sanctioned caller is blocked
    /// and escrowed instead, and receives 0.
    pub fn deposit_up_to(env: Env, lender: Address, amount: u128) -> Result<u128, MarketError> {
        storage::acquire_guard(&env)?;
        let actual = Self::deposit_inner(&env, &lender, amount)?;
        storage::release_guard(&env);
        Ok(actual)
    }

    /// Deposit exactly `amount` or fail.
    pub fn deposit(env: Env, lender: Address, amount: u128) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        let actual = Self::deposit_inner(&env, &lender, amount)?;
        storage::release_guard(&env);
        if actual != amount {
            return Err(MarketError::MaxSupplyExceeded);
        }
        Ok(())
    }

    fn deposit_inner(env: &Env, lender: &Address, amount: u128) -> Result<u128, MarketError> {
        let asset = storage::ensure_initialized(env);
        let mut state = storage::read_state(env);
        interest::project(env, &mut state)?;
        if state.is_closed {
            return Err(MarketError::DepositToClosedMarket);
        }
        lender.require_auth();

        let sentinel = SentinelClient::new(env, &storage::sentinel(env));
        if sentinel.is_sanctioned(&storage::borrower(env), lender) {
            Self::block_account(env, &mut state, lender)?;
            Self::write_state(env, &mut state)?;
            return Ok(0);
        }

        let amount = amount.min(state.maximum_deposit(env)?);
        let scaled = state.scale(env, amount)?;
        if scaled == 0 {
            return Err(MarketError::NullMintAmount);
        }
        let mut account = storage::read_account(env, lender);
        if account.is_blocked {
            return Err(MarketError::AccountBlocked);
        }
        if account.role != AccountRole::DepositAndWithdraw {
            return Err(MarketError::NotAuthorizedLender);
        }

        token::Client::new(env, &asset).transfer(
            lender,
            &env.current_contract_address(),
            &storage::to_i128(amount),
        );
        account.scaled_balance = math::add(account.scaled_balance, scaled)?;
        storage::write_account(env, lender, &account);
        state.scaled_total_supply = math::add(state.scaled_total_supply, scaled)?;
        Self::write_state(env, &mut state)?;
        Deposit {
            lender: lender.clone(),
            normalized_amount: amount,
            scaled_amount: scaled,
        }
        .publish(env);
        Ok(amount)
    }

    /// Queue a withdrawal of `amount` underlying into the pending batch,
    /// opening one if necessary, and burn against it with whatever liquidity
    /// is already on hand. Returns the batch expiry.
    pub fn queue_withdrawal(env: Env, lender: Address, amount: u128) -> Result<u64, MarketError> {
        storage::acquire_guard(&env)?;
        storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        lender.require_auth();

        let mut account = storage::read_account(&env, &lender);
        if account.is_blocked {
            return Err(MarketError::AccountBlocked);
        }
        if account.role == AccountRole::None {
            return Err(MarketError::NotAuthorizedLender);
        }
        if amount > state.normalize(&env, account.scaled_balance)? {
            return Err(MarketError::WithdrawTooLarge);
        }
        let scaled = state.scale(&env, amount)?.min(account.scaled_balance);
        if scaled == 0 {
            return Err(MarketError::NullWithdrawalAmount);
        }

        let expiry = withdrawals::ensure_pending_batch(&env, &mut state)?;
        account.scaled_balance = math::sub(account.scaled_balance, scaled)?;
        storage::write_account(&env, &lender, &account);
        withdrawals::add_to_batch(&env, &mut state, expiry, &lender, scaled)?;
        Transfer {
            from: lender.clone(),
            to: env.current_contract_address(),
            scaled_amount: scaled,
            normalized_amount: amount,
        }
        .publish(&env);
        withdrawals::apply_payment(&env, &mut state, expiry)?;
        Self::write_state(&env, &mut state)?;
        storage::release_guard(&env);
        Ok(expiry)
    }

    /// Claim a lender's share of what has been paid into an expired batch.
    /// Callable by anyone; the payout always goes to the lender, or to a
    /// fresh escrow if the lender is sanctioned. Returns the amount paid.
    pub fn execute_withdrawal(
        env: Env,
        lender: Address,
        batch_expiry: u64,
    ) -> Result<u128, MarketError> {
        storage::acquire_guard(&env)?;
        let asset = storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        if batch_expiry >= env.ledger().timestamp() {
            return Err(MarketError::WithdrawalBatchNotExpired);
        }
        let batch = storage::read_batch(&env, batch_expiry);
        let mut status = storage::read_withdrawal_status(&env, batch_expiry, &lender);
        if status.scaled_amount == 0 {
            return Err(MarketError::NullWithdrawalAmount);
        }
        let amount = withdrawals::withdrawable_amount(&env, &batch, &status)?;
        if amount == 0 {
            return Err(MarketError::NullWithdrawalAmount);
        }
        status.normalized_amount_withdrawn =
            math::add(status.normalized_amount_withdrawn, amount)?;
        storage::write_withdrawal_status(&env, batch_expiry, &lender, &status);
        state.reserved_assets = math::sub(state.reserved_assets, amount)?;

        let sentinel = SentinelClient::new(&env, &storage::sentinel(&env));
        let borrower = storage::borrower(&env);
        let recipient = if sentinel.is_sanctioned(&borrower, &lender) {
            let escrow = sentinel.create_escrow(&borrower, &lender, &asset);
            AccountSanctioned {
                lender: lender.clone(),
                escrow: escrow.clone(),
            }
            .publish(&env);
            escrow
        } else {
            lender.clone()
        };
        token::Client::new(&env, &asset).transfer(
            &env.current_contract_address(),
            &recipient,
            &storage::to_i128(amount),
        );
        Self::write_state(&env, &mut state)?;
        WithdrawalExecuted {
            expiry: batch_expiry,
            lender,
            normalized_amount: amount,
        }
        .publish(&env);
        storage::release_guard(&env);
        Ok(amount)
    }

    /// Borrower draws assets in excess of the required liquidity.
    pub fn borrow(env: Env, account: Address, amount: u128) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        let asset = storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        storage::require_borrower(&env, &account)?;
        if state.is_closed {
            return Err(MarketError::BorrowFromClosedMarket);
        }
        let sentinel = SentinelClient::new(&env, &storage::sentinel(&env));
        if sentinel.is_sanctioned(&account, &account) {
            return Err(MarketError::BorrowWhileSanctioned);
        }
        let borrowable = math::sat_sub(storage::held_assets(&env), state.liquidity_required(&env)?);
        if amount > borrowable {
            return Err(MarketError::BorrowAmountTooHigh);
        }
        token::Client::new(&env, &asset).transfer(
            &env.current_contract_address(),
            &account,
            &storage::to_i128(amount),
        );
        Self::write_state(&env, &mut state)?;
        Borrow { amount }.publish(&env);
        storage::release_guard(&env);
        Ok(())
    }

    /// Repay assets into the market. The transfer lands first so that an
    /// expiring batch processed during the projection sees the liquidity;
    /// the unpaid queue is then drained with whatever remains.
    pub fn repay(env: Env, payer: Address, amount: u128) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        let asset = storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        if state.is_closed {
            return Err(MarketError::RepayToClosedMarket);
        }
        payer.require_auth();
        token::Client::new(&env, &asset).transfer(
            &payer,
            &env.current_contract_address(),
            &storage::to_i128(amount),
        );
        interest::project(&env, &mut state)?;
        withdrawals::process_unpaid_batches(&env, &mut state)?;
        Self::write_state(&env, &mut state)?;
        MarketRepayment {
            payer,
            amount,
            timestamp: env.ledger().timestamp(),
        }
        .publish(&env);
        storage::release_guard(&env);
        Ok(())
    }

    /// Transfer accrued protocol fees to the fee recipient, bounded by the
    /// assets not spoken for by withdrawals. Returns the amount collected.
    pub fn collect_fees(env: Env) -> Result<u128, MarketError> {
        storage::acquire_guard(&env)?;
        let asset = storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        if state.accrued_protocol_fees == 0 {
            return Err(MarketError::NullFeeAmount);
        }
        let unavailable = math::add(
            state.reserved_assets,
            state.normalize(&env, state.scaled_pending_withdrawals)?,
        )?;
        let withdrawable = state
            .accrued_protocol_fees
            .min(math::sat_sub(storage::held_assets(&env), unavailable));
        if withdrawable == 0 {
            return Err(MarketError::InsufficientReservesForFeeWithdrawal);
        }
        state.accrued_protocol_fees = math::sub(state.accrued_protocol_fees, withdrawable)?;
        token::Client::new(&env, &asset).transfer(
            &env.current_contract_address(),
            &storage::fee_recipient(&env),
            &storage::to_i128(withdrawable),
        );
        Self::write_state(&env, &mut state)?;
        FeesCollected {
            amount: withdrawable,
        }
        .publish(&env);
        storage::release_guard(&env);
        Ok(withdrawable)
    }

    /// Controller closes the market: interest stops, the reserve ratio goes
    /// to 100%, and the debt delta settles against the borrower (pulled via
    /// allowance on a shortfall, pushed back on an excess).
    pub fn close_market(env: Env, caller: Address) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        let asset = storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        storage::require_controller(&env, &caller)?;
        if !storage::unpaid_batches(&env).is_empty() {
            return Err(MarketError::CloseMarketWithUnpaidWithdrawals);
        }
        state.is_closed = true;
        state.annual_interest_bips = 0;
        state.reserve_ratio_bips = BIP as u32;
        state.time_delinquent = 0;

        let total_debts = state.total_debts(&env)?;
        let held = storage::held_assets(&env);
        let borrower = storage::borrower(&env);
        let token_client = token::Client::new(&env, &asset);
        if held < total_debts {
            token_client.transfer_from(
                &env.current_contract_address(),
                &borrower,
                &env.current_contract_address(),
                &storage::to_i128(total_debts - held),
            );
        } else if held > total_debts {
            token_client.transfer(
                &env.current_contract_address(),
                &borrower,
                &storage::to_i128(held - total_debts),
            );
        }
        Self::write_state(&env, &mut state)?;
        MarketClosed {
            timestamp: env.ledger().timestamp(),
        }
        .publish(&env);
        storage::release_guard(&env);
        Ok(())
    }

    /// Project the state to now and persist it. Idempotent within a single
    /// timestamp.
    pub fn update_state(env: Env) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        Self::write_state(&env, &mut state)?;
        storage::release_guard(&env);
        Ok(())
    }

    /// Controller: raise or lower the supply cap.
    pub fn set_max_total_supply(
        env: Env,
        caller: Address,
        new_cap: u128,
    ) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        storage::require_controller(&env, &caller)?;
        if state.is_closed {
            panic!("market closed");
        }
        state.max_total_supply = new_cap;
        Self::write_state(&env, &mut state)?;
        MaxTotalSupplyUpdated { new_cap }.publish(&env);
        storage::release_guard(&env);
        Ok(())
    }

    /// Controller: change the base APR. Accrues with the old rate first.
    pub fn set_annual_interest_bips(
        env: Env,
        caller: Address,
        bips: u32,
    ) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        storage::require_controller(&env, &caller)?;
        if state.is_closed {
            panic!("market closed");
        }
        if bips as u128 > BIP {
            panic!("invalid interest rate");
        }
        state.annual_interest_bips = bips;
        Self::write_state(&env, &mut state)?;
        AnnualInterestBipsUpdated { bips }.publish(&env);
        storage::release_guard(&env);
        Ok(())
    }

    /// Controller: change the reserve ratio. Accrues with the old terms
    /// first; the new requirement is reflected in the delinquency flag on
    /// write-back.
    pub fn set_reserve_ratio_bips(
        env: Env,
        caller: Address,
        bips: u32,
    ) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        storage::require_controller(&env, &caller)?;
        if state.is_closed {
            panic!("market closed");
        }
        if bips as u128 > BIP {
            panic!("invalid reserve ratio");
        }
        state.reserve_ratio_bips = bips;
        Self::write_state(&env, &mut state)?;
        ReserveRatioBipsUpdated { bips }.publish(&env);
        storage::release_guard(&env);
        Ok(())
    }

    /// Controller: grant or revoke deposit rights. Revoked lenders keep
    /// withdraw-only access to their existing position.
    pub fn update_account_authorization(
        env: Env,
        caller: Address,
        lender: Address,
        authorized: bool,
    ) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        storage::require_controller(&env, &caller)?;
        let mut account = storage::read_account(&env, &lender);
        if account.is_blocked {
            return Err(MarketError::AccountBlocked);
        }
        account.role = if authorized {
            AccountRole::DepositAndWithdraw
        } else {
            AccountRole::WithdrawOnly
        };
        storage::write_account(&env, &lender, &account);
        Self::write_state(&env, &mut state)?;
        AuthorizationStatusUpdated {
            lender,
            role: account.role,
        }
        .publish(&env);
        storage::release_guard(&env);
        Ok(())
    }

    /// Permissionless: block a sanctioned lender and move their whole
    /// position to escrow.
    pub fn block_sanctioned_account(env: Env, lender: Address) -> Result<(), MarketError> {
        storage::acquire_guard(&env)?;
        storage::ensure_initialized(&env);
        let mut state = storage::read_state(&env);
        interest::project(&env, &mut state)?;
        let sentinel = SentinelClient::new(&env, &storage::sentinel(&env));
        if !sentinel.is_sanctioned(&storage::borrower(&env), &lender) {
            return Err(MarketError::NotSanctioned);
        }
        Self::block_account(&env, &mut state, &lender)?;
        Self::write_state(&env, &mut state)?;
        storage::release_guard(&env);
        Ok(())
    }

    fn block_account(
        env: &Env,
        state: &mut MarketState,
        lender: &Address,
    ) -> Result<(), MarketError> {
        let mut account = storage::read_account(env, lender);
        account.is_blocked = true;
        let sentinel = SentinelClient::new(env, &storage::sentinel(env));
        let escrow =
            sentinel.create_escrow(&storage::borrower(env), lender, &storage::asset(env));
        if account.scaled_balance > 0 {
            let scaled = account.scaled_balance;
            let normalized = state.normalize(env, scaled)?;
            account.scaled_balance = 0;
            let mut escrow_account = storage::read_account(env, &escrow);
            if escrow_account.role == AccountRole::None {
                escrow_account.role = AccountRole::WithdrawOnly;
            }
            escrow_account.scaled_balance = math::add(escrow_account.scaled_balance, scaled)?;
            storage::write_account(env, &escrow, &escrow_account);
            Transfer {
                from: lender.clone(),
                to: escrow.clone(),
                scaled_amount: scaled,
                normalized_amount: normalized,
            }
            .publish(env);
        }
        storage::write_account(env, lender, &account);
        AccountSanctioned {
            lender: lender.clone(),
            escrow,
        }
        .publish(env);
        Ok(())
    }

    /// Refresh the delinquency flag against current holdings and persist.
    fn write_state(env: &Env, state: &mut MarketState) -> Result<(), MarketError> {
        state.is_delinquent = state.liquidity_required(env)? > storage::held_assets(env);
        storage::save_state(env, state);
        StateUpdated {
            scale_factor: state.scale_factor,
            is_delinquent: state.is_delinquent,
        }
        .publish(env);
        Ok(())
    }

    // ----- views -------------------------------------------------------

    /// Lender balance in underlying terms, projected to now.
    pub fn balance_of(env: Env, lender: Address) -> Result<u128, MarketError> {
        let state = interest::projected_state(&env)?;
        state.normalize(&env, storage::read_account(&env, &lender).scaled_balance)
    }

    pub fn scaled_balance_of(env: Env, lender: Address) -> u128 {
        storage::read_account(&env, &lender).scaled_balance
    }

    /// Total normalized supply, projected to now.
    pub fn total_supply(env: Env) -> Result<u128, MarketError> {
        let state = interest::projected_state(&env)?;
        state.total_supply(&env)
    }

    pub fn get_scaled_total_supply(env: Env) -> Result<u128, MarketError> {
        Ok(interest::projected_state(&env)?.scaled_total_supply)
    }

    pub fn get_scale_factor(env: Env) -> Result<u128, MarketError> {
        Ok(interest::projected_state(&env)?.scale_factor)
    }

    /// The full market record, projected to now.
    pub fn get_state(env: Env) -> Result<MarketState, MarketError> {
        interest::projected_state(&env)
    }

    pub fn get_account(env: Env, account: Address) -> Account {
        storage::read_account(&env, &account)
    }

    pub fn held_assets(env: Env) -> u128 {
        storage::held_assets(&env)
    }

    pub fn liquidity_required(env: Env) -> Result<u128, MarketError> {
        let state = interest::projected_state(&env)?;
        state.liquidity_required(&env)
    }

    /// Assets the borrower may draw right now.
    pub fn borrowable_assets(env: Env) -> Result<u128, MarketError> {
        let state = interest::projected_state(&env)?;
        Ok(math::sat_sub(
            storage::held_assets(&env),
            state.liquidity_required(&env)?,
        ))
    }

    pub fn withdrawable_protocol_fees(env: Env) -> Result<u128, MarketError> {
        let state = interest::projected_state(&env)?;
        let unavailable = math::add(
            state.reserved_assets,
            state.normalize(&env, state.scaled_pending_withdrawals)?,
        )?;
        Ok(state
            .accrued_protocol_fees
            .min(math::sat_sub(storage::held_assets(&env), unavailable)))
    }

    pub fn maximum_deposit(env: Env) -> Result<u128, MarketError> {
        let state = interest::projected_state(&env)?;
        state.maximum_deposit(&env)
    }

    pub fn get_withdrawal_batch(env: Env, expiry: u64) -> WithdrawalBatch {
        storage::read_batch(&env, expiry)
    }

    pub fn get_account_withdrawal_status(
        env: Env,
        expiry: u64,
        lender: Address,
    ) -> AccountWithdrawalStatus {
        storage::read_withdrawal_status(&env, expiry, &lender)
    }

    pub fn get_unpaid_batch_expiries(env: Env) -> Vec<u64> {
        storage::unpaid_batches(&env)
    }

    pub fn get_asset(env: Env) -> Address {
        storage::asset(&env)
    }

    pub fn get_borrower(env: Env) -> Address {
        storage::borrower(&env)
    }

    pub fn get_controller(env: Env) -> Address {
        storage::controller(&env)
    }

    pub fn get_fee_recipient(env: Env) -> Address {
        storage::fee_recipient(&env)
    }

    pub fn get_sentinel(env: Env) -> Address {
        storage::sentinel(&env)
    }

    pub fn get_withdrawal_batch_duration(env: Env) -> u64 {
        storage::withdrawal_batch_duration(&env)
    }
}
