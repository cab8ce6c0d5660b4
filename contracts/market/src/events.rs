use soroban_sdk::{contractevent, Address};

use crate::storage::AccountRole;

/// Scaled claims moving between accounts: withdrawal queueing and escrow
/// transfers. Mints and burns are covered by the deposit/withdrawal events.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    #[topic]
    pub from: Address,
    #[topic]
    pub to: Address,
    pub scaled_amount: u128,
    pub normalized_amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deposit {
    #[topic]
    pub lender: Address,
    pub normalized_amount: u128,
    pub scaled_amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Borrow {
    pub amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketRepayment {
    #[topic]
    pub payer: Address,
    pub amount: u128,
    pub timestamp: u64,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeesCollected {
    pub amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketClosed {
    pub timestamp: u64,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalBatchCreated {
    pub expiry: u64,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalQueued {
    pub expiry: u64,
    #[topic]
    pub lender: Address,
    pub scaled_amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalBatchPayment {
    pub expiry: u64,
    pub scaled_burned: u128,
    pub normalized_paid: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalBatchExpired {
    pub expiry: u64,
    pub scaled_total: u128,
    pub scaled_burned: u128,
    pub normalized_paid: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalBatchClosed {
    pub expiry: u64,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalExecuted {
    pub expiry: u64,
    #[topic]
    pub lender: Address,
    pub normalized_amount: u128,
}

/// Emitted on every state write-back.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateUpdated {
    pub scale_factor: u128,
    pub is_delinquent: bool,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthorizationStatusUpdated {
    #[topic]
    pub lender: Address,
    pub role: AccountRole,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccountSanctioned {
    #[topic]
    pub lender: Address,
    pub escrow: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MaxTotalSupplyUpdated {
    pub new_cap: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnualInterestBipsUpdated {
    pub bips: u32,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReserveRatioBipsUpdated {
    pub bips: u32,
}
