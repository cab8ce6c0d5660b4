use soroban_sdk::contracterror;

/// Closed error surface of the market. Every failure aborts the whole entry
/// point; the host rolls the frame back, so no partial state is observable.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum MarketError {
    // Input validity
    NullMintAmount = 1,
    NullFeeAmount = 2,
    MaxSupplyExceeded = 3,
    BorrowAmountTooHigh = 4,
    WithdrawTooLarge = 5,
    NullWithdrawalAmount = 6,
    WithdrawalBatchNotExpired = 7,

    // State-gated
    DepositToClosedMarket = 8,
    BorrowFromClosedMarket = 9,
    RepayToClosedMarket = 10,
    CloseMarketWithUnpaidWithdrawals = 11,
    InsufficientReservesForFeeWithdrawal = 12,

    // Authorization
    NotAuthorizedLender = 13,
    NotBorrower = 14,
    NotController = 15,
    BorrowWhileSanctioned = 16,
    AccountBlocked = 17,
    NotSanctioned = 18,

    // Arithmetic
    ArithmeticOverflow = 19,
    ScaleFactorUnderflow = 20,

    // Concurrency
    Reentrancy = 21,
}
