/// ENFORCED WALLET TYPE
///
/// Per-agent monetary state. ALL wallet mutations go through these methods;
/// callers load a wallet inside a store transaction, apply one operation and
/// save it back in the same transaction.
///
/// # Enforcement Strategy:
/// 1. Fields are PRIVATE - no direct access
/// 2. Every operation checks before it mutates - on error nothing changed
/// 3. checked_add/sub - overflow protection
/// 4. Duplicate detection is NOT done here; callers guard on the state of
///    the linked referral event or withdrawal request
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fractional digits kept for every monetary amount
pub const MONEY_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient pending balance: pending {pending}, requested {requested}")]
    InsufficientPendingBalance {
        pending: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient locked funds: locked {locked}, requested {requested}")]
    InsufficientLockedFunds {
        locked: Decimal,
        requested: Decimal,
    },
}

/// Validate an amount entering the ledger.
///
/// Positive with at most [`MONEY_SCALE`] fractional digits; the store keeps
/// `NUMERIC(20, 2)` and must never round a credited amount.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, String> {
    if amount <= Decimal::ZERO {
        return Err("amount must be greater than zero".to_string());
    }
    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(format!(
            "amount {} has more than {} decimal places",
            amount, MONEY_SCALE
        ));
    }
    Ok(normalized)
}

/// Wallet embedded in an agent
///
/// # Invariants (ENFORCED by private fields):
/// - All four fields are >= 0
/// - `balance` only decreases through `lock_for_withdrawal`
/// - `pending_balance` only decreases when a referral event resolves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    balance: Decimal,
    pending_balance: Decimal,
    pending_withdrawal_amount: Decimal,
    total_earning_amount: Decimal,
}

impl Wallet {
    /// Rebuild a wallet from stored columns.
    ///
    /// Returns `None` if any field is negative (corrupt row).
    pub fn from_parts(
        balance: Decimal,
        pending_balance: Decimal,
        pending_withdrawal_amount: Decimal,
        total_earning_amount: Decimal,
    ) -> Option<Self> {
        let wallet = Self {
            balance,
            pending_balance,
            pending_withdrawal_amount,
            total_earning_amount,
        };
        wallet.is_consistent().then_some(wallet)
    }

    // ============================================================
    // READ-ONLY GETTERS
    // ============================================================

    /// Withdrawable funds
    #[inline]
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Earned but not yet confirmed
    #[inline]
    pub fn pending_balance(&self) -> Decimal {
        self.pending_balance
    }

    /// Locked in an open withdrawal request
    #[inline]
    pub fn pending_withdrawal_amount(&self) -> Decimal {
        self.pending_withdrawal_amount
    }

    #[inline]
    pub fn total_earning_amount(&self) -> Decimal {
        self.total_earning_amount
    }

    /// All fields non-negative
    pub fn is_consistent(&self) -> bool {
        self.balance >= Decimal::ZERO
            && self.pending_balance >= Decimal::ZERO
            && self.pending_withdrawal_amount >= Decimal::ZERO
            && self.total_earning_amount >= Decimal::ZERO
    }

    // ============================================================
    // VALIDATED MUTATIONS
    // ============================================================

    /// Credit a freshly attributed referral: `pending_balance += amount`
    pub fn credit_pending(&mut self, amount: Decimal) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.pending_balance = add(self.pending_balance, amount)?;
        Ok(())
    }

    /// Referral order completed: pending funds become withdrawable
    ///
    /// # Effects
    /// - `pending_balance -= amount`
    /// - `balance += amount`
    /// - `total_earning_amount += amount`
    pub fn confirm_earning(&mut self, amount: Decimal) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.ensure_pending(amount)?;
        let pending_balance = self.pending_balance - amount;
        let balance = add(self.balance, amount)?;
        let total_earning_amount = add(self.total_earning_amount, amount)?;

        self.pending_balance = pending_balance;
        self.balance = balance;
        self.total_earning_amount = total_earning_amount;
        Ok(())
    }

    /// Referral order cancelled or refunded: `pending_balance -= amount`
    pub fn release_pending_on_cancel(&mut self, amount: Decimal) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.ensure_pending(amount)?;
        self.pending_balance -= amount;
        Ok(())
    }

    /// Move funds from `balance` into `pending_withdrawal_amount`
    pub fn lock_for_withdrawal(&mut self, amount: Decimal) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if self.balance < amount {
            return Err(WalletError::InsufficientBalance {
                available: self.balance,
                requested: amount,
            });
        }
        let locked = add(self.pending_withdrawal_amount, amount)?;

        self.balance -= amount;
        self.pending_withdrawal_amount = locked;
        Ok(())
    }

    /// Settle a locked withdrawal after the admin decision
    ///
    /// # Effects
    /// - approved: `pending_withdrawal_amount -= amount`, `total_earning_amount += amount`
    /// - rejected: `pending_withdrawal_amount -= amount`, `balance += amount` (refund)
    pub fn finalize_withdrawal(
        &mut self,
        amount: Decimal,
        approved: bool,
    ) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if self.pending_withdrawal_amount < amount {
            return Err(WalletError::InsufficientLockedFunds {
                locked: self.pending_withdrawal_amount,
                requested: amount,
            });
        }

        if approved {
            let total_earning_amount = add(self.total_earning_amount, amount)?;
            self.total_earning_amount = total_earning_amount;
        } else {
            let balance = add(self.balance, amount)?;
            self.balance = balance;
        }
        self.pending_withdrawal_amount -= amount;
        Ok(())
    }

    fn ensure_pending(&self, amount: Decimal) -> Result<(), WalletError> {
        if self.pending_balance < amount {
            return Err(WalletError::InsufficientPendingBalance {
                pending: self.pending_balance,
                requested: amount,
            });
        }
        Ok(())
    }
}

#[inline]
fn ensure_positive(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidAmount);
    }
    Ok(())
}

// Decimal overflow is ~7.9e28; treat it like an invalid amount.
#[inline]
fn add(lhs: Decimal, rhs: Decimal) -> Result<Decimal, WalletError> {
    lhs.checked_add(rhs).ok_or(WalletError::InvalidAmount)
}
