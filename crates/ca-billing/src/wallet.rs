//! Append-only credit ledger over a per-user wallet balance.
//!
//! `CreditTransaction.amount`/`CreditWallet.balance` carry full 18,8
//! decimal precision — distinct from `LlmCallEvent.credits_burned`'s 4dp
//! summary figure (see [`crate::meter`]). Never convert between them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ca_domain::ids::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Grant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditWallet {
    pub id: String,
    pub user_id: String,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl CreditWallet {
    /// A freshly minted wallet with a zero balance.
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self { id: new_id(), user_id: user_id.into(), balance: Decimal::ZERO, updated_at: now }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub wallet_id: String,
    pub user_id: String,
    /// Negative for a debit, positive for a grant.
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stateless ledger math: mutates a wallet's balance in place and
/// returns the transaction row to persist alongside it.
///
/// There is no insufficient-balance rejection here — a wallet may go
/// negative. Blocking a turn on an empty wallet is the rate gate's job,
/// checked before the turn ever reaches the point of burning credits.
pub struct WalletLedger;

impl WalletLedger {
    /// Debit `max(credits_burned, 0.0)` from `wallet`, rounded to the
    /// ledger's 8 decimal places. Never rounds up: the conversion from
    /// `f64` truncates rather than rounds the eighth digit, so the
    /// ledger never grants a user fractional credit back.
    pub fn stage_debit(
        wallet: &mut CreditWallet,
        credits_burned: f64,
        reference_id: Option<String>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> CreditTransaction {
        let debit_amount = decimal_from_f64_truncated(credits_burned.max(0.0));
        wallet.balance -= debit_amount;
        wallet.updated_at = now;

        CreditTransaction {
            id: new_id(),
            wallet_id: wallet.id.clone(),
            user_id: wallet.user_id.clone(),
            amount: -debit_amount,
            kind: TransactionKind::Debit,
            reference_id,
            note,
            created_at: now,
        }
    }

    /// Grant `max(amount, 0.0)` to `wallet`.
    pub fn stage_grant(
        wallet: &mut CreditWallet,
        amount: f64,
        reference_id: Option<String>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> CreditTransaction {
        let grant_amount = decimal_from_f64_truncated(amount.max(0.0));
        wallet.balance += grant_amount;
        wallet.updated_at = now;

        CreditTransaction {
            id: new_id(),
            wallet_id: wallet.id.clone(),
            user_id: wallet.user_id.clone(),
            amount: grant_amount,
            kind: TransactionKind::Grant,
            reference_id,
            note,
            created_at: now,
        }
    }
}

/// Convert a non-negative `f64` to a `Decimal` truncated (never rounded
/// up) to 8 decimal places.
fn decimal_from_f64_truncated(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(8, rust_decimal::RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn debit_reduces_balance_and_records_negative_amount() {
        let mut wallet = CreditWallet::new("user-1", now());
        wallet.balance = dec!(10.0);
        let txn = WalletLedger::stage_debit(&mut wallet, 2.5, None, None, now());
        assert_eq!(wallet.balance, dec!(7.5));
        assert_eq!(txn.amount, dec!(-2.5));
        assert_eq!(txn.kind, TransactionKind::Debit);
    }

    #[test]
    fn debit_can_drive_balance_negative() {
        let mut wallet = CreditWallet::new("user-1", now());
        wallet.balance = dec!(1.0);
        WalletLedger::stage_debit(&mut wallet, 5.0, None, None, now());
        assert!(wallet.balance < Decimal::ZERO);
    }

    #[test]
    fn negative_credits_burned_debits_nothing() {
        let mut wallet = CreditWallet::new("user-1", now());
        wallet.balance = dec!(10.0);
        WalletLedger::stage_debit(&mut wallet, -5.0, None, None, now());
        assert_eq!(wallet.balance, dec!(10.0));
    }

    #[test]
    fn grant_increases_balance_and_records_positive_amount() {
        let mut wallet = CreditWallet::new("user-1", now());
        let txn = WalletLedger::stage_grant(&mut wallet, 100.0, Some("promo".into()), None, now());
        assert_eq!(wallet.balance, dec!(100.0));
        assert_eq!(txn.kind, TransactionKind::Grant);
    }
}
