pub mod meter;
pub mod pricing;
pub mod wallet;

pub use meter::{compute_credits_burned, compute_oe_tokens, UsageMeter, UsageRecord};
pub use pricing::PricingCache;
pub use wallet::{CreditTransaction, CreditWallet, TransactionKind, WalletLedger};
