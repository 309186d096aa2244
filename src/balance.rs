//! Balance guard
//!
//! Verifies the signer holds enough of the source token before a
//! transaction is prepared for signing.

use crate::error::{ExecutorError, ExecutorResult};
use crate::step::{parse_amount, Step, Token};

use async_trait::async_trait;
use tracing::{debug, warn};

/// Pre-broadcast funds check
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceGuard: Send + Sync {
    /// Fails with `ExecutorError::InsufficientFunds` when `owner` cannot cover
    /// the step's source amount
    async fn check(&self, owner: &str, step: &Step) -> ExecutorResult<()>;
}

/// Source of token balances
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Balance of `token` held by `owner`, in base units
    async fn balance(&self, owner: &str, token: &Token) -> ExecutorResult<u128>;
}

/// Balance guard backed by a balance provider
pub struct BalanceChecker<P> {
    provider: P,
}

impl<P: BalanceProvider> BalanceChecker<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: BalanceProvider> BalanceGuard for BalanceChecker<P> {
    async fn check(&self, owner: &str, step: &Step) -> ExecutorResult<()> {
        let token = &step.action.from_token;
        let required = parse_amount(&step.action.from_amount)?;
        let available = self.provider.balance(owner, token).await?;

        debug!(
            step_id = %step.id,
            token = %token.symbol,
            required,
            available,
            "Checked balance"
        );

        if available < required {
            warn!(
                step_id = %step.id,
                "Insufficient {} balance for {}",
                token.symbol,
                owner
            );
            crate::metrics::record_balance_check_failure(step.action.from_chain_id);
            return Err(ExecutorError::InsufficientFunds {
                token: token.symbol.clone(),
                required: format_units(required, token.decimals),
                available: format_units(available, token.decimals),
            });
        }

        Ok(())
    }
}

/// Render a base-unit amount with the token's decimals
pub fn format_units(amount: u128, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let digits = format!("{:0>width$}", amount, width = decimals as usize + 1);
    let (whole, fraction) = digits.split_at(digits.len() - decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::fixtures::{step, SOLANA};

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(1_500_000, 6), "1.5");
        assert_eq!(format_units(42, 6), "0.000042");
        assert_eq!(format_units(3_000_000, 6), "3");
        assert_eq!(format_units(7, 0), "7");
    }

    #[tokio::test]
    async fn test_sufficient_balance() {
        let mut provider = MockBalanceProvider::new();
        provider
            .expect_balance()
            .times(1)
            .returning(|_, _| Ok(2_000_000));

        let checker = BalanceChecker::new(provider);
        tokio_test::assert_ok!(checker.check("owner", &step(SOLANA, SOLANA)).await);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let mut provider = MockBalanceProvider::new();
        provider.expect_balance().returning(|_, _| Ok(400_000));

        let checker = BalanceChecker::new(provider);
        let err = checker
            .check("owner", &step(SOLANA, SOLANA))
            .await
            .unwrap_err();

        match err {
            ExecutorError::InsufficientFunds {
                token,
                required,
                available,
            } => {
                assert_eq!(token, "USDC");
                assert_eq!(required, "1");
                assert_eq!(available, "0.4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_amount() {
        let provider = MockBalanceProvider::new();
        let checker = BalanceChecker::new(provider);
        let mut step = step(SOLANA, SOLANA);
        step.action.from_amount = "abc".to_string();

        let result = checker.check("owner", &step).await;
        assert!(matches!(result, Err(ExecutorError::InvalidAmount(_))));
    }
}
