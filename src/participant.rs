use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::account::{Account, MAX_BALANCE, MAX_WITHDRAWAL};
use crate::error::Result;

/// Where a participant's transaction amount comes from.
#[derive(Debug, Clone, Copy)]
pub enum Amount {
    /// A uniformly-distributed draw from `[lo, hi]`, taken per transaction.
    Uniform { lo: i64, hi: i64 },
    /// A predetermined amount, for reproducible scenarios.
    Fixed(i64),
}

impl Amount {
    fn draw(&self, rng: &mut SmallRng) -> i64 {
        match *self {
            Amount::Uniform { lo, hi } => rng.gen_range(lo..=hi),
            Amount::Fixed(amount) => amount,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Op {
    Deposit(Amount),
    Withdraw(Amount),
}

/// One actor in the scenario: a display name plus the transaction it runs
/// against the shared account.
pub struct Participant {
    name: String,
    op: Op,
    rng: SmallRng,
}

impl Participant {
    pub fn new(name: impl Into<String>, op: Op) -> Self {
        Participant {
            name: name.into(),
            op,
            rng: SmallRng::from_entropy(),
        }
    }

    /// The depositing parent of the default scenario.
    pub fn depositor() -> Self {
        Participant::new(
            "Dear old Dad",
            Op::Deposit(Amount::Uniform {
                lo: 1,
                hi: MAX_BALANCE,
            }),
        )
    }

    /// The withdrawing child of the default scenario.
    pub fn withdrawer() -> Self {
        Participant::new(
            "Poor Student",
            Op::Withdraw(Amount::Uniform {
                lo: 1,
                hi: MAX_WITHDRAWAL,
            }),
        )
    }

    /// Pin the amount draws to a fixed sequence.
    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run this participant's single transaction against the account.
    pub fn transact(&mut self, account: &Account) -> Result<i64> {
        let (verb, amount, delta) = match self.op {
            Op::Deposit(source) => {
                let amount = source.draw(&mut self.rng);
                ("deposits", amount, amount)
            }
            Op::Withdraw(source) => {
                let amount = source.draw(&mut self.rng);
                ("withdraws", amount, -amount)
            }
        };
        debug!("{} needs ${}", self.name, amount);
        let balance = account.transact(delta)?;
        info!("{}: {} ${} / balance = ${}", self.name, verb, amount, balance);
        debug!("{} is done", self.name);
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_draws_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        let source = Amount::Uniform { lo: 1, hi: 50 };
        for _ in 0..200 {
            let amount = source.draw(&mut rng);
            assert!((1..=50).contains(&amount));
        }
    }

    #[test]
    fn fixed_draws_are_exact() {
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(Amount::Fixed(37).draw(&mut rng), 37);
    }

    #[test]
    fn seeded_draws_repeat() {
        let source = Amount::Uniform { lo: 1, hi: 100 };
        let mut first = SmallRng::seed_from_u64(42);
        let mut second = SmallRng::seed_from_u64(42);
        for _ in 0..20 {
            assert_eq!(source.draw(&mut first), source.draw(&mut second));
        }
    }
}
