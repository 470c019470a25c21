use std::io;
use std::thread;

use log::{debug, info};

use crate::account::Account;
use crate::error::{Error, Result};
use crate::participant::Participant;
use crate::shm::Shm;

/// Runs a set of participants against one semaphore-guarded account.
///
/// The coordinator owns the whole lifecycle: it creates the segment, places
/// the account (one permit, configured starting balance), runs every
/// participant in its own execution context, waits for all of them, reads
/// the final balance and only then tears the segment down.
pub struct Coordinator {
    segment: String,
    initial_balance: i64,
    participants: Vec<Participant>,
}

pub struct CoordinatorOptions {
    segment: String,
    initial_balance: i64,
    participants: Vec<Participant>,
}

impl CoordinatorOptions {
    pub fn new() -> Self {
        CoordinatorOptions {
            segment: String::from("/shmbank"),
            initial_balance: 0,
            participants: Vec::new(),
        }
    }

    pub fn segment(mut self, name: &str) -> Self {
        self.segment = String::from(name);
        self
    }

    pub fn initial_balance(mut self, balance: i64) -> Self {
        self.initial_balance = balance;
        self
    }

    pub fn participant(mut self, participant: Participant) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn build(mut self) -> Coordinator {
        if self.participants.is_empty() {
            self.participants = vec![Participant::depositor(), Participant::withdrawer()];
        }
        Coordinator {
            segment: self.segment,
            initial_balance: self.initial_balance,
            participants: self.participants,
        }
    }
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn options() -> CoordinatorOptions {
        CoordinatorOptions::new()
    }

    /// Run the scenario to completion and return the final balance.
    pub fn run(self) -> Result<i64> {
        let Coordinator {
            segment,
            initial_balance,
            participants,
        } = self;

        let mut shm = Shm::new(&segment, size_of::<Account>())?;
        info!("created segment {} for the shared account", segment);
        Account::init_in(&mut shm, initial_balance)?;
        info!(
            "account ready: one permit, balance = ${}",
            initial_balance
        );
        let account = Account::attach(&shm)?;

        let results = thread::scope(|scope| -> Result<Vec<Result<i64>>> {
            let mut handles = Vec::with_capacity(participants.len());
            for mut participant in participants {
                let name = String::from(participant.name());
                let handle = thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || participant.transact(account))
                    .map_err(Error::spawn)?;
                debug!("started participant {}", name);
                handles.push(handle);
            }
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                let result = handle.join().map_err(|_| {
                    Error::sync(io::Error::new(io::ErrorKind::Other, "participant panicked"))
                })?;
                results.push(result);
            }
            Ok(results)
        })?;
        for result in results {
            result?;
        }
        info!("all participants have completed");

        let balance = account.balance()?;
        shm.close()?;
        info!("segment detached and removed, final balance = ${}", balance);
        Ok(balance)
    }
}
