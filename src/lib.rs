//! Mutual exclusion over a shared bank account: a counting semaphore and a
//! balance living together in a POSIX shared memory segment, exercised by a
//! depositing and a withdrawing participant.

// Lets the derive's emitted `shmbank::` paths resolve inside this crate.
extern crate self as shmbank;

mod account;
mod coordinator;
mod participant;
mod shm;
mod sync;

pub mod error;

pub use account::{Account, MAX_BALANCE, MAX_WITHDRAWAL};
pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::Error;
pub use participant::{Amount, Op, Participant};
pub use shm::{FromShm, Shm};
pub use shmbank_derive::FromShm;
pub use sync::Semaphore;
