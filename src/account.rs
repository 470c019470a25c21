use std::cell::UnsafeCell;

use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::shm::Shm;
use crate::sync::Semaphore;
use crate::FromShm;

pub const MAX_BALANCE: i64 = 100;
pub const MAX_WITHDRAWAL: i64 = 50;

/// The one shared value: a bank account balance guarded by a counting
/// semaphore with a single unit, laid out for placement in a segment.
///
/// The balance is only read or written between `acquire` and `release` of
/// `gate`; that discipline is what makes the `Sync` impl sound. Nothing
/// clamps the balance: it may go negative or exceed [`MAX_BALANCE`].
#[derive(FromShm)]
#[repr(C)]
pub struct Account {
    gate: Semaphore,
    balance: UnsafeCell<i64>,
}

unsafe impl Sync for Account {}

impl Account {
    /// Place a fresh account at the start of the segment.
    pub fn init_in(shm: &mut Shm, initial_balance: i64) -> Result<&mut Account> {
        if shm.len() < size_of::<Account>() {
            return Err(Error::new(ErrorKind::Size(shm.len())));
        }
        let gate = Semaphore::new(1).map_err(Error::init)?;
        let ptr = shm[..size_of::<Account>()].as_mut_ptr() as *mut Account;
        if !ptr.is_aligned() {
            return Err(Error::new(ErrorKind::Alignment(align_of::<Account>())));
        }
        unsafe {
            ptr.write(Account {
                gate,
                balance: UnsafeCell::new(initial_balance),
            });
            Ok(&mut *ptr)
        }
    }

    /// View an account another context already placed in the segment.
    pub fn attach(shm: &Shm) -> Result<&Account> {
        Account::from_shm(shm)
    }

    /// Run `f` on the balance inside the critical section.
    ///
    /// This is the only path to the balance, so every read-modify-write
    /// happens with the gate held.
    pub fn with_balance<T>(&self, f: impl FnOnce(&mut i64) -> T) -> Result<T> {
        self.gate.acquire().map_err(Error::sync)?;
        debug!("account gate acquired");
        let result = f(unsafe { &mut *self.balance.get() });
        self.gate.release().map_err(Error::sync)?;
        debug!("account gate released");
        Ok(result)
    }

    /// Apply a signed delta and return the new balance.
    pub fn transact(&self, delta: i64) -> Result<i64> {
        self.with_balance(|balance| {
            *balance += delta;
            *balance
        })
    }

    pub fn balance(&self) -> Result<i64> {
        self.with_balance(|balance| *balance)
    }
}
