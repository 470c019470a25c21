use std::cell::UnsafeCell;
use std::io::{Error, ErrorKind, Result};
use std::mem::MaybeUninit;

use nix::libc::{
    pthread_cond_init, pthread_cond_signal, pthread_cond_t, pthread_cond_wait,
    pthread_condattr_init, pthread_condattr_setpshared, pthread_condattr_t, pthread_mutex_init,
    pthread_mutex_lock, pthread_mutex_t, pthread_mutex_unlock, pthread_mutexattr_init,
    pthread_mutexattr_setpshared, pthread_mutexattr_t,
};

macro_rules! check_err {
    ($call:expr) => {
        let err = $call;
        if (err < 0) {
            return Err(Error::from_raw_os_error(err));
        }
    };
}

#[repr(C)]
struct PosixMutex {
    attr: pthread_mutexattr_t,
    mtx: pthread_mutex_t,
}

impl PosixMutex {
    fn new() -> Result<Self> {
        let mut attr = MaybeUninit::uninit();
        let mut mtx = MaybeUninit::uninit();
        unsafe {
            check_err!(pthread_mutexattr_init(attr.as_mut_ptr()));
            check_err!(pthread_mutexattr_setpshared(attr.as_mut_ptr(), 1));
            check_err!(pthread_mutex_init(mtx.as_mut_ptr(), attr.as_mut_ptr()));
            Ok(PosixMutex {
                attr: attr.assume_init(),
                mtx: mtx.assume_init(),
            })
        }
    }

    fn lock(&mut self) -> Result<()> {
        unsafe {
            check_err!(pthread_mutex_lock(&raw mut self.mtx));
        }
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        unsafe {
            check_err!(pthread_mutex_unlock(&raw mut self.mtx));
        }
        Ok(())
    }
}

#[repr(C)]
struct PosixCondition {
    attr: pthread_condattr_t,
    cond: pthread_cond_t,
}

impl PosixCondition {
    fn new() -> Result<Self> {
        let mut attr = MaybeUninit::uninit();
        let mut cond = MaybeUninit::uninit();
        unsafe {
            check_err!(pthread_condattr_init(attr.as_mut_ptr()));
            check_err!(pthread_condattr_setpshared(attr.as_mut_ptr(), 1));
            check_err!(pthread_cond_init(cond.as_mut_ptr(), attr.as_mut_ptr()));
            Ok(PosixCondition {
                attr: attr.assume_init(),
                cond: cond.assume_init(),
            })
        }
    }

    fn wait(&mut self, mtx: &mut PosixMutex) -> Result<()> {
        unsafe {
            check_err!(pthread_cond_wait(&raw mut self.cond, &raw mut mtx.mtx));
        }
        Ok(())
    }

    fn signal(&mut self) -> Result<()> {
        unsafe {
            check_err!(pthread_cond_signal(&raw mut self.cond));
        }
        Ok(())
    }
}

#[repr(C)]
struct SemState {
    mutex: PosixMutex,
    available: PosixCondition,
    count: i32,
    wakeups: i32,
}

/// A counting semaphore that can be shared between processes.
///
/// `count` holds the number of free units while non-negative; while
/// negative, `-count` is the number of blocked waiters. `wakeups` carries
/// admission tokens from `release` to the waiters, so one release resumes
/// at most one of them even if the condition wakes spuriously.
///
/// The primitive is built on process-shared pthread types, so a `Semaphore`
/// placed inside a shared memory segment synchronizes separate processes
/// the same way it synchronizes threads.
#[repr(C)]
pub struct Semaphore {
    state: UnsafeCell<SemState>,
}

// All state is guarded by the internal pshared mutex.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub fn new(initial: u32) -> Result<Self> {
        let count = i32::try_from(initial).map_err(|_| {
            Error::new(ErrorKind::InvalidInput, "initial value exceeds counter range")
        })?;
        Ok(Semaphore {
            state: UnsafeCell::new(SemState {
                mutex: PosixMutex::new()?,
                available: PosixCondition::new()?,
                count,
                wakeups: 0,
            }),
        })
    }

    /// Take one unit, blocking while none is free.
    pub fn acquire(&self) -> Result<()> {
        let SemState {
            mutex,
            available,
            count,
            wakeups,
        } = unsafe { &mut *self.state.get() };
        mutex.lock()?;
        *count -= 1;
        if *count < 0 {
            while *wakeups == 0 {
                available.wait(mutex)?;
            }
            *wakeups -= 1;
        }
        mutex.unlock()
    }

    /// Return one unit, resuming at most one blocked waiter.
    pub fn release(&self) -> Result<()> {
        let SemState {
            mutex,
            available,
            count,
            wakeups,
        } = unsafe { &mut *self.state.get() };
        mutex.lock()?;
        *count += 1;
        if *count <= 0 {
            *wakeups += 1;
            available.signal()?;
        }
        mutex.unlock()
    }

    /// Current counter value. Negative values count blocked waiters.
    pub fn value(&self) -> Result<i32> {
        let SemState { mutex, count, .. } = unsafe { &mut *self.state.get() };
        mutex.lock()?;
        let value = *count;
        mutex.unlock()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn counter_tracks_acquires_and_releases() {
        let sem = Semaphore::new(3).unwrap();
        assert_eq!(sem.value().unwrap(), 3);
        sem.acquire().unwrap();
        sem.acquire().unwrap();
        assert_eq!(sem.value().unwrap(), 1);
        sem.release().unwrap();
        sem.release().unwrap();
        assert_eq!(sem.value().unwrap(), 3);
    }

    #[test]
    fn counter_restored_after_completed_pairs() {
        let sem = Semaphore::new(1).unwrap();
        for _ in 0..5 {
            sem.acquire().unwrap();
            sem.release().unwrap();
        }
        assert_eq!(sem.value().unwrap(), 1);
    }

    #[test]
    fn oversized_initial_value_is_rejected() {
        assert!(Semaphore::new(u32::MAX).is_err());
        assert!(Semaphore::new(i32::MAX as u32).is_ok());
    }

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(1).unwrap());
        sem.acquire().unwrap();

        let entered = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                sem.acquire().unwrap();
                entered.store(1, Ordering::SeqCst);
                sem.release().unwrap();
            })
        };

        thread::sleep(Duration::from_millis(200));
        assert_eq!(entered.load(Ordering::SeqCst), 0);
        assert_eq!(sem.value().unwrap(), -1);

        sem.release().unwrap();
        waiter.join().unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert_eq!(sem.value().unwrap(), 1);
    }

    #[test]
    fn release_resumes_at_most_one_waiter() {
        let sem = Arc::new(Semaphore::new(0).unwrap());
        let resumed = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let sem = Arc::clone(&sem);
                let resumed = Arc::clone(&resumed);
                thread::spawn(move || {
                    sem.acquire().unwrap();
                    resumed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(resumed.load(Ordering::SeqCst), 0);
        assert_eq!(sem.value().unwrap(), -3);

        sem.release().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
        assert_eq!(sem.value().unwrap(), -2);

        sem.release().unwrap();
        sem.release().unwrap();
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(resumed.load(Ordering::SeqCst), 3);
        assert_eq!(sem.value().unwrap(), 0);
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let sem = Arc::new(Semaphore::new(1).unwrap());
        let occupancy = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let sem = Arc::clone(&sem);
                let occupancy = Arc::clone(&occupancy);
                thread::spawn(move || {
                    for _ in 0..200 {
                        sem.acquire().unwrap();
                        let inside = occupancy.fetch_add(1, Ordering::SeqCst) + 1;
                        assert_eq!(inside, 1);
                        occupancy.fetch_sub(1, Ordering::SeqCst);
                        sem.release().unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(sem.value().unwrap(), 1);
    }
}
