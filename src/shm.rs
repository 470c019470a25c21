use std::io;
use std::num::NonZero;
use std::ops::{Deref, DerefMut};
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::PathBuf;
use std::ptr::NonNull;
use std::slice;

use log::debug;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc::c_void;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::{fstat, Mode};
use nix::unistd::ftruncate;

use crate::error::{Error, Result};

/// A view of a shared memory segment as a `repr(C)` struct.
///
/// # Safety
///
/// Implementations must only reinterpret segment bytes as types for which
/// any bit pattern of the right size and alignment is a valid value.
pub unsafe trait FromShm {
    fn from_shm(shm: &Shm) -> Result<&Self>;
    fn from_shm_mut(shm: &mut Shm) -> Result<&mut Self>;
}

pub struct OpenOptions {
    mode: Mode,
    oflg: OFlag,
    prot: ProtFlags,
    flgs: MapFlags,
}

impl OpenOptions {
    /// Attach to an existing segment, taking its size from the file.
    pub fn open(self, name: &str) -> Result<Shm> {
        let name = Self::prepend_slash(name);
        let fd = shm_open(name.as_str(), self.oflg, self.mode).map_err(Error::init)?;
        let statbuf = fstat(fd.as_raw_fd()).map_err(Error::init)?;
        let len = statbuf.st_size as usize;
        Self::map_raw(fd, name, len, self.prot, self.flgs, false)
    }

    /// Create a segment of `len` bytes and attach to it.
    pub fn map(self, name: &str, len: usize) -> Result<Shm> {
        let name = Self::prepend_slash(name);
        let fd = shm_open(name.as_str(), self.oflg, self.mode).map_err(Error::init)?;
        ftruncate(&fd, len as i64).map_err(Error::init)?;
        Self::map_raw(fd, name, len, self.prot, self.flgs, true)
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Mode::from_bits(mode).expect("invalid mode");
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        if create {
            self.oflg |= OFlag::O_CREAT;
        } else {
            self.oflg &= !OFlag::O_CREAT;
        }
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        if exclusive {
            self.oflg |= OFlag::O_EXCL;
        } else {
            self.oflg &= !OFlag::O_EXCL;
        }
        self
    }

    pub fn read(mut self, readable: bool) -> Self {
        if readable {
            self.prot |= ProtFlags::PROT_READ;
        } else {
            self.prot &= !ProtFlags::PROT_READ;
        }
        self
    }

    pub fn write(mut self, writable: bool) -> Self {
        if writable {
            self.prot |= ProtFlags::PROT_WRITE;
        } else {
            self.prot &= !ProtFlags::PROT_WRITE;
        }
        self
    }

    fn map_raw(
        fd: OwnedFd,
        name: String,
        len: usize,
        prot: ProtFlags,
        flgs: MapFlags,
        owns: bool,
    ) -> Result<Shm> {
        let len = NonZero::new(len).ok_or_else(|| {
            Error::init(io::Error::new(
                io::ErrorKind::InvalidInput,
                "segment size cannot be zero",
            ))
        })?;
        let ptr = unsafe { mmap(None, len, prot, flgs, &fd, 0).map_err(Error::init)? };
        debug!("mapped segment {} ({} bytes)", name, len);
        Ok(Shm {
            name: name.into(),
            ptr,
            len: len.get(),
            owns,
        })
    }

    fn prepend_slash(name: &str) -> String {
        if name.chars().nth(0) != Some('/') {
            String::from("/") + name
        } else {
            String::from(name)
        }
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            mode: Mode::from_bits(0o644).unwrap(),
            oflg: OFlag::O_RDWR,
            prot: ProtFlags::PROT_NONE,
            flgs: MapFlags::MAP_SHARED,
        }
    }
}

pub struct Shm {
    name: PathBuf,
    ptr: NonNull<c_void>,
    len: usize,
    // Only the handle that created the segment unlinks its name.
    owns: bool,
}

impl Shm {
    pub fn new(name: &str, size: usize) -> Result<Self> {
        Shm::options()
            .read(true)
            .write(true)
            .create(true)
            .exclusive(true)
            .map(name, size)
    }

    pub fn open(name: &str) -> Result<Self> {
        Shm::options().read(true).write(true).open(name)
    }

    pub fn options() -> OpenOptions {
        OpenOptions::default()
    }

    /// Remove a stale segment left behind by a crashed run.
    pub fn unlink(name: &str) -> Result<()> {
        let name = OpenOptions::prepend_slash(name);
        match shm_unlink(name.as_str()) {
            Err(Errno::ENOENT) => Ok(()),
            r => r.map_err(Error::init),
        }
    }

    /// Detach from the segment and, if this handle created it, destroy it.
    ///
    /// `Drop` does the same on a best-effort basis; this is the checked
    /// variant for teardown paths that must report failure.
    pub fn close(mut self) -> Result<()> {
        let name = std::mem::take(&mut self.name);
        let (ptr, len, owns) = (self.ptr, self.len, self.owns);
        std::mem::forget(self);
        unsafe { munmap(ptr, len).map_err(Error::teardown)? };
        if owns {
            match shm_unlink(&name) {
                Err(Errno::ENOENT) => Ok(()),
                r => r.map_err(Error::teardown),
            }?;
        }
        debug!("closed segment {}", name.display());
        Ok(())
    }
}

impl Deref for Shm {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }
}

impl DerefMut for Shm {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, self.len) }
    }
}

impl Drop for Shm {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr, self.len);
        }
        if self.owns {
            // Ignore ENOENT in case another process already unlinked the name.
            let _ = shm_unlink(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_name(tag: &str) -> String {
        format!("/shmbank-shm-{}-{}", tag, std::process::id())
    }

    #[test]
    fn create_open_roundtrip() {
        let name = segment_name("roundtrip");
        let mut shm = Shm::new(&name, 64).unwrap();
        shm[..4].copy_from_slice(&[1, 2, 3, 4]);

        let other = Shm::open(&name).unwrap();
        assert_eq!(other.len(), 64);
        assert_eq!(&other[..4], &[1, 2, 3, 4]);

        drop(other);
        // The attaching handle must not have unlinked the name.
        let again = Shm::open(&name).unwrap();
        assert_eq!(&again[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn close_destroys_segment() {
        let name = segment_name("close");
        let shm = Shm::new(&name, 16).unwrap();
        shm.close().unwrap();
        assert!(Shm::open(&name).is_err());
    }

    #[test]
    fn exclusive_create_fails_on_collision() {
        let name = segment_name("collision");
        let _shm = Shm::new(&name, 16).unwrap();
        assert!(Shm::new(&name, 16).is_err());
    }

    #[test]
    fn zero_size_is_rejected() {
        let name = segment_name("zero");
        let result = Shm::new(&name, 0);
        assert!(result.is_err());
        Shm::unlink(&name).unwrap();
    }

    #[test]
    fn unlink_tolerates_missing_segment() {
        Shm::unlink("/shmbank-shm-never-created").unwrap();
    }
}
