//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mhstore.
//
// Mhstore is free software: you can  redistribute it and/or modify it under
// the terms of  the GNU General Public  License as published by  the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mhstore is distributed  in the hope that  it will be useful,  but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Mhstore. If not, see <http://www.gnu.org/licenses/>.

//! Cooperative advisory locking for the load/mutate/save cycle.
//!
//! Suite commands run as separate short-lived processes which may hit the
//! same folder concurrently, so a writer takes an exclusive `flock` on the
//! folder's metadata file before loading and holds it until its atomic write
//! completes. Readers that never save do not lock at all; they just tolerate
//! the files changing between loads.
//!
//! Acquisition never blocks indefinitely. The lock is polled in nonblocking
//! mode until a deadline, after which the caller gets `Error::LockTimeout`
//! and may retry or give up.

use std::fs;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::warn;
use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};

use crate::support::error::Error;

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive advisory lock on a folder, released on drop.
#[derive(Debug)]
pub struct FolderLock {
    file: fs::File,
}

impl FolderLock {
    /// Acquire an exclusive lock on `path`, creating the file if absent.
    ///
    /// Polls in nonblocking mode; if the lock cannot be had within
    /// `timeout`, fails with `Error::LockTimeout`.
    pub fn acquire(
        path: impl AsRef<Path>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                Ok(()) => return Ok(FolderLock { file }),
                Err(nix::Error::Sys(Errno::EAGAIN)) => {
                    if Instant::now() >= deadline {
                        return Err(Error::LockTimeout);
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FolderLock {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!("Failed to release folder lock: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn second_acquisition_times_out_then_succeeds_after_release() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("lock");

        let held = FolderLock::acquire(&path, Duration::from_millis(10))
            .unwrap();
        assert_matches!(
            Err(Error::LockTimeout),
            FolderLock::acquire(&path, Duration::from_millis(10))
        );

        drop(held);
        FolderLock::acquire(&path, Duration::from_millis(10)).unwrap();
    }
}
