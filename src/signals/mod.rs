/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Phase-aware `SIGINT` handling: informational during ingest, a clean
//! shutdown trigger once the server is serving requests.

use anyhow::{Context, Result};
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use nix::unistd;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

const CONSTRUCTION: u8 = 0;
const SERVING: u8 = 1;

/// The two phases the server moves through; read by the signal coordinator,
/// written only by the main thread at the two phase boundaries.
#[derive(Debug, Default)]
pub struct Phase(AtomicU8);

impl Phase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(CONSTRUCTION)))
    }

    pub fn set_serving(&self) {
        self.0.store(SERVING, Ordering::Relaxed);
    }

    fn is_serving(&self) -> bool {
        self.0.load(Ordering::Relaxed) == SERVING
    }
}

/// Blocks `SIGINT` on the calling thread. Must run before any other thread
/// is spawned, since a thread inherits the signal mask of its creator: this
/// is how every thread in the process ends up with `SIGINT` blocked.
pub fn block_sigint() -> Result<()> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), None)
        .context("could not block SIGINT on the main thread")?;
    Ok(())
}

/// Owns the write end of the self-wakeup pipe and the dedicated thread that
/// synchronously waits for `SIGINT`.
pub struct SignalCoordinator {
    handle: Option<JoinHandle<()>>,
}

impl SignalCoordinator {
    /// Spawns the coordinator thread and returns it along with the read end
    /// of the self-wakeup pipe, which the dispatcher polls alongside the
    /// request FIFO.
    pub fn spawn(phase: Arc<Phase>) -> Result<(Self, OwnedFd)> {
        let (read_fd, write_fd) = unistd::pipe().context("could not create the self-wakeup pipe")?;

        let handle = std::thread::Builder::new()
            .name("signal-coordinator".into())
            .spawn(move || coordinator_loop(phase, write_fd))
            .context("could not spawn the signal coordinator thread")?;

        Ok((
            Self {
                handle: Some(handle),
            },
            read_fd,
        ))
    }

    /// Blocks until the coordinator thread has observed shutdown (or the
    /// process is exiting anyway); safe to call more than once.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn coordinator_loop(phase: Arc<Phase>, write_fd: OwnedFd) {
    let mut wait_set = SigSet::empty();
    wait_set.add(Signal::SIGINT);

    loop {
        match wait_set.wait() {
            Ok(Signal::SIGINT) => {
                if phase.is_serving() {
                    if let Err(err) = unistd::write(write_fd.as_raw_fd(), &[b'q']) {
                        log::error!("could not write to the self-wakeup pipe: {err}");
                    }
                    break;
                } else {
                    println!("Costruzione del grafo in corso");
                }
            }
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => continue,
            Err(err) => {
                log::error!("sigwait failed: {err}");
                break;
            }
        }
    }
    // Dropping `write_fd` here closes it, which is what lets the
    // dispatcher's `poll` observe end-of-file if it is ever re-entered
    // after shutdown.
}
