/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Multiplexes the request FIFO and the self-wakeup channel, spawning a
//! detached BFS worker for every well-formed request.

use crate::bfs::run_bfs;
use crate::graph::NodeTable;
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::stat::Mode;
use nix::unistd::{mkfifo, read, unlink};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A parsed request: two native-endian 32-bit codes read as raw bytes from
/// the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub start: i32,
    pub end: i32,
}

impl Request {
    const WIRE_LEN: usize = 8;

    fn from_bytes(bytes: [u8; Self::WIRE_LEN]) -> Self {
        let start = i32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        let end = i32::from_ne_bytes(bytes[4..8].try_into().unwrap());
        Self { start, end }
    }
}

/// Creates (replacing any stale one) the named FIFO at `pipe_path` with
/// mode `0666` and opens it for non-blocking reads.
fn open_request_fifo(pipe_path: &Path) -> Result<OwnedFd> {
    let _ = unlink(pipe_path);
    mkfifo(pipe_path, Mode::from_bits_truncate(0o666))
        .with_context(|| format!("mkfifo failed for {}", pipe_path.display()))?;
    open(pipe_path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())
        .with_context(|| format!("could not open {} for reading", pipe_path.display()))
        .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Runs the dispatcher loop until the wakeup fd becomes readable. Returns
/// the handles of every BFS worker it spawned, so the caller can join them
/// (with a grace period) before exiting.
pub fn run_dispatcher(
    table: Arc<NodeTable>,
    pipe_path: PathBuf,
    wakeup_fd: OwnedFd,
    output_dir: PathBuf,
) -> Result<Vec<JoinHandle<()>>> {
    let mut fifo_fd = open_request_fifo(&pipe_path)?;
    let mut workers = Vec::new();

    loop {
        let mut fds = [
            PollFd::new(fifo_fd.as_fd(), PollFlags::POLLIN),
            PollFd::new(wakeup_fd.as_fd(), PollFlags::POLLIN),
        ];

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err).context("poll on the request pipe failed"),
        }

        if fds[1]
            .revents()
            .is_some_and(|events| events.contains(PollFlags::POLLIN))
        {
            break;
        }

        if fds[0]
            .revents()
            .is_some_and(|events| events.intersects(PollFlags::POLLIN | PollFlags::POLLHUP))
        {
            match read_request(&fifo_fd) {
                ReadOutcome::Request(req) => {
                    spawn_worker(&mut workers, Arc::clone(&table), req, output_dir.clone());
                }
                ReadOutcome::WouldBlock | ReadOutcome::Partial => {}
                ReadOutcome::Eof => {
                    fifo_fd = reopen_fifo(&pipe_path, fifo_fd)?;
                }
            }
        }
    }

    Ok(workers)
}

enum ReadOutcome {
    Request(Request),
    WouldBlock,
    /// A short read; partials are not buffered across `poll` wakeups, so
    /// the bytes are discarded.
    Partial,
    Eof,
}

fn read_request(fifo_fd: &OwnedFd) -> ReadOutcome {
    let mut buf = [0u8; Request::WIRE_LEN];
    match read(fifo_fd.as_raw_fd(), &mut buf) {
        Ok(0) => ReadOutcome::Eof,
        Ok(n) if n == Request::WIRE_LEN => ReadOutcome::Request(Request::from_bytes(buf)),
        Ok(_) => ReadOutcome::Partial,
        Err(Errno::EAGAIN) => ReadOutcome::WouldBlock,
        Err(err) => {
            log::error!("read from the request pipe failed: {err}");
            ReadOutcome::WouldBlock
        }
    }
}

fn reopen_fifo(pipe_path: &Path, old: OwnedFd) -> Result<OwnedFd> {
    drop(old);
    open(pipe_path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())
        .with_context(|| format!("could not reopen {}", pipe_path.display()))
        .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
}

fn spawn_worker(
    workers: &mut Vec<JoinHandle<()>>,
    table: Arc<NodeTable>,
    request: Request,
    output_dir: PathBuf,
) {
    let result = std::thread::Builder::new()
        .name(format!("bfs-{}-{}", request.start, request.end))
        .spawn(move || run_bfs(&table, request.start, request.end, &output_dir));
    match result {
        Ok(handle) => workers.push(handle),
        Err(err) => log::error!(
            "could not spawn BFS worker for {}.{}: {err}",
            request.start,
            request.end
        ),
    }
}
