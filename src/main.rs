/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

mod cli;

use anyhow::{Context, Result};
use cammini::{dispatch, ingest, signals};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the main thread waits for in-flight BFS workers to finish after
/// shutdown is requested, before giving up and freeing the node table
/// regardless.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(20);

const REQUEST_PIPE_NAME: &str = "cammini.pipe";

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::CliArgs::parse();

    signals::block_sigint()?;
    let phase = signals::Phase::new();
    let (mut coordinator, wakeup_fd) = signals::SignalCoordinator::spawn(Arc::clone(&phase))?;
    println!("{}", std::process::id());

    log::info!("building node table from {:?} and {:?}", args.names_file, args.graph_file);
    let table = ingest::build_node_table(
        &args.names_file,
        &args.graph_file,
        args.num_consumers as usize,
    )
    .context("failed to build the node table")?;
    log::info!("node table ready: {} actors", table.len());
    let table = Arc::new(table);

    phase.set_serving();

    let pipe_path = PathBuf::from(REQUEST_PIPE_NAME);
    let output_dir = PathBuf::from(".");
    let workers = dispatch::run_dispatcher(
        Arc::clone(&table),
        pipe_path.clone(),
        wakeup_fd,
        output_dir,
    )
    .context("request dispatcher failed")?;

    join_with_grace_period(workers, SHUTDOWN_GRACE_PERIOD);

    let _ = std::fs::remove_file(&pipe_path);
    coordinator.join();
    drop(table);

    Ok(())
}

/// Waits for every worker to finish, but never past `deadline`. `JoinHandle`
/// has no timed join, so this polls `is_finished` instead of blindly
/// sleeping for the whole grace period: a fast-draining worker set lets the
/// process exit early. Workers still running when the deadline passes are
/// left to finish on their own, not cancelled, and are simply not joined.
fn join_with_grace_period(mut workers: Vec<std::thread::JoinHandle<()>>, grace_period: Duration) {
    let deadline = Instant::now() + grace_period;
    loop {
        workers.retain(|w| !w.is_finished());
        if workers.is_empty() {
            return;
        }
        if Instant::now() >= deadline {
            log::warn!(
                "shutdown grace period elapsed with {} BFS worker(s) still running",
                workers.len()
            );
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
