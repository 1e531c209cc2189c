/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The construction-phase pipeline: one producer thread reads the graph
//! file, a bounded pool of consumer threads parse adjacency lines, and the
//! results are installed into the [`NodeTable`] by the coordinating thread.

use crate::graph::NodeTable;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded};
use dsi_progress_logger::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;

/// A bounded, thread-safe FIFO of owned text lines with a single producer
/// and a pool of consumers. `crossbeam_channel::bounded` already gives
/// blocking `send`/`recv` and signals termination by disconnection, so this
/// is a thin named wrapper rather than a hand-rolled condvar monitor.
struct LineBuffer {
    tx: crossbeam_channel::Sender<String>,
    rx: crossbeam_channel::Receiver<String>,
}

impl LineBuffer {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Blocks while the buffer is full; never drops a line.
    fn put(&self, line: String) {
        // The buffer is only ever closed by this same producer after all
        // `put`s are issued, so `send` cannot observe a disconnected
        // channel here.
        let _ = self.tx.send(line);
    }

    fn mark_done(self) {
        drop(self.tx);
    }
}

/// Reads the names file and graph file at `names_path`/`graph_path` and
/// returns the fully-populated [`NodeTable`]. `num_consumers` parallel
/// threads parse adjacency lines; `1..=1024` per the server's own limit.
pub fn build_node_table(
    names_path: impl AsRef<Path>,
    graph_path: impl AsRef<Path>,
    num_consumers: usize,
) -> Result<NodeTable> {
    let mut table = NodeTable::from_names_file(names_path)?;

    let graph_path = graph_path.as_ref();
    let graph_file = File::open(graph_path)
        .with_context(|| format!("could not open graph file {}", graph_path.display()))?;

    let buffer = LineBuffer::new(num_consumers.saturating_mul(10).max(10));
    let (result_tx, result_rx) = unbounded::<(i32, Vec<i32>)>();

    let mut handles = Vec::with_capacity(num_consumers);
    for _ in 0..num_consumers {
        let line_rx = buffer.rx.clone();
        let result_tx = result_tx.clone();
        handles.push(thread::spawn(move || consumer_loop(line_rx, result_tx)));
    }
    // The coordinator keeps no reader/writer of its own beyond what it
    // cloned out to the consumers above.
    drop(result_tx);

    let mut progress = progress_logger!(item_name = "line");
    progress.start("reading graph file...");

    for line in BufReader::new(graph_file).lines() {
        let line = line
            .with_context(|| format!("error reading {}", graph_path.display()))?;
        if !line.is_empty() {
            buffer.put(line);
            progress.update_and_display();
        }
    }
    buffer.mark_done();

    // Draining the results channel finishes once every consumer has
    // returned and dropped its cloned sender; this doubles as the
    // synchronization point before `join`.
    for (head, neighbors) in result_rx.iter() {
        if table.has_neighbors(head) {
            log::warn!("head code {head} appears more than once in the graph file, first occurrence kept");
            continue;
        }
        table.install_neighbors(head, neighbors);
    }

    for handle in handles {
        handle
            .join()
            .expect("consumer thread panicked while parsing the graph file");
    }

    progress.done();
    Ok(table)
}

fn consumer_loop(
    line_rx: crossbeam_channel::Receiver<String>,
    result_tx: crossbeam_channel::Sender<(i32, Vec<i32>)>,
) {
    while let Ok(line) = line_rx.recv() {
        let mut tokens = line.split_whitespace();
        let head = match tokens.next() {
            Some(head) => head,
            None => continue,
        };
        let head: i32 = match head.parse() {
            Ok(head) => head,
            Err(_) => {
                log::warn!("malformed graph line (non-numeric head {head:?}), skipped");
                continue;
            }
        };
        let mut neighbors = Vec::with_capacity(8);
        for token in tokens {
            match token.parse() {
                Ok(code) => neighbors.push(code),
                Err(_) => log::warn!("non-numeric neighbor {token:?} for head {head}, skipped"),
            }
        }
        if result_tx.send((head, neighbors)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn builds_adjacency_from_two_files() {
        let names = write_file("1\tAlice\t1970\n2\tBob\t1971\n3\tCarol\t1972\n");
        let graph = write_file("1 2\n2 1 3\n3 2\n");
        let table = build_node_table(names.path(), graph.path(), 2).unwrap();
        assert_eq!(table.lookup(1).unwrap().neighbors, vec![2]);
        assert_eq!(table.lookup(2).unwrap().neighbors, vec![1, 3]);
        assert_eq!(table.lookup(3).unwrap().neighbors, vec![2]);
    }

    #[test]
    fn unknown_head_codes_are_skipped_with_a_warning() {
        let names = write_file("1\tAlice\t1970\n");
        let graph = write_file("1 1\n99 1\n");
        let table = build_node_table(names.path(), graph.path(), 1).unwrap();
        assert_eq!(table.lookup(1).unwrap().neighbors, vec![1]);
        assert!(table.lookup(99).is_none());
    }

    #[test]
    fn empty_graph_file_leaves_neighbors_empty() {
        let names = write_file("1\tAlice\t1970\n2\tBob\t1971\n");
        let graph = write_file("");
        let table = build_node_table(names.path(), graph.path(), 4).unwrap();
        assert!(table.lookup(1).unwrap().neighbors.is_empty());
    }
}
