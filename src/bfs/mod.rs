/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The breadth-first search worker: one fire-and-forget task per request.

use crate::graph::NodeTable;
use anyhow::{Context, Result};
use nix::sys::resource::{getrusage, UsageWho};
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Bijective key transform used only to randomize insertion order in the
/// explored/parent index, so that dense sequential codes do not degenerate
/// a tree-shaped map into a list. Rotates the low 6 bits to the top and
/// flips every bit with a fixed mask; the serialized output never depends
/// on this, only the map's internal balance does.
pub fn shuffle(n: i32) -> i32 {
    let n = n as u32;
    let rotated = (n << 26) | (n >> 6);
    (rotated ^ 0x5555_5555) as i32
}

struct ParentEntry {
    original: i32,
    parent: i32,
}

/// The outcome of a single shortest-path search, independent of how it is
/// reported (used directly by tests; [`run_bfs`] renders it to the output
/// file and the standard-output summary line).
#[derive(Debug, PartialEq, Eq)]
pub enum BfsOutcome {
    /// Neither endpoint was necessarily invalid; `path` holds the node
    /// codes from `start` to `end` inclusive, in order.
    Path(Vec<i32>),
    /// Both endpoints exist but no path connects them.
    NoPath,
    /// `code` is not present in the node table.
    InvalidEndpoint(i32),
}

/// Runs the search itself, with no I/O: a FIFO frontier seeded with `start`
/// and a `shuffle`-keyed explored/parent index, exactly as specified.
pub fn compute_path(table: &NodeTable, start: i32, end: i32) -> BfsOutcome {
    if table.lookup(start).is_none() {
        return BfsOutcome::InvalidEndpoint(start);
    }
    if table.lookup(end).is_none() {
        return BfsOutcome::InvalidEndpoint(end);
    }

    let mut frontier: VecDeque<i32> = VecDeque::new();
    let mut explored: BTreeMap<i32, ParentEntry> = BTreeMap::new();

    frontier.push_back(start);
    explored.insert(
        shuffle(start),
        ParentEntry {
            original: start,
            parent: -1,
        },
    );

    let mut found = false;
    while let Some(current) = frontier.pop_front() {
        if current == end {
            found = true;
            break;
        }
        let Some(record) = table.lookup(current) else {
            continue;
        };
        for &neighbor in &record.neighbors {
            let key = shuffle(neighbor);
            if !explored.contains_key(&key) {
                explored.insert(
                    key,
                    ParentEntry {
                        original: neighbor,
                        parent: current,
                    },
                );
                frontier.push_back(neighbor);
            }
        }
    }

    if !found {
        return BfsOutcome::NoPath;
    }

    // Reconstruct by following parents from `end` back to `start`, capped
    // at the total node count as a defense against a corrupted chain (BFS
    // itself cannot produce a cycle here, but a cap costs nothing).
    let mut reversed = Vec::new();
    let mut trace = end;
    loop {
        reversed.push(trace);
        if reversed.len() > table.len() {
            log::error!("path reconstruction for {start}-{end} exceeded the node count, treating as corrupted");
            return BfsOutcome::NoPath;
        }
        let Some(entry) = explored.get(&shuffle(trace)) else {
            log::error!("path reconstruction for {start}-{end}: node {trace} missing from the explored index");
            return BfsOutcome::NoPath;
        };
        debug_assert_eq!(entry.original, trace);
        if entry.parent == -1 {
            break;
        }
        trace = entry.parent;
    }
    reversed.reverse();
    BfsOutcome::Path(reversed)
}

fn cpu_seconds() -> f64 {
    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => {
            let user = usage.user_time().tv_sec() as f64 + usage.user_time().tv_usec() as f64 / 1e6;
            let sys = usage.system_time().tv_sec() as f64 + usage.system_time().tv_usec() as f64 / 1e6;
            user + sys
        }
        Err(err) => {
            log::warn!("getrusage failed ({err}), reporting 0.00s CPU time");
            0.0
        }
    }
}

/// Answers one request end to end: runs the search, writes
/// `<start>.<end>` under `output_dir`, and prints the one-line summary
/// required on standard output. Never panics on a per-request I/O failure;
/// such failures are reported on standard output and otherwise ignored, per
/// the server's error-handling policy.
pub fn run_bfs(table: &NodeTable, start: i32, end: i32, output_dir: &Path) {
    let cpu_start = cpu_seconds();

    let path = output_dir.join(format!("{start}.{end}"));
    let file = match File::create(&path).with_context(|| format!("could not create {}", path.display())) {
        Ok(file) => file,
        Err(err) => {
            log::error!("{err:#}");
            println!("{start}.{end}: Errore creazione file output. Tempo di elaborazione 0.00 secondi");
            return;
        }
    };

    let outcome = compute_path(table, start, end);
    if let Err(err) = write_outcome(file, &outcome, table, start, end) {
        log::error!("failed writing output for {start}.{end}: {err:#}");
    }

    let elapsed = cpu_seconds() - cpu_start;
    match outcome {
        BfsOutcome::Path(path) => {
            let length = path.len().saturating_sub(1);
            println!("{start}.{end}: Lunghezza minima {length}. Tempo di elaborazione {elapsed:.2} secondi");
        }
        BfsOutcome::NoPath => {
            println!("{start}.{end}: Nessun cammino. Tempo di elaborazione {elapsed:.2} secondi");
        }
        BfsOutcome::InvalidEndpoint(_) => {
            // The invalid-endpoint case is only ever reported in the
            // output file, per the interface contract.
        }
    }
}

fn write_outcome(
    mut file: File,
    outcome: &BfsOutcome,
    table: &NodeTable,
    start: i32,
    end: i32,
) -> Result<()> {
    match outcome {
        BfsOutcome::Path(nodes) => {
            for &code in nodes {
                let record = table
                    .lookup(code)
                    .expect("every code on a reconstructed path exists in the table");
                writeln!(file, "{}\t{}\t{}", record.code, record.name, record.year)?;
            }
        }
        BfsOutcome::NoPath => {
            writeln!(file, "non esistono cammini da {start} a {end}")?;
        }
        BfsOutcome::InvalidEndpoint(code) => {
            writeln!(file, "codice {code} non valido")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_edges(edges: &[(i32, &[i32])]) -> NodeTable {
        let mut names = String::new();
        for &(code, _) in edges {
            names.push_str(&format!("{code}\tActor{code}\t1970\n"));
        }
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), names).unwrap();
        let mut table = NodeTable::from_names_file(file.path()).unwrap();
        for &(code, neighbors) in edges {
            table.install_neighbors(code, neighbors.to_vec());
        }
        table
    }

    #[test]
    fn shuffle_is_a_bijection_over_sampled_inputs() {
        let mut seen = std::collections::HashSet::new();
        for n in -1000..1000 {
            assert!(seen.insert(shuffle(n)), "collision at {n}");
        }
    }

    #[test]
    fn direct_edge_is_a_two_node_path() {
        let table = table_with_edges(&[(1, &[2]), (2, &[1])]);
        assert_eq!(compute_path(&table, 1, 2), BfsOutcome::Path(vec![1, 2]));
    }

    #[test]
    fn no_path_between_disconnected_components() {
        let table = table_with_edges(&[(1, &[]), (2, &[])]);
        assert_eq!(compute_path(&table, 1, 2), BfsOutcome::NoPath);
    }

    #[test]
    fn unknown_endpoint_is_reported_invalid() {
        let table = table_with_edges(&[(1, &[])]);
        assert_eq!(compute_path(&table, 1, 99), BfsOutcome::InvalidEndpoint(99));
    }

    #[test]
    fn self_request_is_a_single_node_path() {
        let table = table_with_edges(&[(1, &[])]);
        assert_eq!(compute_path(&table, 1, 1), BfsOutcome::Path(vec![1]));
    }

    #[test]
    fn shortest_path_picks_the_two_hop_route_over_a_longer_one() {
        let table = table_with_edges(&[
            (1, &[2, 4]),
            (2, &[1, 3]),
            (3, &[2, 5]),
            (4, &[1, 5]),
            (5, &[3, 4]),
        ]);
        match compute_path(&table, 1, 5) {
            BfsOutcome::Path(path) => assert_eq!(path.len(), 3),
            other => panic!("expected a path, got {other:?}"),
        }
    }
}
