/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![deny(unreachable_pub)]
#![deny(unreachable_patterns)]

//! Ingest and serve shortest-path queries over an actor co-appearance graph.
//!
//! The crate is split along the two phases described by the server: [`graph`]
//! and [`ingest`] build the immutable, shared [`graph::NodeTable`]; [`bfs`],
//! [`dispatch`] and [`signals`] serve requests against it until an interrupt
//! is observed during the serving phase.

pub mod bfs;
pub mod dispatch;
pub mod graph;
pub mod ingest;
pub mod signals;

/// Re-exports the pieces most callers need.
pub mod prelude {
    pub use crate::bfs::{run_bfs, shuffle, BfsOutcome};
    pub use crate::dispatch::{run_dispatcher, Request};
    pub use crate::graph::{NodeRecord, NodeTable};
    pub use crate::ingest::build_node_table;
    pub use crate::signals::{Phase, SignalCoordinator};
}
