/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Command-line argument parsing for the `cammini` binary.

use clap::Parser;
use std::path::PathBuf;

/// Serves shortest-path queries over an actor co-appearance graph.
#[derive(Parser, Debug)]
#[command(name = "cammini", about, long_about = None)]
pub struct CliArgs {
    /// Tab-separated `code<TAB>name<TAB>year` file, one actor per line.
    pub names_file: PathBuf,

    /// Whitespace-separated adjacency file: head code followed by neighbor codes.
    pub graph_file: PathBuf,

    /// Number of consumer threads used while parsing the graph file.
    #[arg(value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub num_consumers: u64,
}
