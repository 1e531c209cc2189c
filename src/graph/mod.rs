/*
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The immutable, sorted node table built during the ingest phase.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single actor: a unique `code`, a display `name`, a release `year`, and
/// the (possibly empty) list of co-starring neighbor codes, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub code: i32,
    pub name: String,
    pub year: i32,
    pub neighbors: Vec<i32>,
    installed: bool,
}

/// A sorted-by-code, immutable-after-construction table of [`NodeRecord`]s.
///
/// The table is assembled in two steps: [`NodeTable::from_names_file`] reads
/// the skeleton (code, name, year) and sorts it by code; [`NodeTable::install_neighbors`]
/// is then called at most once per code, from the single ingest-coordinating
/// thread, to attach each record's adjacency list. After ingest, the table is
/// read-only and is shared across BFS workers behind an `Arc`.
#[derive(Debug, Default)]
pub struct NodeTable {
    records: Vec<NodeRecord>,
}

impl NodeTable {
    /// Reads `code<TAB>name<TAB>year` lines, skipping empty ones, and returns
    /// the resulting table sorted by `code` ascending.
    pub fn from_names_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("could not open names file {}", path.display()))?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("error reading {} at line {}", path.display(), lineno + 1))?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let (code, name, year) = match (fields.next(), fields.next(), fields.next()) {
                (Some(code), Some(name), Some(year)) => (code, name, year),
                _ => {
                    log::warn!("{}:{}: malformed names line, skipped", path.display(), lineno + 1);
                    continue;
                }
            };
            let code: i32 = match code.parse() {
                Ok(code) => code,
                Err(_) => {
                    log::warn!("{}:{}: non-numeric code {:?}, skipped", path.display(), lineno + 1, code);
                    continue;
                }
            };
            let year: i32 = match year.parse() {
                Ok(year) => year,
                Err(_) => {
                    log::warn!("{}:{}: non-numeric year {:?}, skipped", path.display(), lineno + 1, year);
                    continue;
                }
            };
            records.push(NodeRecord {
                code,
                name: name.to_owned(),
                year,
                neighbors: Vec::new(),
                installed: false,
            });
        }
        if records.is_empty() {
            anyhow::bail!("{} is empty or contains no valid actors", path.display());
        }
        records.sort_by_key(|r| r.code);
        Ok(Self { records })
    }

    /// Binary-searches for `code`; `O(log n)`.
    pub fn lookup(&self, code: i32) -> Option<&NodeRecord> {
        self.index_of(code).map(|i| &self.records[i])
    }

    fn index_of(&self, code: i32) -> Option<usize> {
        self.records.binary_search_by_key(&code, |r| r.code).ok()
    }

    /// Attaches `neighbors` to the record for `code`. Returns `false` (and
    /// logs a warning) if `code` is not in the table; callers must not call
    /// this twice for the same `code`, see [`NodeTable::has_neighbors`].
    pub fn install_neighbors(&mut self, code: i32, neighbors: Vec<i32>) -> bool {
        match self.index_of(code) {
            Some(i) => {
                self.records[i].neighbors = neighbors;
                self.records[i].installed = true;
                true
            }
            None => {
                log::warn!(
                    "head code {code} appears in the graph file but not in the names file, line ignored"
                );
                false
            }
        }
    }

    /// Whether [`NodeTable::install_neighbors`] has already been called for
    /// `code`. Used by the ingest pipeline to detect and warn about a head
    /// code repeated across lines.
    pub fn has_neighbors(&self, code: i32) -> bool {
        self.index_of(code)
            .map(|i| self.records[i].installed)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_names(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn sorted_by_code() {
        let f = write_names("3\tCarol\t1972\n1\tAlice\t1970\n2\tBob\t1971\n");
        let table = NodeTable::from_names_file(f.path()).unwrap();
        let codes: Vec<i32> = table.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![1, 2, 3]);
    }

    #[test]
    fn lookup_hit_and_miss() {
        let f = write_names("1\tAlice\t1970\n2\tBob\t1971\n");
        let table = NodeTable::from_names_file(f.path()).unwrap();
        assert_eq!(table.lookup(2).unwrap().name, "Bob");
        assert!(table.lookup(99).is_none());
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let f = write_names("1\tAlice\t1970\n\n2\tBob\n3\tCarol\t1972\n");
        let table = NodeTable::from_names_file(f.path()).unwrap();
        let codes: Vec<i32> = table.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![1, 3]);
    }

    #[test]
    fn install_neighbors_unknown_code_warns_and_fails() {
        let f = write_names("1\tAlice\t1970\n");
        let mut table = NodeTable::from_names_file(f.path()).unwrap();
        assert!(!table.install_neighbors(42, vec![1]));
        assert!(table.install_neighbors(1, vec![2, 3]));
        assert_eq!(table.lookup(1).unwrap().neighbors, vec![2, 3]);
    }

    #[test]
    fn has_neighbors_tracks_installation_not_list_length() {
        let f = write_names("1\tAlice\t1970\n");
        let mut table = NodeTable::from_names_file(f.path()).unwrap();
        assert!(!table.has_neighbors(1));
        table.install_neighbors(1, Vec::new());
        assert!(table.has_neighbors(1));
    }
}
