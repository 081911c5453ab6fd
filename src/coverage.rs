//! Per-test coverage, expressed as sets of node markers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::CoverageError;
use crate::mutants::NodeMarker;
use crate::syntax::Program;

#[derive(Debug, Clone, Default)]
pub struct CoverageMap {
    pub test_covered_nodes: BTreeMap<String, BTreeSet<NodeMarker>>,
    pub covered_nodes: usize,
    pub all_nodes: usize,
}

impl CoverageMap {
    /// Build from per-test marker sets over a universe of `all` nodes.
    pub fn new(test_covered_nodes: BTreeMap<String, BTreeSet<NodeMarker>>, all: &BTreeSet<NodeMarker>) -> Self {
        let covered = test_covered_nodes
            .values()
            .flatten()
            .filter(|m| all.contains(m))
            .collect::<BTreeSet<_>>()
            .len();
        CoverageMap {
            test_covered_nodes,
            covered_nodes: covered,
            all_nodes: all.len(),
        }
    }

    /// Union of everything any test reached.
    pub fn covered(&self) -> BTreeSet<NodeMarker> {
        self.test_covered_nodes.values().flatten().copied().collect()
    }

    /// Tests absent from the map reached nothing.
    pub fn test_reaches_any(&self, test_id: &str, markers: &BTreeSet<NodeMarker>) -> bool {
        self.test_covered_nodes
            .get(test_id)
            .is_some_and(|nodes| !nodes.is_disjoint(markers))
    }
}

pub trait CoverageProvider {
    /// Discard anything a previous run left behind.
    fn reset(&self) -> Result<(), CoverageError> {
        Ok(())
    }

    /// The program the coverage run executes.
    fn instrument(&self, program: &Program) -> Program;

    /// Read what the coverage run recorded for `target`.
    fn collect(&self, target: &str, program: &Program, nodes: &BTreeSet<NodeMarker>) -> Result<CoverageMap, CoverageError>;
}

/// Coverage written by the test command itself as
/// `{"<test id>": {"<target path>": [line, ...]}}`.
pub struct ReportCoverage {
    path: PathBuf,
}

impl ReportCoverage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ReportCoverage { path: path.into() }
    }
}

type LineReport = BTreeMap<String, BTreeMap<String, Vec<usize>>>;

impl CoverageProvider for ReportCoverage {
    fn reset(&self) -> Result<(), CoverageError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(CoverageError::Read {
                path: self.path.clone(),
                source: e,
            }),
            _ => Ok(()),
        }
    }

    fn instrument(&self, program: &Program) -> Program {
        program.clone()
    }

    fn collect(&self, target: &str, program: &Program, nodes: &BTreeSet<NodeMarker>) -> Result<CoverageMap, CoverageError> {
        let data = std::fs::read_to_string(&self.path).map_err(|source| CoverageError::Read {
            path: self.path.clone(),
            source,
        })?;
        let report: LineReport = serde_json::from_str(&data).map_err(|source| CoverageError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let node_lines: Vec<(NodeMarker, usize)> = nodes
            .iter()
            .map(|m| (*m, line_of(program.text(), m.start)))
            .collect();

        let per_test = report
            .into_iter()
            .map(|(test, files)| {
                let lines: BTreeSet<usize> = files
                    .into_iter()
                    .filter(|(file, _)| same_file(file, target))
                    .flat_map(|(_, lines)| lines)
                    .collect();
                let markers = node_lines
                    .iter()
                    .filter(|(_, line)| lines.contains(line))
                    .map(|(m, _)| *m)
                    .collect();
                (test, markers)
            })
            .collect();
        Ok(CoverageMap::new(per_test, nodes))
    }
}

/// Report keys may be absolute or relative to a different root than the
/// target name; compare whole path components from the end.
fn same_file(reported: &str, target: &str) -> bool {
    let (reported, target) = (Path::new(reported), Path::new(target));
    reported.ends_with(target) || target.ends_with(reported)
}

/// 1-based line holding byte `offset`.
pub fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
