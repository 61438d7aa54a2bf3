//! Dependency-aware phase planning for one turn's tool calls.
//!
//! A batch arrives in the model's emission order but with no stated
//! dependencies. The declared effects induce must-happen-before edges:
//!
//! - successive writes to the same file keep their emission order
//! - every write to a file precedes every read of that file
//! - everything touching a path precedes a delete of that path
//! - writes and deletes inside a directory precede a plain `list_dir` of it
//!
//! Kahn's algorithm layers the resulting graph into phases: each phase is a
//! set of mutually independent calls intended to run concurrently, and
//! phases execute strictly in order. Should the edge rules ever close a
//! cycle (two deletes of one path already do), the planner degrades to a
//! single phase holding every call in emission order: parallelism is lost
//! but no individual operation misbehaves.
//!
//! Deliberately unordered: reads before writes of the same file in the same
//! batch (they may observe either version), `list_dir_recursive` against
//! mutations anywhere in its subtree, and `run_command` against everything.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use tracing::debug;

use crate::toolcall::ToolCall;

/// Layered schedule for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Layers in execution order; every batch index appears exactly once.
    pub layers: Vec<Vec<usize>>,
    /// Set when the planner degraded to the single fallback layer. The
    /// executor must then run that layer one call at a time in emission
    /// order instead of concurrently.
    pub sequential: bool,
}

fn add_edge(adj: &mut [Vec<usize>], indeg: &mut [usize], from: usize, to: usize) {
    adj[from].push(to);
    indeg[to] += 1;
}

/// Lay the batch out as a sequence of phases.
///
/// Intra-layer order is unspecified for concurrent layers; callers must not
/// depend on it.
pub fn plan_phases(calls: &[ToolCall]) -> Schedule {
    let n = calls.len();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indeg = vec![0usize; n];

    // Group by touched file and by listed directory, preserving emission order.
    let mut by_path: HashMap<&PathBuf, Vec<usize>> = HashMap::new();
    let mut listers_by_dir: HashMap<&PathBuf, Vec<usize>> = HashMap::new();
    for (i, call) in calls.iter().enumerate() {
        if let Some(path) = &call.path_abs {
            by_path.entry(path).or_default().push(i);
        }
        if call.name == "list_dir" {
            if let Some(dir) = &call.dir_abs {
                listers_by_dir.entry(dir).or_default().push(i);
            }
        }
    }

    // Same-file ordering.
    for indexes in by_path.values() {
        let mut writes = Vec::new();
        let mut reads = Vec::new();
        let mut deletes = Vec::new();
        for &i in indexes {
            match calls[i].name.as_str() {
                "write_file" => writes.push(i),
                "read_file" => reads.push(i),
                "delete_path" => deletes.push(i),
                _ => {}
            }
        }

        // Multiple writes to one file serialize deterministically.
        for pair in writes.windows(2) {
            add_edge(&mut adj, &mut indeg, pair[0], pair[1]);
        }
        // Writes land before reads of the same file.
        for &w in &writes {
            for &r in &reads {
                add_edge(&mut adj, &mut indeg, w, r);
            }
        }
        // Everything on the path lands before its deletion.
        for &i in indexes {
            for &d in &deletes {
                if i != d {
                    add_edge(&mut adj, &mut indeg, i, d);
                }
            }
        }
    }

    // A plain listing must reflect same-turn mutations in its directory.
    for (dir, listers) in &listers_by_dir {
        for (i, call) in calls.iter().enumerate() {
            let Some(path) = &call.path_abs else { continue };
            if path.parent() != Some(dir.as_path()) {
                continue;
            }
            if call.name == "write_file" || call.name == "delete_path" {
                for &lister in listers {
                    add_edge(&mut adj, &mut indeg, i, lister);
                }
            }
        }
    }

    // Kahn's topological layering.
    let mut phases: Vec<Vec<usize>> = Vec::new();
    let mut ready: VecDeque<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
    let mut placed = 0;
    while !ready.is_empty() {
        let frontier = ready.len();
        let mut layer = Vec::with_capacity(frontier);
        for _ in 0..frontier {
            let Some(u) = ready.pop_front() else { break };
            layer.push(u);
            for &v in &adj[u] {
                indeg[v] -= 1;
                if indeg[v] == 0 {
                    ready.push_back(v);
                }
            }
        }
        placed += layer.len();
        phases.push(layer);
    }

    // Cycle: fall back to one fully sequential phase in emission order.
    if placed < n {
        debug!(total = n, placed, "cycle in effect graph; running batch sequentially");
        return Schedule {
            layers: vec![(0..n).collect()],
            sequential: true,
        };
    }
    Schedule {
        layers: phases,
        sequential: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolcall::annotate;
    use std::path::Path;

    fn batch(root: &str, calls: &[(&str, &str)]) -> Vec<ToolCall> {
        calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| {
                let mut call = ToolCall::new(format!("call_{i}"), *name, *args);
                annotate(Path::new(root), &mut call);
                call
            })
            .collect()
    }

    /// Every edge implied by the rules must put its endpoints in strictly
    /// increasing phases.
    fn phase_of(phases: &[Vec<usize>], index: usize) -> usize {
        phases
            .iter()
            .position(|layer| layer.contains(&index))
            .expect("index missing from schedule")
    }

    #[test]
    fn write_read_list_batch_splits_into_two_phases() {
        let calls = batch(
            "/ws",
            &[
                ("write_file", r#"{"path":"a/b.txt","content":"x"}"#),
                ("read_file", r#"{"path":"a/b.txt"}"#),
                ("list_dir", r#"{"dir":"a"}"#),
                ("read_file", r#"{"path":"c/d.go"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        assert!(!schedule.sequential);
        assert_eq!(schedule.layers.len(), 2);
        assert_eq!(
            {
                let mut first = schedule.layers[0].clone();
                first.sort_unstable();
                first
            },
            vec![0, 3]
        );
        assert_eq!(
            {
                let mut second = schedule.layers[1].clone();
                second.sort_unstable();
                second
            },
            vec![1, 2]
        );
    }

    #[test]
    fn successive_writes_serialize_in_emission_order() {
        let calls = batch(
            "/ws",
            &[
                ("write_file", r#"{"path":"f.txt","content":"1"}"#),
                ("write_file", r#"{"path":"f.txt","content":"2"}"#),
                ("write_file", r#"{"path":"f.txt","content":"3"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        assert!(phase_of(&schedule.layers, 0) < phase_of(&schedule.layers, 1));
        assert!(phase_of(&schedule.layers, 1) < phase_of(&schedule.layers, 2));
    }

    #[test]
    fn delete_runs_after_every_other_touch() {
        let calls = batch(
            "/ws",
            &[
                ("delete_path", r#"{"path":"f.txt"}"#),
                ("read_file", r#"{"path":"f.txt"}"#),
                ("write_file", r#"{"path":"f.txt","content":"x"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        assert!(phase_of(&schedule.layers, 1) < phase_of(&schedule.layers, 0));
        assert!(phase_of(&schedule.layers, 2) < phase_of(&schedule.layers, 0));
    }

    #[test]
    fn duplicate_deletes_fall_back_to_sequential() {
        let calls = batch(
            "/ws",
            &[
                ("delete_path", r#"{"path":"f.txt"}"#),
                ("delete_path", r#"{"path":"f.txt"}"#),
                ("read_file", r#"{"path":"other.txt"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        assert!(schedule.sequential);
        assert_eq!(schedule.layers, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn recursive_listing_is_never_ordered() {
        let calls = batch(
            "/ws",
            &[
                ("write_file", r#"{"path":"a/b.txt","content":"x"}"#),
                ("list_dir_recursive", r#"{"dir":"a"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        assert!(!schedule.sequential);
        assert_eq!(schedule.layers.len(), 1);
        assert_eq!(schedule.layers[0].len(), 2);
    }

    #[test]
    fn listing_waits_for_deletes_in_its_directory() {
        let calls = batch(
            "/ws",
            &[
                ("list_dir", r#"{"dir":"a"}"#),
                ("delete_path", r#"{"path":"a/b.txt"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        assert!(phase_of(&schedule.layers, 1) < phase_of(&schedule.layers, 0));
    }

    #[test]
    fn independent_calls_share_one_phase() {
        let calls = batch(
            "/ws",
            &[
                ("read_file", r#"{"path":"a.txt"}"#),
                ("read_file", r#"{"path":"b.txt"}"#),
                ("run_command", r#"{"cmd":"ls"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        assert!(!schedule.sequential);
        assert_eq!(schedule.layers.len(), 1);
        assert_eq!(schedule.layers[0].len(), 3);
    }

    #[test]
    fn empty_batch_yields_empty_schedule() {
        assert!(plan_phases(&[]).layers.is_empty());
    }

    #[test]
    fn every_index_appears_exactly_once() {
        let calls = batch(
            "/ws",
            &[
                ("write_file", r#"{"path":"a/x.txt","content":"1"}"#),
                ("write_file", r#"{"path":"a/x.txt","content":"2"}"#),
                ("read_file", r#"{"path":"a/x.txt"}"#),
                ("delete_path", r#"{"path":"a/x.txt"}"#),
                ("list_dir", r#"{"dir":"a"}"#),
                ("run_command", r#"{"cmd":"true"}"#),
            ],
        );
        let schedule = plan_phases(&calls);
        let mut seen: Vec<usize> = schedule.layers.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }
}
