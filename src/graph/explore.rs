//! `ExploreEngine`: parallel multi-root reachability (spec §4.1).
//!
//! Given a set of roots and a [`SuccessorFinder`], writes every node
//! reachable from any root to a sink exactly once, expanding up to
//! `parallelism` nodes concurrently, and returns the first error
//! observed by any worker (never an arbitrary join error — see the
//! design note in spec §9 on why wait-group-of-errors is wrong here).

use std::collections::HashSet;

use anyhow::Result;
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};

use super::{send_abortable, Node, SuccessorFinder};
use crate::context::Context;

struct State<N> {
    admitted: HashSet<N>,
    to_visit: Vec<N>,
    first_err: Option<anyhow::Error>,
    busy_workers: usize,
}

impl<N: Node> State<N> {
    /// Debug invariant check (spec §5), run on every transition in
    /// debug builds; a no-op in release builds.
    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for n in &self.to_visit {
            debug_assert!(
                self.admitted.contains(n),
                "node in to_visit missing from admitted"
            );
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}
}

/// Explore every node reachable from `roots` via `successor_finder`,
/// writing each one to `sink` exactly once.
///
/// `parallelism` is the maximum number of concurrent
/// `successor_finder` invocations; it must be at least 1.
pub fn explore<N, SF>(
    ctx: &Context,
    roots: impl IntoIterator<Item = N>,
    successor_finder: &SF,
    sink: Sender<N>,
    parallelism: usize,
) -> Result<()>
where
    N: Node,
    SF: SuccessorFinder<N>,
{
    assert!(parallelism >= 1, "parallelism must be at least 1");

    let mut admitted = HashSet::new();
    let mut to_visit = Vec::new();
    for root in roots {
        if admitted.insert(root.clone()) {
            to_visit.push(root);
        }
    }

    let state = Mutex::new(State {
        admitted,
        to_visit,
        first_err: None,
        busy_workers: 0,
    });
    let cv = Condvar::new();

    log::debug!("explore: dispatching {} workers", parallelism);
    std::thread::scope(|scope| {
        for _ in 0..parallelism {
            scope.spawn(|| worker(ctx, successor_finder, &sink, &state, &cv));
        }
    });
    log::debug!("explore: all workers terminated");

    let mut guard = state.lock();
    match guard.first_err.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn worker<N, SF>(
    ctx: &Context,
    successor_finder: &SF,
    sink: &Sender<N>,
    state: &Mutex<State<N>>,
    cv: &Condvar,
) where
    N: Node,
    SF: SuccessorFinder<N>,
{
    loop {
        let node = {
            let mut guard = state.lock();
            let node = loop {
                if guard.first_err.is_some() {
                    return;
                }
                if let Some(node) = guard.to_visit.pop() {
                    guard.busy_workers += 1;
                    break node;
                }
                if guard.busy_workers == 0 {
                    return;
                }
                cv.wait(&mut guard);
            };
            guard.check_invariants();
            node
        };

        if let Err(err) = send_abortable(ctx, sink, node.clone()) {
            record_first_error(ctx, state, cv, err);
            mark_idle(state, cv);
            continue;
        }

        match successor_finder.successors(ctx, &node) {
            Ok(successors) => {
                let mut guard = state.lock();
                for s in successors {
                    if guard.admitted.insert(s.clone()) {
                        guard.to_visit.push(s);
                    }
                }
                guard.busy_workers -= 1;
                guard.check_invariants();
                cv.notify_all();
            }
            Err(err) => {
                record_first_error(ctx, state, cv, err);
                mark_idle(state, cv);
            }
        }
    }
}

fn record_first_error<N: Node>(
    ctx: &Context,
    state: &Mutex<State<N>>,
    cv: &Condvar,
    err: anyhow::Error,
) {
    let mut guard = state.lock();
    if guard.first_err.is_none() {
        log::warn!("explore: recording first error: {:#}", err);
        guard.first_err = Some(err);
    }
    drop(guard);
    // Wake any successor finder that is itself blocked on ctx.done(),
    // so it can unwind instead of running to completion uselessly.
    ctx.cancel();
    cv.notify_all();
}

fn mark_idle<N: Node>(state: &Mutex<State<N>>, cv: &Condvar) {
    let mut guard = state.lock();
    guard.busy_workers -= 1;
    cv.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn edges_finder(edges: HashMap<char, Vec<char>>) -> impl SuccessorFinder<char> {
        move |_ctx: &Context, node: &char| -> Result<Vec<char>> {
            Ok(edges.get(node).cloned().unwrap_or_default())
        }
    }

    fn collect(rx: crossbeam_channel::Receiver<char>) -> Vec<char> {
        rx.into_iter().collect()
    }

    #[test]
    fn empty_roots_produce_empty_output() {
        let ctx = Context::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let sf = edges_finder(HashMap::new());
        explore(&ctx, Vec::<char>::new(), &sf, tx, 4).unwrap();
        assert!(collect(rx).is_empty());
    }

    #[test]
    fn disconnected_roots_all_emitted_once() {
        let ctx = Context::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let sf = edges_finder(HashMap::new());
        explore(&ctx, ['A', 'B', 'C', 'D'], &sf, tx, 3).unwrap();
        let mut out = collect(rx);
        out.sort_unstable();
        assert_eq!(out, vec!['A', 'B', 'C', 'D']);
    }

    #[test]
    fn diamond_dag_every_node_once() {
        let ctx = Context::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut edges = HashMap::new();
        edges.insert('A', vec!['B', 'C']);
        edges.insert('B', vec!['D']);
        edges.insert('C', vec!['D', 'E']);
        edges.insert('D', vec!['E']);
        let sf = edges_finder(edges);
        explore(&ctx, ['A'], &sf, tx, 4).unwrap();
        let mut out = collect(rx);
        out.sort_unstable();
        assert_eq!(out, vec!['A', 'B', 'C', 'D', 'E']);
    }

    #[test]
    fn cycle_tolerated_no_repeats() {
        let ctx = Context::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut edges = HashMap::new();
        edges.insert('A', vec!['B', 'C']);
        edges.insert('B', vec!['D']);
        edges.insert('C', vec!['D']);
        edges.insert('D', vec!['A']);
        let sf = edges_finder(edges);
        explore(&ctx, ['A'], &sf, tx, 4).unwrap();
        let mut out = collect(rx);
        out.sort_unstable();
        assert_eq!(out, vec!['A', 'B', 'C', 'D']);
    }

    #[test]
    fn first_error_cancels_other_workers() {
        let ctx = Context::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let b_saw_cancel = std::sync::Arc::new(AtomicUsize::new(0));
        let b_saw_cancel2 = b_saw_cancel.clone();

        let ctx_for_finder = ctx.clone();
        let sf = move |_ctx: &Context, node: &char| -> Result<Vec<char>> {
            match node {
                'A' => Ok(vec!['B', 'C']),
                'B' => {
                    // Block until cancellation is observed, then report it.
                    while !ctx_for_finder.is_cancelled() {
                        std::thread::yield_now();
                    }
                    b_saw_cancel2.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("cancelled"))
                }
                'C' => Err(anyhow::anyhow!("boom")),
                _ => Ok(vec![]),
            }
        };

        let result = explore(&ctx, ['A'], &sf, tx, 2);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(b_saw_cancel.load(Ordering::SeqCst), 1);
        drop(rx);
    }
}
