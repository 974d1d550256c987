//! `DAGVisitor`: dependency-ordered parallel visitation (spec §4.3).
//!
//! Consumes a topologically pre-sorted node stream (predecessors before
//! successors) plus a [`SuccessorFinder`] that agrees with that order,
//! and invokes a [`Visitor`] on each node only once every direct
//! predecessor has itself been visited successfully.
//!
//! "Successor" here follows the same traversal-direction convention as
//! the explore engine (spec §9): for the filesystem pipeline, calling
//! the successor finder on a node yields its parent, the node that is
//! waiting on it.

use std::collections::HashMap;

use anyhow::Result;
use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex};

use super::{Node, SuccessorFinder};
use crate::context::Context;

/// A function invoked once per node by the DAG visitor, after all of
/// that node's direct predecessors have completed successfully.
pub trait Visitor<N>: Sync {
    fn visit(&self, ctx: &Context, node: &N) -> Result<()>;
}

impl<N, F> Visitor<N> for F
where
    F: Fn(&Context, &N) -> Result<()> + Sync,
{
    fn visit(&self, ctx: &Context, node: &N) -> Result<()> {
        self(ctx, node)
    }
}

/// Per-node bookkeeping. Kept for the lifetime of the run even after
/// the node becomes ready, so that a later, wrongly-ordered reference
/// to an already-seen node is still detectable (spec §5's invariant
/// check: "a node simultaneously ready and not-ready" / topological
/// violations must be caught, not silently re-admitted).
#[derive(Default)]
struct NodeRecord {
    predecessors_outstanding: i64,
    seen: bool,
}

struct State<N> {
    records: HashMap<N, NodeRecord>,
    ready: Vec<N>,
    // Direct successors of every node the driver has read from the
    // input stream, needed by a worker once it finishes visiting a
    // node so it knows whose predecessor count to decrement.
    successors_of: HashMap<N, Vec<N>>,
    first_err: Option<anyhow::Error>,
    busy_workers: usize,
}

impl<N: Node> State<N> {
    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for record in self.records.values() {
            debug_assert!(
                record.predecessors_outstanding >= 0,
                "predecessorsOutstanding went negative"
            );
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}
}

/// Drive `visitor` over every node on `input`, honoring the dependency
/// order defined by `successor_finder`.
pub fn dag_visit<N, SF, V>(
    ctx: &Context,
    input: Receiver<N>,
    successor_finder: &SF,
    visitor: &V,
    parallelism: usize,
) -> Result<()>
where
    N: Node,
    SF: SuccessorFinder<N>,
    V: Visitor<N>,
{
    assert!(parallelism >= 1, "parallelism must be at least 1");

    let state = Mutex::new(State {
        records: HashMap::new(),
        ready: Vec::new(),
        successors_of: HashMap::new(),
        first_err: None,
        // The driver counts as busy from the start: while it is still
        // reading the input stream, more nodes may yet become ready.
        busy_workers: 1,
    });
    let cv = Condvar::new();

    log::debug!("dag_visit: dispatching driver + {} workers", parallelism);
    std::thread::scope(|scope| {
        scope.spawn(|| driver(ctx, &input, successor_finder, &state, &cv));
        for _ in 0..parallelism {
            scope.spawn(|| worker(ctx, visitor, &state, &cv));
        }
    });
    log::debug!("dag_visit: driver and all workers terminated");

    let mut guard = state.lock();
    match guard.first_err.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn driver<N, SF>(
    ctx: &Context,
    input: &Receiver<N>,
    successor_finder: &SF,
    state: &Mutex<State<N>>,
    cv: &Condvar,
) where
    N: Node,
    SF: SuccessorFinder<N>,
{
    loop {
        let node = crossbeam_channel::select! {
            recv(input) -> msg => msg,
            recv(ctx.done()) -> _ => {
                record_first_error(ctx, state, cv, crate::error::EngineError::Cancelled.into());
                break;
            }
        };

        let node = match node {
            Ok(node) => node,
            Err(_) => break, // input stream closed
        };

        {
            let guard = state.lock();
            if guard.first_err.is_some() {
                drop(guard);
                break;
            }
        }

        let successors = match successor_finder.successors(ctx, &node) {
            Ok(successors) => successors,
            Err(err) => {
                record_first_error(ctx, state, cv, err);
                break;
            }
        };

        let mut guard = state.lock();

        guard
            .successors_of
            .insert(node.clone(), successors.clone());

        for successor in &successors {
            let entry = guard.records.entry(successor.clone()).or_default();
            assert!(
                !entry.seen,
                "DAGVisitor input stream is not topologically sorted: \
                 a node was marked as a predecessor after its successor was already seen"
            );
            entry.predecessors_outstanding += 1;
        }

        let entry = guard.records.entry(node.clone()).or_default();
        assert!(!entry.seen, "DAGVisitor saw the same node twice on its input stream");
        entry.seen = true;

        if entry.predecessors_outstanding == 0 {
            guard.ready.push(node);
        }

        guard.check_invariants();
        cv.notify_all();
    }

    let mut guard = state.lock();
    guard.busy_workers -= 1;
    cv.notify_all();
}

fn worker<N, V>(ctx: &Context, visitor: &V, state: &Mutex<State<N>>, cv: &Condvar)
where
    N: Node,
    V: Visitor<N>,
{
    loop {
        let node = {
            let mut guard = state.lock();
            let node = loop {
                if guard.first_err.is_some() {
                    return;
                }
                if let Some(node) = guard.ready.pop() {
                    break node;
                }
                if guard.busy_workers == 0 {
                    return;
                }
                cv.wait(&mut guard);
            };
            node
        };

        match visitor.visit(ctx, &node) {
            Ok(()) => {
                let mut guard = state.lock();
                let successors = guard
                    .successors_of
                    .get(&node)
                    .cloned()
                    .unwrap_or_default();
                for successor in successors {
                    match guard.records.get_mut(&successor) {
                        Some(entry) => {
                            entry.predecessors_outstanding -= 1;
                            if entry.predecessors_outstanding == 0 && entry.seen {
                                guard.ready.push(successor);
                            }
                        }
                        None => panic!(
                            "DAGVisitor invariant violated: successor record missing \
                             when its predecessor finished visiting"
                        ),
                    }
                }
                guard.check_invariants();
                cv.notify_all();
            }
            Err(err) => {
                record_first_error(ctx, state, cv, err);
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
        log::warn!("dag_visit: recording first error: {:#}", err);
        guard.first_err = Some(err);
    }
    drop(guard);
    ctx.cancel();
    cv.notify_all();
}
