//! Generic parallel graph exploration primitives (spec §4.1–§4.3).
//!
//! These types never interpret node structure — they only hash and
//! compare `N` — so the same engine drives both the toy `char` graphs
//! exercised in the test suite and the filesystem-backed `fsNode`
//! pipeline in [`crate::backup`].

mod dag_visitor;
mod explore;
mod topsort;

pub use dag_visitor::{dag_visit, Visitor};
pub use explore::explore;
pub use topsort::reverse_topsort;

use crate::context::Context;
use anyhow::Result;
use crossbeam_channel::Sender;

/// Bound every node type the graph engines operate on.
///
/// Node identity is opaque to the engines: two nodes are the same iff
/// they compare equal. Blanket-implemented for anything satisfying the
/// bounds, the way the engines' generic parameters are written in the
/// spec.
pub trait Node: Clone + Eq + std::hash::Hash + Send + Sync + 'static {}
impl<T: Clone + Eq + std::hash::Hash + Send + Sync + 'static> Node for T {}

/// A function from a node to its direct successors.
///
/// "Successor" follows the traversal-direction convention used by the
/// explore engine (spec §9): for the filesystem pipeline, a
/// directory's successors are its children.
pub trait SuccessorFinder<N>: Sync {
    fn successors(&self, ctx: &Context, node: &N) -> Result<Vec<N>>;
}

impl<N, F> SuccessorFinder<N> for F
where
    F: Fn(&Context, &N) -> Result<Vec<N>> + Sync,
{
    fn successors(&self, ctx: &Context, node: &N) -> Result<Vec<N>> {
        self(ctx, node)
    }
}

/// Send `node` on `sink`, aborting if `ctx` is cancelled first.
///
/// Shared by the explore engine, the DAG visitor and the chunking
/// visitor — every "forward a node downstream" suspension point named
/// in spec §5 goes through here.
pub(crate) fn send_abortable<N>(ctx: &Context, sink: &Sender<N>, node: N) -> Result<()> {
    crossbeam_channel::select! {
        send(sink, node) -> res => res.map_err(|_| anyhow::Error::new(crate::error::EngineError::Cancelled)),
        recv(ctx.done()) -> _ => Err(crate::error::EngineError::Cancelled.into()),
    }
}
