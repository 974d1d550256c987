//! `ReverseTopsortWalker`: single-threaded post-order enumeration
//! (spec §4.2), used only to build the pre-sorted node stream the DAG
//! visitor requires (spec §9 design note: treat §4.3 as authoritative,
//! this primitive only feeds it).

use anyhow::Result;
use crossbeam_channel::Sender;

use super::{send_abortable, Node, SuccessorFinder};
use crate::context::Context;

/// Walk the tree rooted at `root`, calling `successor_finder` exactly
/// once per node encountered, and write each node to `sink` strictly
/// after all of its direct successors have been written.
pub fn reverse_topsort<N, SF>(
    ctx: &Context,
    root: N,
    successor_finder: &SF,
    sink: &Sender<N>,
) -> Result<()>
where
    N: Node,
    SF: SuccessorFinder<N>,
{
    if ctx.is_cancelled() {
        return Err(crate::error::EngineError::Cancelled.into());
    }

    let successors = successor_finder.successors(ctx, &root)?;
    for successor in successors {
        reverse_topsort(ctx, successor, successor_finder, sink)?;
    }

    send_abortable(ctx, sink, root)
}
