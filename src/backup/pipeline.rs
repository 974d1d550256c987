//! `Pipeline::save` (spec §4.7): wires the three generic graph engines
//! into the concrete backup flow — build the tree, pre-sort it, visit
//! it in dependency order, extract the root's score.
//!
//! The `ReverseTopsortWalker`'s own root list is the single backup
//! root (spec §4.7's "input = [rootNode]"); what actually reaches the
//! DAG visitor is that walker's full pre-sorted output stream, as
//! spec §9 notes.

use std::path::Path;

use anyhow::Result;
use regex::Regex;

use super::blob_store::{BlobStore, Score};
use super::chunking_visitor::{ChunkingVisitor, ChunkingVisitorConfig};
use super::clock::Clock;
use super::fs_node::{FileInfo, FileType, FsArena, FsNodeData, NodeId};
use super::resolver::{stat_to_file_info, DependencyResolver};
use super::score_cache::ScoreCache;
use crate::context::Context;
use crate::error::EngineError;
use crate::graph::{dag_visit, reverse_topsort};

/// Default concurrency for the DAG-visitor stage; the tree-build stage
/// (`reverse_topsort`) is inherently single-threaded (spec §4.2).
pub const DEFAULT_PARALLELISM: usize = 128;

pub struct Pipeline<'a> {
    pub base_path: &'a Path,
    pub exclusions: Vec<Regex>,
    pub blob_store: &'a dyn BlobStore,
    pub score_cache: &'a ScoreCache,
    pub clock: &'a dyn Clock,
    pub chunking: ChunkingVisitorConfig,
    pub parallelism: usize,
}

impl<'a> Pipeline<'a> {
    pub fn save(&self, ctx: &Context) -> Result<Score> {
        log::info!("pipeline: starting save of {:?}", self.base_path);
        let result = self.save_inner(ctx);
        match &result {
            Ok(score) => log::info!("pipeline: save of {:?} produced root {}", self.base_path, score),
            Err(err) => log::warn!("pipeline: save of {:?} failed: {:#}", self.base_path, err),
        }
        result
    }

    fn save_inner(&self, ctx: &Context) -> Result<Score> {
        let arena = FsArena::new();

        let root_stat = stat_to_file_info(self.base_path, "")?;
        let root_id = arena.insert(FsNodeData {
            rel_path: String::new(),
            info: FileInfo { file_type: FileType::Dir, ..root_stat },
            parent: None,
            children: Vec::new(),
            score_cache_key: None,
        });

        let resolver = DependencyResolver::new(&arena, self.base_path, &self.exclusions);
        let (topsort_tx, topsort_rx) = crossbeam_channel::unbounded();
        let (output_tx, output_rx) = crossbeam_channel::unbounded();

        let chunking_config = ChunkingVisitorConfig {
            chunk_size: self.chunking.chunk_size,
            score_cache_grace: self.chunking.score_cache_grace,
        };
        let visitor = ChunkingVisitor::new(
            &arena,
            self.base_path,
            self.blob_store,
            self.score_cache,
            self.clock,
            chunking_config,
            output_tx,
        );

        std::thread::scope(|scope| -> Result<()> {
            let children_finder = |c: &Context, n: &NodeId| resolver.children(c, n);
            let walker = scope.spawn(move || reverse_topsort(ctx, root_id, &children_finder, &topsort_tx));

            let dependents_finder = |c: &Context, n: &NodeId| resolver.dag_dependents(c, n);
            let visit_result = dag_visit(ctx, topsort_rx, &dependents_finder, &visitor, self.parallelism);

            let walk_result = walker.join().expect("tree-build thread panicked");
            walk_result?;
            visit_result?;
            Ok(())
        })?;

        let visited: Vec<NodeId> = output_rx.try_iter().collect();
        let roots: Vec<NodeId> = visited
            .into_iter()
            .filter(|id| arena.parent(*id).is_none())
            .collect();

        match roots.len() {
            0 => Err(EngineError::NoRoot.into()),
            1 => {
                let scores = arena.with(roots[0], |d| d.info.scores.clone());
                match scores {
                    Some(scores) if scores.len() == 1 => Ok(scores[0]),
                    Some(scores) => Err(EngineError::WrongRootArity(scores.len()).into()),
                    None => Err(EngineError::WrongRootArity(0).into()),
                }
            }
            n => Err(EngineError::MultipleRoots(n).into()),
        }
    }
}
