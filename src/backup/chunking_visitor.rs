//! `ChunkingVisitor` (spec §4.5): the [`crate::graph::Visitor`] the
//! backup pipeline feeds to the DAG visitor. Regular files are chunked
//! and their chunk scores stored; directories are serialized into a
//! listing blob referencing their already-visited children's scores;
//! symlinks, devices and pipes get no blob at all.

use std::io::BufReader;
use std::time::Duration;

use anyhow::{Context as _, Result};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use super::blob_store::{frame_dir_listing, frame_file_chunk, BlobStore, Score};
use super::chunker::FixedChunker;
use super::clock::Clock;
use super::fs_node::{FileType, FsArena, FsNodeData, NodeId, ScoreCacheKey};
use super::score_cache::ScoreCache;
use crate::context::Context;
use crate::graph::{send_abortable, Visitor};

/// Default chunk size (spec §4.5): 16 MiB, matching the teacher's own
/// `proxmox_backup::backup::data_blob::DEFAULT_CHUNK_SIZE` order of
/// magnitude for file-content chunks.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// A file only becomes score-cache eligible once its mtime is at least
/// this far in the past, so a file still being written during the scan
/// is never cached against a score it hasn't finished producing yet.
pub const DEFAULT_SCORE_CACHE_GRACE: Duration = Duration::from_secs(5 * 60);

pub struct ChunkingVisitorConfig {
    pub chunk_size: usize,
    pub score_cache_grace: Duration,
}

impl Default for ChunkingVisitorConfig {
    fn default() -> Self {
        ChunkingVisitorConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            score_cache_grace: DEFAULT_SCORE_CACHE_GRACE,
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
struct DirEntry {
    file_type: FileType,
    permissions: u32,
    uid: u32,
    user_name: Option<String>,
    gid: u32,
    group_name: Option<String>,
    name: String,
    mtime_secs: i64,
    mtime_nanos: u32,
    size: u64,
    inode: u64,
    symlink_target: Option<String>,
    device_number: Option<u64>,
    scores: Vec<Score>,
    /// Retained only so a listing written by an older format can still
    /// be decoded; this crate never populates it.
    #[serde(default)]
    hard_link_target: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct DirListing {
    entries: Vec<DirEntry>,
}

pub struct ChunkingVisitor<'a> {
    arena: &'a FsArena,
    base_path: &'a std::path::Path,
    blob_store: &'a dyn BlobStore,
    score_cache: &'a ScoreCache,
    clock: &'a dyn Clock,
    config: ChunkingVisitorConfig,
    output: Sender<NodeId>,
}

impl<'a> ChunkingVisitor<'a> {
    pub fn new(
        arena: &'a FsArena,
        base_path: &'a std::path::Path,
        blob_store: &'a dyn BlobStore,
        score_cache: &'a ScoreCache,
        clock: &'a dyn Clock,
        config: ChunkingVisitorConfig,
        output: Sender<NodeId>,
    ) -> Self {
        ChunkingVisitor { arena, base_path, blob_store, score_cache, clock, config, output }
    }

    fn cache_key_for(&self, data: &FsNodeData) -> Option<ScoreCacheKey> {
        if data.info.file_type != FileType::File {
            return None;
        }
        let age = self.clock.now().duration_since(data.info.mtime).ok()?;
        if age < self.config.score_cache_grace {
            return None;
        }
        let since_epoch = data.info.mtime.duration_since(std::time::UNIX_EPOCH).ok()?;
        Some(ScoreCacheKey {
            path: data.rel_path.clone(),
            permissions: data.info.permissions,
            uid: data.info.uid,
            gid: data.info.gid,
            mtime_secs: since_epoch.as_secs() as i64,
            mtime_nanos: since_epoch.subsec_nanos(),
            inode: data.info.inode,
            size: data.info.size,
        })
    }

    fn visit_file(&self, ctx: &Context, node: NodeId) -> Result<()> {
        let (rel_path, key) = self.arena.with(node, |d| (d.rel_path.clone(), self.cache_key_for(d)));

        if let Some(key) = &key {
            if let Some(cached) = self.score_cache.get(key) {
                log::debug!("score cache hit for {}", rel_path);
                self.arena.with_mut(node, |d| {
                    d.info.scores = Some(cached);
                    d.score_cache_key = Some(key.clone());
                });
                return Ok(());
            }
        }

        let full_path = self.base_path.join(&rel_path);
        let file = std::fs::File::open(&full_path)
            .with_context(|| format!("failed to open {:?}", full_path))?;
        let mut chunker = FixedChunker::new(BufReader::new(file), self.config.chunk_size);

        let mut scores = Vec::new();
        while let Some(chunk) = chunker
            .next_chunk()
            .with_context(|| format!("failed to read {:?}", full_path))?
        {
            let framed = frame_file_chunk(&chunk);
            let score = self.blob_store.save(ctx, &framed)?;
            scores.push(score);
        }

        log::info!("chunked {} into {} chunk(s)", rel_path, scores.len());

        self.arena.with_mut(node, |d| d.info.scores = Some(scores.clone()));
        if let Some(key) = key {
            self.score_cache.set(key.clone(), scores);
            self.arena.with_mut(node, |d| d.score_cache_key = Some(key));
        }
        Ok(())
    }

    fn visit_dir(&self, ctx: &Context, node: NodeId) -> Result<()> {
        let children = self.arena.with(node, |d| d.children.clone());
        let entries = children
            .into_iter()
            .map(|child| self.arena.with(child, to_dir_entry))
            .collect();
        let listing = DirListing { entries };

        let payload = bincode::serialize(&listing).context("failed to encode directory listing")?;
        let framed = frame_dir_listing(&payload);
        let score = self.blob_store.save(ctx, &framed)?;

        self.arena.with_mut(node, |d| d.info.scores = Some(vec![score]));
        Ok(())
    }
}

fn to_dir_entry(data: &FsNodeData) -> DirEntry {
    let since_epoch = data
        .info
        .mtime
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    DirEntry {
        file_type: data.info.file_type,
        permissions: data.info.permissions,
        uid: data.info.uid,
        user_name: data.info.user_name.clone(),
        gid: data.info.gid,
        group_name: data.info.group_name.clone(),
        name: data.info.name.clone(),
        mtime_secs: since_epoch.as_secs() as i64,
        mtime_nanos: since_epoch.subsec_nanos(),
        size: data.info.size,
        inode: data.info.inode,
        symlink_target: data
            .info
            .target
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        device_number: data.info.device_number,
        scores: data.info.scores.clone().unwrap_or_default(),
        hard_link_target: None,
    }
}

impl<'a> Visitor<NodeId> for ChunkingVisitor<'a> {
    fn visit(&self, ctx: &Context, node: &NodeId) -> Result<()> {
        let node = *node;
        let already_visited = self.arena.with(node, |d| d.info.scores.is_some());
        if !already_visited {
            let file_type = self.arena.with(node, |d| d.info.file_type);
            match file_type {
                FileType::File => self.visit_file(ctx, node)?,
                FileType::Dir => self.visit_dir(ctx, node)?,
                FileType::Symlink | FileType::BlockDev | FileType::CharDev | FileType::Pipe => {
                    // No blob for these types; Info.scores stays absent.
                }
            }
        }
        send_abortable(ctx, &self.output, node)
    }
}
