//! `fsNode` / `FileInfo` (spec §3).
//!
//! Rather than `Rc`/`Weak` parent back-references — awkward for a type
//! that must be `Send` across the worker pool — nodes are allocated in
//! a single arena and referenced by index, per the design note in
//! spec §9 ("allocate fsNodes in an arena keyed by traversal id and use
//! indices rather than pointers").

use std::path::PathBuf;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::blob_store::Score;

/// Opaque node identity handed to the generic graph engines. Equality
/// and hashing are by arena index only — the engines never look inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Dir,
    Symlink,
    BlockDev,
    CharDev,
    Pipe,
}

/// Filesystem metadata captured for one entry (spec §3's `FileInfo`).
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub file_type: FileType,
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    pub name: String,
    pub mtime: SystemTime,
    pub inode: u64,
    pub size: u64,
    /// Symlink target, present only for `FileType::Symlink`.
    pub target: Option<PathBuf>,
    /// Device number, present only for block/char devices.
    pub device_number: Option<u64>,
    /// Absent until the node has been successfully visited; absent
    /// forever for symlinks, devices and pipes.
    pub scores: Option<Vec<Score>>,
}

/// The persistent score-cache key (spec §6): `(path, perms, uid, gid,
/// mtime, inode, size)`. Only defined for regular files whose mtime is
/// old enough (spec §4.5) — see [`super::chunking_visitor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreCacheKey {
    pub path: String,
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime_secs: i64,
    pub mtime_nanos: u32,
    pub inode: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct FsNodeData {
    /// Path relative to the backup base path; empty string at the root.
    pub rel_path: String,
    pub info: FileInfo,
    pub parent: Option<NodeId>,
    /// Populated by the resolver when it expands a directory.
    pub children: Vec<NodeId>,
    /// Set by the chunking visitor when this node is eligible for
    /// score-cache insertion; private to that visitor.
    pub score_cache_key: Option<ScoreCacheKey>,
}

/// Arena backing every `fsNode` allocated during one `Pipeline::save`
/// run. A node is owned by at most one visitor at any instant (the DAG
/// visitor's readiness protocol guarantees this — spec §5), so the
/// single mutex here is contended only for the resolver's directory
/// expansions, not for the chunking visitor's per-node work.
#[derive(Default)]
pub struct FsArena {
    nodes: Mutex<Vec<FsNodeData>>,
}

impl FsArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, data: FsNodeData) -> NodeId {
        let mut nodes = self.nodes.lock();
        let id = NodeId(nodes.len());
        nodes.push(data);
        id
    }

    pub fn with<R>(&self, id: NodeId, f: impl FnOnce(&FsNodeData) -> R) -> R {
        let nodes = self.nodes.lock();
        f(&nodes[id.0])
    }

    pub fn with_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut FsNodeData) -> R) -> R {
        let mut nodes = self.nodes.lock();
        f(&mut nodes[id.0])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.with(id, |d| d.parent)
    }

    pub fn rel_path(&self, id: NodeId) -> String {
        self.with(id, |d| d.rel_path.clone())
    }

    pub fn set_children(&self, id: NodeId, children: Vec<NodeId>) {
        self.with_mut(id, |d| d.children = children);
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
