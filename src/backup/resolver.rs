//! `DependencyResolver` (spec §4.4): turns a directory tree on disk
//! into `fsNode`s, one allocation per directory entry, and exposes two
//! distinct successor-finder views over the same tree:
//!
//! - [`DependencyResolver::children`] — a node's children, used to feed
//!   the reverse-topsort walker that builds the pre-sorted node stream.
//! - [`DependencyResolver::dag_dependents`] — the node waiting on a
//!   node (its parent, if any), used by the DAG visitor to decide when
//!   a node's predecessors are satisfied. "Successor" in the DAG
//!   visitor's sense is the reverse of "successor" in the tree-walk
//!   sense (spec §9) — the resolver is the one place that has to speak
//!   both dialects.

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context as _, Result};
use regex::Regex;

use super::fs_node::{FileInfo, FileType, FsArena, FsNodeData, NodeId};
use crate::context::Context;

pub struct DependencyResolver<'a> {
    arena: &'a FsArena,
    base_path: &'a Path,
    exclusions: &'a [Regex],
}

impl<'a> DependencyResolver<'a> {
    pub fn new(arena: &'a FsArena, base_path: &'a Path, exclusions: &'a [Regex]) -> Self {
        DependencyResolver { arena, base_path, exclusions }
    }

    /// Successor finder for the tree-building walk: `node`'s children.
    /// Non-directories have none. Allocates the child `fsNode`s and
    /// records them as `node`'s children as a side effect, matching
    /// the teacher's pattern of discovering and recording directory
    /// contents in the same pass (`src/pxar/create.rs::add_entry`).
    pub fn children(&self, _ctx: &Context, node: &NodeId) -> Result<Vec<NodeId>> {
        let (file_type, rel_path) = self.arena.with(*node, |d| (d.info.file_type, d.rel_path.clone()));
        if file_type != FileType::Dir {
            return Ok(Vec::new());
        }

        let full_path = self.full_path(&rel_path);
        let mut names: Vec<OsString> = std::fs::read_dir(&full_path)
            .with_context(|| format!("failed to read directory {:?}", full_path))?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::io::Result<Vec<OsString>>>()
            .with_context(|| format!("failed to enumerate directory {:?}", full_path))?;

        // Byte-lexicographic order: stable and locale-independent,
        // unlike relying on the OS's own readdir order.
        names.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

        let mut children = Vec::with_capacity(names.len());
        for name in names {
            let name_str = name.to_string_lossy().into_owned();
            let child_rel = if rel_path.is_empty() {
                name_str.clone()
            } else {
                format!("{}/{}", rel_path, name_str)
            };

            if self.exclusions.iter().any(|re| re.is_match(&child_rel)) {
                continue;
            }

            let child_path = full_path.join(&name);
            let info = stat_to_file_info(&child_path, &name_str)?;
            let child_id = self.arena.insert(FsNodeData {
                rel_path: child_rel,
                info,
                parent: Some(*node),
                children: Vec::new(),
                score_cache_key: None,
            });
            children.push(child_id);
        }

        self.arena.set_children(*node, children.clone());
        Ok(children)
    }

    /// Successor finder for the DAG visitor: the node waiting on
    /// `node` is its parent, if it has one.
    pub fn dag_dependents(&self, _ctx: &Context, node: &NodeId) -> Result<Vec<NodeId>> {
        Ok(self.arena.parent(*node).into_iter().collect())
    }

    fn full_path(&self, rel_path: &str) -> PathBuf {
        if rel_path.is_empty() {
            self.base_path.to_path_buf()
        } else {
            self.base_path.join(rel_path)
        }
    }
}

/// `lstat` one path and translate it into a [`FileInfo`]. Used both for
/// directory entries and for the backup root itself.
pub fn stat_to_file_info(path: &Path, name: &str) -> Result<FileInfo> {
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("failed to stat {:?}", path))?;
    let file_type = classify(&meta)?;

    let target = if file_type == FileType::Symlink {
        Some(
            std::fs::read_link(path)
                .with_context(|| format!("failed to read symlink target of {:?}", path))?,
        )
    } else {
        None
    };

    let uid = meta.uid();
    let gid = meta.gid();

    Ok(FileInfo {
        file_type,
        permissions: meta.mode(),
        uid,
        gid,
        // Best-effort: a uid/gid with no passwd/group entry just means
        // the directory listing carries numeric ids only, same as the
        // teacher's own `backup_user()`/`backup_group()` lookups.
        user_name: nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
            .ok()
            .flatten()
            .map(|u| u.name),
        group_name: nix::unistd::Group::from_gid(nix::unistd::Gid::from_raw(gid))
            .ok()
            .flatten()
            .map(|g| g.name),
        name: name.to_string(),
        mtime: meta.modified().unwrap_or(UNIX_EPOCH),
        inode: meta.ino(),
        size: meta.len(),
        target,
        device_number: match file_type {
            FileType::BlockDev | FileType::CharDev => Some(meta.rdev()),
            _ => None,
        },
        scores: None,
    })
}

fn classify(meta: &std::fs::Metadata) -> Result<FileType> {
    let ft = meta.file_type();
    if ft.is_dir() {
        Ok(FileType::Dir)
    } else if ft.is_symlink() {
        Ok(FileType::Symlink)
    } else if ft.is_file() {
        Ok(FileType::File)
    } else if ft.is_block_device() {
        Ok(FileType::BlockDev)
    } else if ft.is_char_device() {
        Ok(FileType::CharDev)
    } else if ft.is_fifo() {
        Ok(FileType::Pipe)
    } else {
        anyhow::bail!("unsupported file type (e.g. socket) at {:?}", meta.file_type());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::fs_node::FsArena;

    fn root_node(arena: &FsArena, base: &Path) -> NodeId {
        let info = stat_to_file_info(base, "").unwrap();
        arena.insert(FsNodeData {
            rel_path: String::new(),
            info: FileInfo { file_type: FileType::Dir, ..info },
            parent: None,
            children: Vec::new(),
            score_cache_key: None,
        })
    }

    #[test]
    fn children_are_sorted_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("skip.tmp"), b"x").unwrap();

        let arena = FsArena::new();
        let root = root_node(&arena, dir.path());
        let exclusions = vec![Regex::new(r"\.tmp$").unwrap()];
        let resolver = DependencyResolver::new(&arena, dir.path(), &exclusions);
        let ctx = Context::new();

        let children = resolver.children(&ctx, &root).unwrap();
        let names: Vec<String> = children.iter().map(|id| arena.rel_path(*id)).collect();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn non_directory_has_no_children() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("f.txt");
        std::fs::write(&file_path, b"hi").unwrap();

        let arena = FsArena::new();
        let info = stat_to_file_info(&file_path, "f.txt").unwrap();
        let node = arena.insert(FsNodeData {
            rel_path: "f.txt".into(),
            info,
            parent: None,
            children: Vec::new(),
            score_cache_key: None,
        });
        let resolver = DependencyResolver::new(&arena, dir.path(), &[]);
        let ctx = Context::new();
        assert!(resolver.children(&ctx, &node).unwrap().is_empty());
    }

    #[test]
    fn dag_dependents_is_parent_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let arena = FsArena::new();
        let root = root_node(&arena, dir.path());
        let resolver = DependencyResolver::new(&arena, dir.path(), &[]);
        let ctx = Context::new();
        assert!(resolver.dag_dependents(&ctx, &root).unwrap().is_empty());

        let child = arena.insert(FsNodeData {
            rel_path: "child".into(),
            info: stat_to_file_info(dir.path(), "child").unwrap(),
            parent: Some(root),
            children: Vec::new(),
            score_cache_key: None,
        });
        assert_eq!(resolver.dag_dependents(&ctx, &child).unwrap(), vec![root]);
    }
}
