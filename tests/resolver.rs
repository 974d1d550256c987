//! `DependencyResolver` ordering and filtering (spec §8: "emits children
//! in strictly ascending byte-lexicographic name order; exclusion
//! regexes are applied ... on the full relative path").

use regex::Regex;

use snapvault::backup::fs_node::{FileInfo, FileType, FsArena, FsNodeData};
use snapvault::backup::resolver::DependencyResolver;
use snapvault::context::Context;

fn root_node(arena: &FsArena, base: &std::path::Path) -> snapvault::backup::NodeId {
    let meta = std::fs::symlink_metadata(base).unwrap();
    use std::os::unix::fs::MetadataExt;
    arena.insert(FsNodeData {
        rel_path: String::new(),
        info: FileInfo {
            file_type: FileType::Dir,
            permissions: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            user_name: None,
            group_name: None,
            name: String::new(),
            mtime: meta.modified().unwrap(),
            inode: meta.ino(),
            size: meta.len(),
            target: None,
            device_number: None,
            scores: None,
        },
        parent: None,
        children: Vec::new(),
        score_cache_key: None,
    })
}

#[test]
fn children_sorted_byte_lexicographically_with_exclusions_applied() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["zebra.txt", "Apple.txt", "apple.txt", "build.tmp"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }

    let arena = FsArena::new();
    let root = root_node(&arena, dir.path());
    let exclusions = vec![Regex::new(r"\.tmp$").unwrap()];
    let resolver = DependencyResolver::new(&arena, dir.path(), &exclusions);
    let ctx = Context::new();

    let children = resolver.children(&ctx, &root).unwrap();
    let names: Vec<String> = children.iter().map(|id| arena.rel_path(*id)).collect();

    // 'A' (0x41) sorts before 'a' (0x61) and 'z' (0x7a) in byte order;
    // build.tmp is excluded entirely.
    assert_eq!(names, vec!["Apple.txt", "apple.txt", "zebra.txt"]);
}

#[test]
fn nested_paths_are_joined_with_forward_slash() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/leaf.txt"), b"x").unwrap();

    let arena = FsArena::new();
    let root = root_node(&arena, dir.path());
    let resolver = DependencyResolver::new(&arena, dir.path(), &[]);
    let ctx = Context::new();

    let top_children = resolver.children(&ctx, &root).unwrap();
    assert_eq!(top_children.len(), 1);
    let sub_children = resolver.children(&ctx, &top_children[0]).unwrap();
    assert_eq!(arena.rel_path(sub_children[0]), "sub/leaf.txt");
}
