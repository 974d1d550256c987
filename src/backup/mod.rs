//! Content-addressed backup pipeline built on top of the generic
//! [`crate::graph`] engines.
//!
//! A save run walks a directory tree once (`resolver` + `topsort`),
//! then visits every node exactly once in dependency order
//! (`chunking_visitor` + `dag_visit`), chunking regular files and
//! framing directories as listings of their already-chunked children.
//! The [`score_cache`] lets a later run skip re-chunking a file whose
//! identity hasn't changed, and [`registry`] records where each run's
//! root score ended up.

pub mod blob_store;
pub mod chunker;
pub mod chunking_visitor;
pub mod clock;
pub mod fs_node;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod score_cache;

pub use blob_store::{BlobStore, MemoryBlobStore, Score};
pub use chunking_visitor::{ChunkingVisitor, ChunkingVisitorConfig};
pub use clock::{Clock, SystemClock};
pub use fs_node::{FileInfo, FileType, FsArena, NodeId};
pub use pipeline::Pipeline;
pub use registry::{JobRecord, MemoryRegistry, Registry};
pub use resolver::DependencyResolver;
pub use score_cache::ScoreCache;
