//! Content-addressed blob storage and the `Score` digest (spec §1, §6).
//!
//! Chunk and directory-listing payloads are framed with an 8-byte magic
//! plus a CRC32 trailer before being handed to the store, mirroring the
//! `DataBlobHeader { magic, crc }` framing the teacher uses for its own
//! on-disk blobs (`src/backup/data_blob.rs`) — reused here rather than
//! reinvented, just against a generic byte sink instead of a file.
//!
//! The real backing store (remote object storage, local chunk store)
//! lives outside this crate's scope; [`MemoryBlobStore`] is the
//! in-memory stand-in used by the pipeline's own test suite.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fmt;

use anyhow::{bail, Context as _, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::context::Context;

const FILE_CHUNK_MAGIC: [u8; 8] = *b"SVCHNK01";
const DIR_LISTING_MAGIC: [u8; 8] = *b"SVDLST01";
const FRAME_HEADER_LEN: usize = 8 + 4;

/// A 20-byte SHA-1 digest identifying a blob (spec §1: "the score is a
/// 20-byte SHA-1 digest of the blob's framed content").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score([u8; 20]);

impl Score {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Score(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 40 {
            bail!("score hex string has wrong length: {}", s.len());
        }
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .with_context(|| format!("invalid hex in score {:?}", s))?;
        }
        Ok(Score(bytes))
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({})", self.to_hex())
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Frame a file chunk's raw bytes for storage: magic + CRC32 + payload.
pub fn frame_file_chunk(payload: &[u8]) -> Vec<u8> {
    frame(FILE_CHUNK_MAGIC, payload)
}

/// Frame a serialized directory listing the same way.
pub fn frame_dir_listing(payload: &[u8]) -> Vec<u8> {
    frame(DIR_LISTING_MAGIC, payload)
}

fn frame(magic: [u8; 8], payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&magic);
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Inverse of [`frame_file_chunk`]/[`frame_dir_listing`]; checks both
/// the magic and the CRC before returning the payload.
pub fn unframe(expected_magic: [u8; 8], framed: &[u8]) -> Result<&[u8]> {
    if framed.len() < FRAME_HEADER_LEN {
        bail!("blob shorter than frame header");
    }
    let (header, payload) = framed.split_at(FRAME_HEADER_LEN);
    if header[..8] != expected_magic {
        bail!("blob has wrong magic");
    }
    let want_crc = u32::from_le_bytes(header[8..12].try_into().unwrap());
    let got_crc = crc32fast::hash(payload);
    if want_crc != got_crc {
        bail!("blob failed CRC check: expected {:08x}, got {:08x}", want_crc, got_crc);
    }
    Ok(payload)
}

/// A content-addressed sink: `save` stores a blob and returns its
/// score, `contains` checks for prior existence without transferring
/// the blob itself (consulted by the score cache's durability check,
/// spec §6).
pub trait BlobStore: Send + Sync {
    fn save(&self, ctx: &Context, framed_blob: &[u8]) -> Result<Score>;
    fn contains(&self, ctx: &Context, score: &Score) -> Result<bool>;
}

/// In-memory stand-in for a real chunk store, used by the pipeline's
/// own tests and nowhere else.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<Score, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, score: &Score) -> Option<Vec<u8>> {
        self.blobs.lock().get(score).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn save(&self, _ctx: &Context, framed_blob: &[u8]) -> Result<Score> {
        let score = Score::of(framed_blob);
        self.blobs.lock().entry(score).or_insert_with(|| framed_blob.to_vec());
        Ok(score)
    }

    fn contains(&self, _ctx: &Context, score: &Score) -> Result<bool> {
        Ok(self.blobs.lock().contains_key(score))
    }
}
