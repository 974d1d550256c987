//! Fixed-size chunk cursor (spec §4.5), re-expressed as a synchronous
//! reader-adapter in place of the teacher's async `FixedChunkStream`
//! (`src/backup/chunk_stream.rs`) — the pipeline here has no
//! tokio runtime to hand it, so chunking happens inline on the worker
//! thread that owns the node.

use std::io::{self, Read};

/// Splits a reader into fixed-size chunks. The final chunk may be
/// shorter than `chunk_size`; a zero-byte input yields no chunks at all.
pub struct FixedChunker<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read> FixedChunker<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        FixedChunker { reader, chunk_size }
    }

    pub fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}
