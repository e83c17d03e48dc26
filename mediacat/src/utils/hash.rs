//! Two-level content hash shared by every backend.
//!
//! The stream is cut into 4 MiB blocks, each block is hashed with SHA-256,
//! and the final checksum is the SHA-256 of the concatenated block digests.
//! A remote store that keeps per-block digests can therefore report the
//! same checksum without re-reading the object.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::common::constants::HASH_BLOCK_SIZE;
use crate::common::hash::CatalogHash;

const BUFFER_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum HashError {
    /// Empty files are never valid catalog candidates.
    #[error("Refusing to hash a zero-byte stream")]
    ZeroSize,

    #[error("I/O error while hashing: {0}")]
    Io(#[from] io::Error),
}

/// Incremental content hasher.
///
/// Feed it with [`ContentHasher::update`] (or through `io::Write`) and call
/// [`ContentHasher::finalize`] once the stream is exhausted.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    block: Sha256,
    block_len: usize,
    overall: Sha256,
    total: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            block: Sha256::new(),
            block_len: 0,
            overall: Sha256::new(),
            total: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = HASH_BLOCK_SIZE - self.block_len;
            let take = room.min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            self.total += take as u64;
            data = &data[take..];

            if self.block_len == HASH_BLOCK_SIZE {
                self.flush_block();
            }
        }
    }

    /// Number of bytes consumed so far.
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn finalize(mut self) -> Result<CatalogHash, HashError> {
        if self.total == 0 {
            return Err(HashError::ZeroSize);
        }
        if self.block_len > 0 {
            self.flush_block();
        }
        Ok(CatalogHash::new(self.overall.finalize().into()))
    }

    fn flush_block(&mut self) {
        let digest = std::mem::replace(&mut self.block, Sha256::new()).finalize();
        self.overall.update(digest);
        self.block_len = 0;
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hashes everything a reader yields.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<CatalogHash, HashError> {
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; BUFFER_LEN];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    hasher.finalize()
}

/// Hashes the file at `path`.
pub fn hash_file(path: &Path) -> Result<CatalogHash, HashError> {
    let file = File::open(path)?;
    hash_reader(BufReader::new(file))
}
