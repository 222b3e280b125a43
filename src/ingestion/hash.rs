//! Content fingerprinting for source documents.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const HASH_BLOCK_SIZE: usize = 8192;

/// Compute the SHA-256 content hash of a file, streaming in fixed-size
/// blocks so memory use is independent of file size.
///
/// The digest is the dedup and provenance key for the document: stable
/// across re-reads of unchanged bytes.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BLOCK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
