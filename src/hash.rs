//! Content hashing
//!
//! SHA-256 hashes in the `sha256:<hex>` form, used for artifact records,
//! post-validation, and tree comparison.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Hash a byte slice as `sha256:<hex>`
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{:x}", hasher.finalize())
}

/// Hash a file's content
pub fn hash_file(path: &Path) -> io::Result<String> {
    Ok(hash_bytes(&fs::read(path)?))
}

/// Hash every file under `root`, keyed by path relative to `root`
///
/// The map is ordered, so two identical trees hash to the same sequence.
pub fn hash_tree(root: &Path) -> io::Result<BTreeMap<PathBuf, String>> {
    let mut hashes = BTreeMap::new();
    if !root.exists() {
        return Ok(hashes);
    }
    hash_tree_into(root, root, &mut hashes)?;
    Ok(hashes)
}

fn hash_tree_into(
    root: &Path,
    current: &Path,
    hashes: &mut BTreeMap<PathBuf, String>,
) -> io::Result<()> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            hash_tree_into(root, &path, hashes)?;
        } else {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            hashes.insert(relative, hash_file(&path)?);
        }
    }
    Ok(())
}
