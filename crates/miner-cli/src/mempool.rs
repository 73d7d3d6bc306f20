//! Mempool directory loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use miner_core::error::MalformedKind;
use miner_core::{RejectionReason, TxRecord};
use tracing::debug;

/// One mempool file: its path and the parsed record, or why it failed.
pub type MempoolEntry = (PathBuf, Result<TxRecord, RejectionReason>);

/// Load every `*.json` file in `dir`, sorted by file name.
///
/// A missing or unreadable directory is an error. A file that cannot be
/// read or parsed becomes a malformed entry and does not stop the load.
pub fn load_dir(dir: &Path) -> anyhow::Result<Vec<MempoolEntry>> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("failed to read mempool directory {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to list {}", dir.display()))?;

    paths.retain(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    debug!(dir = %dir.display(), files = paths.len(), "loading mempool");
    Ok(paths
        .into_iter()
        .map(|path| {
            let record = load_file(&path);
            (path, record)
        })
        .collect())
}

fn load_file(path: &Path) -> Result<TxRecord, RejectionReason> {
    let text = fs::read_to_string(path)
        .map_err(|err| MalformedKind::Unparseable(format!("{}: {}", path.display(), err)))?;
    TxRecord::from_json(&text)
        .map_err(|err| MalformedKind::Unparseable(format!("{}: {}", path.display(), err)).into())
}
