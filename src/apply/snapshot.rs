//! Snapshot persistence: every generated config is written flat to
//! `<config_dir>/config-<unix_seconds>[-n].json` before being posted to the
//! admin API, so a failed apply can roll back to the one before it.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::clock::Clock;
use crate::config::document::Config;

/// Serializes `config` and writes it to a fresh, monotonically-named
/// snapshot file. Two applies landing on the same clock second are
/// disambiguated with a `-N` suffix rather than overwriting one another.
pub async fn save(config_dir: &Path, config: &Config, clock: &dyn Clock) -> io::Result<PathBuf> {
    fs::create_dir_all(config_dir).await?;

    let bytes = serde_json::to_vec_pretty(config).map_err(io::Error::other)?;
    let timestamp = clock.unix_timestamp();

    let mut path = config_dir.join(format!("config-{timestamp}.json"));
    let mut suffix = 1u32;
    while fs::try_exists(&path).await? {
        path = config_dir.join(format!("config-{timestamp}-{suffix}.json"));
        suffix += 1;
    }

    fs::write(&path, &bytes).await?;
    Ok(path)
}

/// Reads and parses a previously-saved snapshot.
pub async fn read(path: &Path) -> io::Result<Config> {
    let bytes = fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(io::Error::other)
}

/// Deletes `path`, treating a missing file as success: the caller may be
/// cleaning up a snapshot a concurrent rotation already removed.
pub async fn delete(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Keeps the `keep` most recent snapshots under `config_dir`, deleting the
/// rest. Recency comes from the timestamp embedded in the filename, not
/// directory mtimes.
pub async fn rotate(config_dir: &Path, keep: usize) -> io::Result<()> {
    let mut snapshots = list(config_dir).await?;
    snapshots.sort_by_key(|(timestamp, _)| *timestamp);

    if snapshots.len() > keep {
        for (_, path) in &snapshots[..snapshots.len() - keep] {
            delete(path).await?;
        }
    }
    Ok(())
}

/// Returns the path to the most recent remaining snapshot, by the timestamp
/// embedded in its filename, or `None` if no snapshot exists.
pub async fn latest(config_dir: &Path) -> io::Result<Option<PathBuf>> {
    let snapshots = list(config_dir).await?;
    Ok(snapshots.into_iter().max_by_key(|(timestamp, _)| *timestamp).map(|(_, path)| path))
}

async fn list(config_dir: &Path) -> io::Result<Vec<(i64, PathBuf)>> {
    let mut entries = match fs::read_dir(config_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut snapshots = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else { continue };
        if let Some(timestamp) = parse_timestamp(name) {
            snapshots.push((timestamp, entry.path()));
        }
    }
    Ok(snapshots)
}

fn parse_timestamp(file_name: &str) -> Option<i64> {
    let stripped = file_name.strip_prefix("config-")?.strip_suffix(".json")?;
    stripped.split('-').next()?.parse().ok()
}
