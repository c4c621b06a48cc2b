//! Replay and error-log artifacts
//!
//! Both roots are safe for an operator to prune at any time; nothing reads
//! artifacts back except humans.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const REPLAY_EXT: &str = "gz";

/// Where a match's artifacts end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    replay_root: PathBuf,
    error_log_root: PathBuf,
}

impl ArtifactStore {
    pub fn new(replay_root: impl Into<PathBuf>, error_log_root: impl Into<PathBuf>) -> Self {
        Self {
            replay_root: replay_root.into(),
            error_log_root: error_log_root.into(),
        }
    }

    pub fn replay_root(&self) -> &Path {
        &self.replay_root
    }

    pub fn error_log_root(&self) -> &Path {
        &self.error_log_root
    }

    /// Gzip `source` into the replay root and remove the original.
    pub fn compress_replay(&self, source: &Path, match_id: Uuid) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.replay_root)?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "replay".to_string());
        let dest = self
            .replay_root
            .join(format!("{match_id}-{file_name}.{REPLAY_EXT}"));

        if let Err(err) = gzip_file(source, &dest) {
            let _ = fs::remove_file(&dest);
            return Err(err);
        }

        fs::remove_file(source)?;
        Ok(dest)
    }

    /// Write one failing bot's log for a match.
    pub fn store_error_log(&self, match_id: Uuid, bot: &str, contents: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.error_log_root)?;
        let dest = self.error_log_root.join(format!("{match_id}-{bot}.log"));
        fs::write(&dest, contents)?;
        Ok(dest)
    }
}

fn gzip_file(source: &Path, dest: &Path) -> io::Result<()> {
    let mut input = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dest)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()
}

/// Remove artifacts of a match that will not be recorded.
pub fn discard_artifacts(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to remove artifact"),
        }
    }
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod archive_tests;
