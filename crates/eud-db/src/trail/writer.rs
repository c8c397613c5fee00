//! JSONL trail writer.
//!
//! Appends `TrailOperation` records to per-user `{trail_dir}/{user}.jsonl`
//! files. Uses `serde_jsonlines::append_json_lines` for per-line appends.

use std::path::{Path, PathBuf};

use eud_core::trail::TrailOperation;

use crate::error::DatabaseError;

/// Appends trail operations to per-user JSONL files.
pub struct TrailWriter {
    trail_dir: PathBuf,
    enabled: bool,
}

impl TrailWriter {
    /// Create a writer pointing at the given directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory cannot be created.
    pub fn new(trail_dir: PathBuf) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(&trail_dir).map_err(|e| DatabaseError::Other(e.into()))?;
        Ok(Self {
            trail_dir,
            enabled: true,
        })
    }

    /// Create a disabled writer.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            trail_dir: PathBuf::new(),
            enabled: false,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// File the operations of `user` are appended to.
    #[must_use]
    pub fn path_for(&self, user: &str) -> PathBuf {
        self.trail_dir.join(format!("{}.jsonl", sanitize(user)))
    }

    /// Append operations, grouped into their users' files.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a file write fails.
    pub fn append_all(&self, ops: &[TrailOperation]) -> Result<(), DatabaseError> {
        if !self.enabled {
            return Ok(());
        }
        for op in ops {
            serde_jsonlines::append_json_lines(self.path_for(&op.user), [op])
                .map_err(|e| DatabaseError::Other(e.into()))?;
        }
        Ok(())
    }

    /// Read back every operation recorded for `user`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the file exists but cannot be parsed.
    pub fn read_user(&self, user: &str) -> Result<Vec<TrailOperation>, DatabaseError> {
        let path = self.path_for(user);
        if !self.enabled || !path.exists() {
            return Ok(Vec::new());
        }
        serde_jsonlines::json_lines(&path)
            .map_err(|e| DatabaseError::Other(e.into()))?
            .collect::<Result<Vec<TrailOperation>, _>>()
            .map_err(|e| DatabaseError::Other(e.into()))
    }

    #[must_use]
    pub fn trail_dir(&self) -> &Path {
        &self.trail_dir
    }
}

/// Keep file names to a safe character set.
fn sanitize(user: &str) -> String {
    user.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
