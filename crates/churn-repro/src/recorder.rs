use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use churn_core::{Action, ActionLog, StepFault};

use crate::script::{parse_script, render_script, ScriptDialect, ScriptParseError};

/// Suffixes tried after the plain artifact name is taken.
const MAX_NAME_SUFFIX: u32 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Failed to create artifact directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write artifact {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read script {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No free artifact name for run {run_id} in {}", .dir.display())]
    NameExhausted { run_id: String, dir: PathBuf },

    #[error("Malformed script: {0}")]
    Parse(#[from] ScriptParseError),
}

/// Writes one reproduction script per failure into an artifact directory.
#[derive(Debug, Clone)]
pub struct Recorder {
    dir: PathBuf,
    dialect: ScriptDialect,
}

impl Recorder {
    pub fn new(dir: impl Into<PathBuf>, dialect: ScriptDialect) -> Self {
        Self {
            dir: dir.into(),
            dialect,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dialect(&self) -> &ScriptDialect {
        &self.dialect
    }

    /// Write the reproduction for `fault` and return where it went.
    ///
    /// Existing files are never touched: if `fuzz-<run_id>.<ext>` exists, the
    /// next free `fuzz-<run_id>.<n>.<ext>` is used instead.
    pub fn capture(
        &self,
        fault: &StepFault,
        run_id: &str,
        log: &ActionLog,
    ) -> Result<PathBuf, RecordError> {
        fs::create_dir_all(&self.dir).map_err(|source| RecordError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let script = render_script(fault, log, &self.dialect);
        let (path, mut file) = self.create_artifact(run_id)?;
        file.write_all(script.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| RecordError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            run_id,
            path = %path.display(),
            actions = log.len(),
            "reproduction written"
        );
        Ok(path)
    }

    /// Read an artifact back into the actions it replays.
    pub fn load(&self, path: &Path) -> Result<Vec<Action>, RecordError> {
        let text = fs::read_to_string(path).map_err(|source| RecordError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(parse_script(&text, &self.dialect)?)
    }

    fn create_artifact(&self, run_id: &str) -> Result<(PathBuf, File), RecordError> {
        let ext = &self.dialect.extension;
        for attempt in 0..=MAX_NAME_SUFFIX {
            let name = if attempt == 0 {
                self.dialect.file_name(run_id)
            } else {
                format!("fuzz-{run_id}.{attempt}.{ext}")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(path = %path.display(), "artifact name taken");
                }
                Err(source) => return Err(RecordError::Write { path, source }),
            }
        }
        Err(RecordError::NameExhausted {
            run_id: run_id.to_string(),
            dir: self.dir.clone(),
        })
    }
}
