//! Append-only log file with size-based rotation.
//!
//! Before every write the file size is compared against the threshold. On
//! rotation the current file is closed, any previous `<file>.old` backup is
//! deleted, the file is renamed to the backup name and a fresh file is
//! started with a marker line. Rotation failures fall back to appending to
//! the original path; if that fails too the sink disables itself.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{error, warn};

pub const BACKUP_SUFFIX: &str = ".old";

pub struct FileSink {
    path: PathBuf,
    backup: PathBuf,
    threshold: u64,
    file: Option<File>,
}

impl FileSink {
    /// Open the sink. `truncate` starts from an empty file, otherwise the
    /// existing file is appended to.
    pub fn open(path: &Path, threshold: u64, truncate: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = if truncate {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?
        } else {
            OpenOptions::new().create(true).append(true).open(path)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            backup: backup_path(path),
            threshold,
            file: Some(file),
        })
    }

    /// False once the sink has given up on the file.
    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one line, rotating first if the file has reached the threshold.
    ///
    /// A write error disables the sink and is returned to the caller.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.file.is_none() {
            return Ok(());
        }

        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() >= self.threshold => self.rotate(),
            Ok(_) => {}
            Err(e) => warn!(error = %e, path = %self.path.display(), "log size check failed"),
        }

        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        if let Err(e) = writeln!(file, "[{}] {}", iso_now(), line) {
            self.file = None;
            return Err(e);
        }
        Ok(())
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush() {
                warn!(error = %e, "log file flush failed");
            }
        }
    }

    fn rotate(&mut self) {
        self.file = None;

        match self.try_rotate() {
            Ok(file) => self.file = Some(file),
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "log rotation failed");
                self.recover();
            }
        }
    }

    fn try_rotate(&self) -> io::Result<File> {
        if self.backup.exists() {
            fs::remove_file(&self.backup)?;
        }
        fs::rename(&self.path, &self.backup)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;

        let backup_name = self
            .backup
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(
            file,
            "[{}] [SYSTEM] Log file reached maximum size and was rotated. Previous logs saved to {}",
            iso_now(),
            backup_name
        )?;
        Ok(file)
    }

    fn recover(&mut self) {
        let reopened = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                writeln!(
                    file,
                    "[{}] [SYSTEM] Log rotation FAILED (File busy?). Logging continues in the same file.",
                    iso_now()
                )?;
                Ok(file)
            });

        match reopened {
            Ok(file) => self.file = Some(file),
            Err(e) => {
                error!(error = %e, "could not recover log file after failed rotation, file logging disabled");
                self.file = None;
            }
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
