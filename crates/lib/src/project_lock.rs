//! File-based per-project build locking.
//!
//! Two builds of the same project would share the project's store slot and
//! trample each other's intermediates, so builds take an exclusive lock on
//! `{store_dir}/<project-key>.lock` for their whole duration. The OS releases
//! the lock when the holder exits, even if it crashes.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Delay between attempts while another build holds the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub project_root: PathBuf,
}

#[derive(Debug, Error)]
pub enum ProjectLockError {
  #[error("project is being built by PID {pid} (started at Unix time {started_at_unix}); lock file: {lock_path}")]
  Contention {
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error("project is being built by another process; lock file: {lock_path}")]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create lock directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held exclusive lock; released on drop.
#[derive(Debug)]
pub struct ProjectLock {
  _file: File,
  lock_path: PathBuf,
}

impl ProjectLock {
  /// Acquire the lock at `lock_path`, waiting up to `wait` for a current
  /// holder to finish.
  pub async fn acquire(lock_path: PathBuf, project_root: &Path, wait: Duration) -> Result<Self, ProjectLockError> {
    if let Some(parent) = lock_path.parent() {
      std::fs::create_dir_all(parent).map_err(ProjectLockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(ProjectLockError::OpenFile)?;

    let start = Instant::now();
    loop {
      match try_lock(&file) {
        Ok(()) => break,
        Err(err) if is_contention(&err) => {
          if start.elapsed() >= wait {
            return Err(read_contention_error(&lock_path));
          }
          debug!(lock = %lock_path.display(), "project locked by another build, waiting");
          tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(err) => return Err(ProjectLockError::LockFailed(err)),
      }
    }

    write_metadata(&file, project_root)?;
    Ok(ProjectLock { _file: file, lock_path })
  }

  /// Reads the lock metadata through the held file handle.
  #[cfg(test)]
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self._file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, project_root: &Path) -> Result<(), ProjectLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    project_root: project_root.to_path_buf(),
  };

  file.set_len(0).map_err(ProjectLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| ProjectLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(ProjectLockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> ProjectLockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return ProjectLockError::Contention {
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  ProjectLockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(unix)]
fn is_contention(err: &io::Error) -> bool {
  err.kind() == io::ErrorKind::WouldBlock
}

#[cfg(windows)]
fn try_lock(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(windows)]
fn is_contention(err: &io::Error) -> bool {
  // ERROR_LOCK_VIOLATION
  err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(33)
}
