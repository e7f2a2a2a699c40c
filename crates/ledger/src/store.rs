//! Durable storage backends for ledgers
//!
//! `FileStore` keeps one record per line in a plain UTF-8 file. Whole-file
//! rewrites use a temp file + rename in the same directory so a crash leaves
//! either the old or the new content, never a torn file. Appends are
//! `sync_data`'d before returning. Both paths create files as 0600 since the
//! ledgers hold credentials and tokens.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};

/// Boxed future returned by [`LineStore`] methods (keeps the trait dyn-compatible).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable backend holding an ordered sequence of text lines.
pub trait LineStore: Send + Sync {
    /// Human-readable location for logs and errors.
    fn describe(&self) -> String;

    /// Read every line. Returns `Error::Missing` if the backing store does
    /// not exist yet.
    fn read_lines(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Durably append one line, creating the store if needed.
    fn append_line<'a>(&'a self, line: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Replace the whole content with `lines`.
    fn overwrite<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, Result<()>>;
}

/// Plain text file, one record per line.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineStore for FileStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_lines(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(&self.path).await {
                Ok(contents) => Ok(contents.lines().map(String::from).collect()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(Error::Missing(self.describe()))
                }
                Err(e) => Err(Error::Io(format!("reading {}: {e}", self.describe()))),
            }
        })
    }

    fn append_line<'a>(&'a self, line: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let created = !tokio::fs::try_exists(&self.path).await.unwrap_or(false);

            let mut options = tokio::fs::OpenOptions::new();
            options.create(true).append(true);
            #[cfg(unix)]
            options.mode(0o600);

            let mut file = options
                .open(&self.path)
                .await
                .map_err(|e| Error::Io(format!("opening {} for append: {e}", self.describe())))?;

            let mut record = String::with_capacity(line.len() + 1);
            record.push_str(line);
            record.push('\n');

            file.write_all(record.as_bytes())
                .await
                .map_err(|e| Error::Io(format!("appending to {}: {e}", self.describe())))?;
            file.sync_data()
                .await
                .map_err(|e| Error::Io(format!("syncing {}: {e}", self.describe())))?;
            if created {
                sync_dir(parent_dir(&self.path)).await?;
            }

            debug!(path = %self.path.display(), "appended record");
            Ok(())
        })
    }

    fn overwrite<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut contents = String::new();
            for line in lines {
                contents.push_str(line);
                contents.push('\n');
            }
            write_atomic(&self.path, contents.as_bytes()).await
        })
    }
}

/// Write `data` to `path` atomically.
///
/// Writes to a temporary file in the same directory, syncs it, then renames
/// it over the target and syncs the directory. Sets 0600 permissions on unix.
/// The temporary file is removed if any step fails.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io(format!("{} has no file name", path.display())))?
        .to_string_lossy();

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    if let Err(e) = write_then_rename(&tmp_path, path, data).await {
        // may hold credentials
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    sync_dir(dir).await?;

    debug!(path = %path.display(), bytes = data.len(), "rewrote ledger");
    Ok(())
}

async fn write_then_rename(tmp_path: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut tmp = options
        .open(tmp_path)
        .await
        .map_err(|e| Error::Io(format!("creating temp file {}: {e}", tmp_path.display())))?;
    tmp.write_all(data)
        .await
        .map_err(|e| Error::Io(format!("writing temp file {}: {e}", tmp_path.display())))?;
    tmp.sync_all()
        .await
        .map_err(|e| Error::Io(format!("syncing temp file {}: {e}", tmp_path.display())))?;
    drop(tmp);

    // A leftover temp file from an earlier crash keeps its old mode
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting permissions on {}: {e}", tmp_path.display())))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp file over {}: {e}", path.display())))
}

/// Directory containing `path`, `.` for a bare file name.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Persist directory entries so a created or renamed file survives power loss.
async fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let handle = tokio::fs::File::open(dir)
            .await
            .map_err(|e| Error::Io(format!("opening directory {}: {e}", dir.display())))?;
        handle
            .sync_all()
            .await
            .map_err(|e| Error::Io(format!("syncing directory {}: {e}", dir.display())))?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
