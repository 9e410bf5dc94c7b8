//! Async wrappers around the [`cap_std::fs::Dir`] operations the back-end needs. Every path is
//! relative to the directory handle and can't leave it, not even through symlinks.

use std::{io, path::Path, sync::Arc};
use tokio::task::spawn_blocking;

async fn asyncify<F, T>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match spawn_blocking(f).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::other("background task failed")),
    }
}

/// Opens a file with the given options and hands it over to tokio.
pub async fn open_with<P: AsRef<Path>>(root: Arc<cap_std::fs::Dir>, path: P, options: cap_std::fs::OpenOptions) -> io::Result<tokio::fs::File> {
    let path = path.as_ref().to_owned();
    let file = asyncify(move || root.open_with(path, &options)).await?;
    Ok(tokio::fs::File::from_std(file.into_std()))
}

/// Queries metadata, following symlinks as long as they stay below `root`.
pub async fn metadata<P: AsRef<Path>>(root: Arc<cap_std::fs::Dir>, path: P) -> io::Result<cap_std::fs::Metadata> {
    let path = path.as_ref().to_owned();
    asyncify(move || root.metadata(path)).await
}

pub async fn symlink_metadata<P: AsRef<Path>>(root: Arc<cap_std::fs::Dir>, path: P) -> io::Result<cap_std::fs::Metadata> {
    let path = path.as_ref().to_owned();
    asyncify(move || root.symlink_metadata(path)).await
}

/// Renames a file, replacing `to` if it exists. Both paths are relative to `root`.
pub async fn rename(root: Arc<cap_std::fs::Dir>, from: impl AsRef<Path>, to: impl AsRef<Path>) -> io::Result<()> {
    let from = from.as_ref().to_owned();
    let to = to.as_ref().to_owned();
    asyncify(move || root.rename(from, &root, to)).await
}

pub async fn remove_file(root: Arc<cap_std::fs::Dir>, path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref().to_owned();
    asyncify(move || root.remove_file(path)).await
}
