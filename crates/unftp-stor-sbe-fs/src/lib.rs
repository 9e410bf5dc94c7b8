//! A libunftp-stor [`StorageBackend`] that stores uploads on a local filesystem, like a
//! traditional FTP server.
//!
//! ```no_run
//! use unftp_stor_sbe_fs::Filesystem;
//!
//! let storage = Filesystem::new(std::env::temp_dir()).unwrap().atomic_uploads(true);
//! let server = libunftp_stor::Server::new(storage).greeting("Welcome to my FTP server");
//! ```

mod cap_fs;

use async_trait::async_trait;
use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use unftp_stor_core::storage::{
    BackgroundTransfer, Completion, DataSource, Error, ErrorKind, FEATURE_RESTART, FileTarget, FinishFuture, Result, StorageBackend,
};

const WRITE_BUFFER_SIZE: usize = 4096;

/// The Filesystem struct is an implementation of the StorageBackend trait that keeps its files
/// inside a specific root directory on local disk.
///
/// Directories and entries handed out by this back-end are paths relative to the root. All file
/// access goes through a capability handle on the root, so symlinks pointing outside of it can't
/// be followed.
#[derive(Debug)]
pub struct Filesystem {
    root_fd: Arc<cap_std::fs::Dir>,
    root: PathBuf,
    atomic_uploads: bool,
}

impl Filesystem {
    /// Create a new Filesystem backend, with the given root. No operations can take place outside
    /// of the root. For example, when the `Filesystem` root is set to `/srv/ftp`, and a client
    /// uploads `hello.txt`, the server will write `/srv/ftp/hello.txt`.
    pub fn new<P: Into<PathBuf>>(root: P) -> io::Result<Self> {
        let root = std::fs::canonicalize(root.into())?;
        let root_fd = Arc::new(cap_std::fs::Dir::open_ambient_dir(&root, cap_std::ambient_authority())?);
        Ok(Filesystem {
            root_fd,
            root,
            atomic_uploads: false,
        })
    }

    /// When enabled, new and replaced files are first written to a hidden part file next to their
    /// destination and moved in place by a [`BackgroundTransfer`] after the upload finished.
    /// Clients therefore never observe a half-written file under its final name.
    pub fn atomic_uploads(mut self, enabled: bool) -> Self {
        self.atomic_uploads = enabled;
        self
    }

    /// The root directory of this back-end.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // Lexically resolves `name` against the virtual working directory `cwd` into a path relative
    // to the root. Returns `None` for names that climb above the root or that don't name a file.
    fn resolve(&self, cwd: &Path, name: &str) -> Option<PathBuf> {
        let name = Path::new(name);
        let mut paths = Vec::with_capacity(2);
        if !name.has_root() {
            paths.push(cwd);
        }
        paths.push(name);

        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for path in paths {
            for component in path.components() {
                match component {
                    Component::Normal(part) => parts.push(part),
                    Component::ParentDir => {
                        parts.pop()?;
                    }
                    Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                }
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.iter().collect())
    }

    async fn write_new(&self, destination: PathBuf, input: DataSource<'_>) -> Result<Completion> {
        if !self.atomic_uploads {
            let mut options = cap_std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            let file = cap_fs::open_with(self.root_fd.clone(), &destination, options).await?;
            copy_into(file, input).await?;
            return Ok(None);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let part = part_file_for(&destination, &id)?;
        let mut options = cap_std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        let file = cap_fs::open_with(self.root_fd.clone(), &part, options).await?;
        if let Err(err) = copy_into(file, input).await {
            // Best effort, the part file is hidden and unique anyway.
            let _ = cap_fs::remove_file(self.root_fd.clone(), &part).await;
            return Err(err);
        }
        Ok(Some(Box::new(MoveInPlace {
            id,
            root_fd: self.root_fd.clone(),
            part,
            destination,
        })))
    }
}

// The root itself is `.`, and files directly below it are named without a prefix.
fn in_directory(directory: &Path, file_name: &str) -> PathBuf {
    if directory == Path::new(".") {
        PathBuf::from(file_name)
    } else {
        directory.join(file_name)
    }
}

fn part_file_for(destination: &Path, id: &str) -> Result<PathBuf> {
    let file_name = destination
        .file_name()
        .ok_or_else(|| Error::from(ErrorKind::FileNameNotAllowedError))?
        .to_string_lossy();
    Ok(destination.with_file_name(format!(".{}.{}.part", file_name, id)))
}

async fn copy_into(file: tokio::fs::File, input: DataSource<'_>) -> Result<u64> {
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let bytes = tokio::io::copy(input, &mut writer).await?;
    writer.flush().await?;
    Ok(bytes)
}

/// Moves a completely written part file to its final name.
#[derive(Debug)]
struct MoveInPlace {
    id: String,
    root_fd: Arc<cap_std::fs::Dir>,
    part: PathBuf,
    destination: PathBuf,
}

impl BackgroundTransfer for MoveInPlace {
    fn transfer_id(&self) -> &str {
        &self.id
    }

    fn finish(self: Box<Self>) -> FinishFuture {
        Box::pin(async move {
            if let Err(err) = cap_fs::rename(self.root_fd.clone(), &self.part, &self.destination).await {
                let _ = cap_fs::remove_file(self.root_fd.clone(), &self.part).await;
                return Err(Error::new(ErrorKind::LocalError, err));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl StorageBackend for Filesystem {
    type Directory = PathBuf;
    type Entry = PathBuf;

    fn supported_features(&self) -> u32 {
        FEATURE_RESTART
    }

    #[tracing_attributes::instrument]
    async fn search_file(&self, cwd: &Path, name: &str) -> Result<Option<FileTarget<PathBuf, PathBuf>>> {
        let Some(path) = self.resolve(cwd, name) else {
            return Ok(None);
        };
        let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Ok(None);
        };
        let directory = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };
        // A symlink leading out of the root fails here like a missing directory.
        match cap_fs::metadata(self.root_fd.clone(), &directory).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Ok(None),
        }
        let entry = match cap_fs::symlink_metadata(self.root_fd.clone(), &path).await {
            Ok(meta) if meta.is_dir() => return Err(Error::from(ErrorKind::PermanentFileNotAvailable)),
            Ok(_) => Some(path.clone()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        Ok(Some(FileTarget {
            directory,
            file_name: file_name.to_string_lossy().into_owned(),
            entry,
        }))
    }

    #[tracing_attributes::instrument(skip(input))]
    async fn create(&self, directory: &PathBuf, file_name: &str, input: DataSource<'_>) -> Result<Completion> {
        self.write_new(in_directory(directory, file_name), input).await
    }

    #[tracing_attributes::instrument(skip(input))]
    async fn replace(&self, entry: &PathBuf, input: DataSource<'_>) -> Result<Completion> {
        self.write_new(entry.clone(), input).await
    }

    #[tracing_attributes::instrument(skip(input))]
    async fn append(&self, target: &FileTarget<PathBuf, PathBuf>, start_pos: u64, input: DataSource<'_>) -> Result<Completion> {
        let path = match &target.entry {
            Some(entry) => entry.clone(),
            None => in_directory(&target.directory, &target.file_name),
        };
        let mut options = cap_std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(false);
        let mut file = cap_fs::open_with(self.root_fd.clone(), &path, options).await?;
        // Anything beyond the restart offset is overwritten by the new data. A file that is
        // shorter than the offset, or that didn't exist, is extended sparsely.
        file.set_len(start_pos).await?;
        file.seek(std::io::SeekFrom::Start(start_pos)).await?;
        copy_into(file, input).await?;
        Ok(None)
    }
}
