//! Decides how an upload is written to the storage back-end and performs the write.

use super::datachan::DataChannel;
use crate::storage::{self, Completion, FileTarget, StorageBackend};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How the uploaded bytes end up in storage.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StorageOperation<'a, E> {
    /// A new file is made.
    Create,
    /// The existing file's content is overwritten.
    Replace(&'a E),
    /// Writing starts at the given byte offset.
    Append(u64),
}

impl<'a, E> StorageOperation<'a, E> {
    /// A restart offset other than zero always means append, whether or not the file exists.
    /// Without one the file is either replaced or created.
    pub fn resolve(start_pos: Option<u64>, entry: Option<&'a E>) -> Self {
        match (start_pos.unwrap_or(0), entry) {
            (0, Some(entry)) => StorageOperation::Replace(entry),
            (0, None) => StorageOperation::Create,
            (offset, _) => StorageOperation::Append(offset),
        }
    }
}

/// Why a transfer did not complete.
#[derive(Debug, Error)]
pub(crate) enum TransferError {
    #[error("transfer aborted")]
    Aborted,
    #[error("transfer failed")]
    Storage(#[source] storage::Error),
}

/// Streams the data channel into storage with the given operation. Returns whatever the back-end
/// needs to finalize the upload later on.
///
/// Failures are reported as they are, the upload is never retried. Once `cancel` fires the
/// operation is dropped and `Aborted` is returned, even if the back-end was still busy.
pub(crate) async fn execute<S>(
    storage: &S,
    operation: &StorageOperation<'_, S::Entry>,
    target: &FileTarget<S::Directory, S::Entry>,
    channel: &mut DataChannel,
    cancel: &CancellationToken,
) -> Result<Completion, TransferError>
where
    S: StorageBackend + ?Sized,
{
    let write = async {
        match operation {
            StorageOperation::Create => storage.create(&target.directory, &target.file_name, channel).await,
            StorageOperation::Replace(entry) => storage.replace(entry, channel).await,
            StorageOperation::Append(offset) => storage.append(target, *offset, channel).await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Aborted),
        result = write => match result {
            Ok(completion) => Ok(completion),
            // The read that failed was most likely the one interrupted by the cancellation.
            Err(_) if cancel.is_cancelled() => Err(TransferError::Aborted),
            Err(err) => Err(TransferError::Storage(err)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::{MockProvider, MockStorage};
    use crate::storage::ErrorKind;

    use pretty_assertions::assert_eq;
    use std::{path::Path, time::Duration};

    #[test]
    fn resolves_all_offset_and_existence_combinations() {
        let entry = "report.txt";
        assert_eq!(StorageOperation::resolve(None, Some(&entry)), StorageOperation::Replace(&entry));
        assert_eq!(StorageOperation::resolve(Some(0), Some(&entry)), StorageOperation::Replace(&entry));
        assert_eq!(StorageOperation::resolve(Some(4096), Some(&entry)), StorageOperation::Append(4096));
        assert_eq!(StorageOperation::<&str>::resolve(None, None), StorageOperation::Create);
        assert_eq!(StorageOperation::<&str>::resolve(Some(0), None), StorageOperation::Create);
        assert_eq!(StorageOperation::<&str>::resolve(Some(4096), None), StorageOperation::Append(4096));
    }

    async fn open(provider: &MockProvider, cancel: &CancellationToken) -> DataChannel {
        DataChannel::open(provider, Duration::from_secs(10), cancel).await.unwrap()
    }

    #[tokio::test]
    async fn runs_the_selected_operation() {
        let storage = MockStorage::new().with_existing("report.txt");
        let provider = MockProvider::sending(b"new content");
        let cancel = CancellationToken::new();
        let target = storage.search_file(Path::new("/"), "report.txt").await.unwrap().unwrap();
        let operation = StorageOperation::resolve(None, target.entry.as_ref());
        let mut channel = open(&provider, &cancel).await;

        let completion = execute(&storage, &operation, &target, &mut channel, &cancel).await.unwrap();

        assert!(completion.is_none());
        assert_eq!(storage.calls(), vec!["search report.txt", "replace /report.txt"]);
        assert_eq!(storage.written(), b"new content");
    }

    #[tokio::test]
    async fn storage_failure_is_passed_on() {
        let storage = MockStorage::new().failing_with(ErrorKind::InsufficientStorageSpaceError);
        let provider = MockProvider::sending(b"too much");
        let cancel = CancellationToken::new();
        let target = storage.search_file(Path::new("/"), "new.bin").await.unwrap().unwrap();
        let mut channel = open(&provider, &cancel).await;

        let err = execute(&storage, &StorageOperation::Create, &target, &mut channel, &cancel).await.unwrap_err();

        match err {
            TransferError::Storage(err) => assert_eq!(err.kind(), ErrorKind::InsufficientStorageSpaceError),
            other => panic!("expected a storage error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_during_a_stalled_read_aborts() {
        let storage = MockStorage::new();
        let provider = MockProvider::stalling();
        let cancel = CancellationToken::new();
        let target = storage.search_file(Path::new("/"), "new.bin").await.unwrap().unwrap();
        let mut channel = open(&provider, &cancel).await;

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let err = execute(&storage, &StorageOperation::Create, &target, &mut channel, &cancel).await.unwrap_err();

        assert!(matches!(err, TransferError::Aborted));
    }
}
