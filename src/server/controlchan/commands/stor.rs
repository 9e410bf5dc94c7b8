//! The RFC 959 Store (`STOR`) command
//
// This command causes the server-DTP to accept the data
// transferred via the data connection and to store the data as
// a file at the server site.  If the file specified in the
// pathname exists at the server site, then its contents shall
// be replaced by the data being transferred.  A new file is
// created at the server site if the file specified in the
// pathname does not already exist.

use crate::{
    server::{
        chancomms::ControlChanMsg,
        controlchan::{
            command::Command,
            error::{ControlChanError, ControlChanErrorKind},
            handler::{CommandContext, CommandHandler},
            reply::{Reply, ReplyCode},
        },
        datachan::DataChannel,
        transfer::{self, StorageOperation, TransferError},
    },
    storage::{self, ErrorKind, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Stor;

#[async_trait]
impl<Storage> CommandHandler<Storage> for Stor
where
    Storage: StorageBackend + 'static,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage>) -> Result<Reply, ControlChanError> {
        let path = match &args.parsed_command {
            Command::Stor { path } => path.clone(),
            _ => return Err(ControlChanErrorKind::InternalServerError.into()),
        };

        args.session.lock().await.data_abort = Some(args.cancel.clone());
        let result = store(&args, path).await;
        args.session.lock().await.data_abort = None;
        result
    }

    fn is_abortable(&self) -> bool {
        true
    }
}

async fn store<Storage>(args: &CommandContext<Storage>, path: String) -> Result<Reply, ControlChanError>
where
    Storage: StorageBackend + 'static,
{
    let logger = &args.logger;
    // The restart offset only ever applies to the STOR right after the REST.
    let (cwd, transfer_type, start_pos, trace_id) = {
        let mut session = args.session.lock().await;
        (session.cwd.clone(), session.transfer_type, session.start_pos.take(), session.trace_id)
    };

    if !transfer_type.supports_upload() {
        return Err(ControlChanErrorKind::UnsupportedTransferType {
            transfer_type: transfer_type.code(),
        }
        .into());
    }
    if path.is_empty() {
        return Ok(Reply::new(ReplyCode::ParameterSyntaxError, "No file name specified"));
    }

    let target = match args.storage.search_file(&cwd, &path).await {
        Ok(Some(target)) => target,
        Ok(None) => return Ok(Reply::new(ReplyCode::FileError, "Not a valid directory.")),
        Err(err) => {
            slog::warn!(logger, "Could not look up {:?} in {:?}: {:?}", path, cwd, err);
            return Ok(storage_error_reply(&err));
        }
    };
    let operation = StorageOperation::resolve(start_pos, target.entry.as_ref());
    slog::info!(logger, "Receiving upload"; "target" => %target, "operation" => ?operation);

    args.tx_control_chan
        .send(ControlChanMsg::CommandChannelReply(Reply::new(
            ReplyCode::FileStatusOkay,
            "Opening connection for data transfer.",
        )))
        .await?;

    let mut channel = match DataChannel::open(args.data_channels.as_ref(), args.data_read_timeout, &args.cancel).await {
        Ok(channel) => channel,
        Err(_) if args.cancel.is_cancelled() => return Err(ControlChanErrorKind::TransferAborted.into()),
        Err(err) => {
            slog::warn!(logger, "Could not open data channel: {}", err);
            return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "Can't open data connection."));
        }
    };

    let outcome = transfer::execute(args.storage.as_ref(), &operation, &target, &mut channel, &args.cancel).await;
    channel.close(logger).await;

    match outcome {
        Ok(completion) => {
            if let Some(transfer) = completion {
                slog::debug!(logger, "Handing over to the background transfer queue"; "transfer-id" => transfer.transfer_id());
                args.transfer_queue.submit(transfer, trace_id);
            }
            Ok(Reply::new(ReplyCode::ClosingDataConnection, "Uploaded file successfully."))
        }
        Err(TransferError::Aborted) => {
            slog::info!(logger, "Upload of {} aborted", target);
            Err(ControlChanErrorKind::TransferAborted.into())
        }
        Err(TransferError::Storage(err)) => {
            slog::warn!(logger, "Upload of {} failed: {:?}", target, err);
            Ok(storage_error_reply(&err))
        }
    }
}

fn storage_error_reply(err: &storage::Error) -> Reply {
    match err.kind() {
        ErrorKind::TransientFileNotAvailable => Reply::new(ReplyCode::TransientFileError, "File not found"),
        ErrorKind::PermanentFileNotAvailable => Reply::new(ReplyCode::FileError, "File not found"),
        ErrorKind::PermanentDirectoryNotAvailable => Reply::new(ReplyCode::FileError, "Directory not found"),
        ErrorKind::PermissionDenied => Reply::new(ReplyCode::FileError, "Permission denied"),
        ErrorKind::ConnectionClosed => Reply::new(ReplyCode::ConnectionClosed, "Data connection closed"),
        ErrorKind::LocalError => Reply::new(ReplyCode::LocalError, "Local error"),
        ErrorKind::InsufficientStorageSpaceError => Reply::new(ReplyCode::OutOfSpace, "Insufficient storage space error"),
        ErrorKind::ExceededStorageAllocationError => Reply::new(ReplyCode::ExceededStorageAllocation, "Exceeded storage allocation error"),
        ErrorKind::FileNameNotAllowedError => Reply::new(ReplyCode::BadFileName, "File name not allowed error"),
        ErrorKind::CommandNotImplemented => Reply::new(ReplyCode::CommandNotImplemented, "Command not implemented"),
    }
}
