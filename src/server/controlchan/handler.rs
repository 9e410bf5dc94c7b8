use crate::{
    server::{
        background::BackgroundTransferQueue,
        chancomms::ControlChanMsg,
        controlchan::{command::Command, error::ControlChanError, reply::Reply},
        datachan::DataChannelProvider,
        session::SharedSession,
    },
    storage::StorageBackend,
};
use async_trait::async_trait;
use std::{result::Result, sync::Arc, time::Duration};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub(crate) trait CommandHandler<Storage>: Send + Sync + std::fmt::Debug
where
    Storage: StorageBackend + 'static,
{
    async fn handle(&self, args: CommandContext<Storage>) -> Result<Reply, ControlChanError>;

    /// Whether `ABOR` may interrupt this command while it runs.
    fn is_abortable(&self) -> bool {
        false
    }
}

/// Convenience struct to group command args
#[derive(Debug)]
pub(crate) struct CommandContext<Storage>
where
    Storage: StorageBackend + 'static,
{
    pub parsed_command: Command,
    pub session: SharedSession,
    pub storage: Arc<Storage>,
    pub data_channels: Arc<dyn DataChannelProvider>,
    pub transfer_queue: BackgroundTransferQueue,
    pub tx_control_chan: Sender<ControlChanMsg>,
    pub data_read_timeout: Duration,
    pub cancel: CancellationToken,
    pub logger: slog::Logger,
}
