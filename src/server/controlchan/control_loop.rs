use crate::{
    metrics,
    server::{
        background::BackgroundTransferQueue,
        chancomms::ControlChanMsg,
        controlchan::{
            codecs::{DecodedLine, FtpCodec},
            command::Command,
            commands,
            error::{ControlChanError, ControlChanErrorKind},
            handler::{CommandContext, CommandHandler},
            reply::{Reply, ReplyCode},
        },
        datachan::DataChannelProvider,
        session::{Session, SharedSession},
    },
    storage::StorageBackend,
};
use futures_util::{Sink, SinkExt, StreamExt};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, mpsc},
};
use tokio_util::{codec::Framed, sync::CancellationToken};

#[derive(Debug)]
pub(crate) struct Config<Storage>
where
    Storage: StorageBackend,
{
    pub storage: Arc<Storage>,
    pub data_channels: Arc<dyn DataChannelProvider>,
    pub transfer_queue: BackgroundTransferQueue,
    pub greeting: &'static str,
    pub idle_session_timeout: Duration,
    pub data_read_timeout: Duration,
    pub collect_metrics: bool,
    pub logger: slog::Logger,
}

// What every command handler of one session gets to work with.
struct SessionEnv<Storage>
where
    Storage: StorageBackend + 'static,
{
    session: SharedSession,
    storage: Arc<Storage>,
    data_channels: Arc<dyn DataChannelProvider>,
    transfer_queue: BackgroundTransferQueue,
    tx_control_chan: mpsc::Sender<ControlChanMsg>,
    data_read_timeout: Duration,
    logger: slog::Logger,
}

impl<Storage> SessionEnv<Storage>
where
    Storage: StorageBackend + 'static,
{
    fn context(&self, parsed_command: Command, cancel: CancellationToken) -> CommandContext<Storage> {
        CommandContext {
            parsed_command,
            session: self.session.clone(),
            storage: self.storage.clone(),
            data_channels: self.data_channels.clone(),
            transfer_queue: self.transfer_queue.clone(),
            tx_control_chan: self.tx_control_chan.clone(),
            data_read_timeout: self.data_read_timeout,
            cancel,
            logger: self.logger.clone(),
        }
    }
}

/// Runs the control channel of one client until it quits, disconnects or times out.
///
/// Commands are handled one at a time. While a command runs the loop keeps reading: an `ABOR`
/// interrupts an abortable command right away, anything else waits its turn.
#[tracing_attributes::instrument(skip(io))]
pub(crate) async fn serve<Storage, IO>(config: Config<Storage>, io: IO) -> Result<(), ControlChanError>
where
    Storage: StorageBackend + 'static,
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let Config {
        storage,
        data_channels,
        transfer_queue,
        greeting,
        idle_session_timeout,
        data_read_timeout,
        collect_metrics,
        logger,
    } = config;

    let session = Session::new();
    let trace_id = session.trace_id;
    let logger = logger.new(slog::o!("trace-id" => trace_id.to_string()));
    let (tx_control_chan, mut rx_control_chan) = mpsc::channel::<ControlChanMsg>(8);
    let env = SessionEnv {
        session: Arc::new(Mutex::new(session)),
        storage,
        data_channels,
        transfer_queue: transfer_queue.clone(),
        tx_control_chan,
        data_read_timeout,
        logger: logger.clone(),
    };

    let (mut reply_sink, mut command_source) = Framed::new(io, FtpCodec::new()).split();
    send_reply(&mut reply_sink, Reply::new(ReplyCode::ServiceReady, greeting), collect_metrics).await?;

    // Lines that came in while a command was running.
    let mut backlog: VecDeque<DecodedLine> = VecDeque::new();
    let mut client_gone = false;

    slog::info!(logger, "Starting control loop");
    let outcome = loop {
        if client_gone && backlog.is_empty() {
            slog::info!(logger, "Client closed the control connection");
            break Ok(());
        }

        let line = match backlog.pop_front() {
            Some(line) => line,
            None => {
                tokio::select! {
                    next = command_source.next() => match next {
                        Some(Ok(line)) => line,
                        Some(Err(err)) => {
                            slog::warn!(logger, "Could not read from the control connection: {}", err);
                            break Err(err);
                        }
                        None => {
                            client_gone = true;
                            continue;
                        }
                    },
                    _ = tokio::time::sleep(idle_session_timeout) => {
                        slog::info!(logger, "Control connection timed out");
                        let reply = control_channel_error_reply(&ControlChanErrorKind::ControlChannelTimeout);
                        if let Err(err) = send_reply(&mut reply_sink, reply, collect_metrics).await {
                            slog::warn!(logger, "Could not send reply to client: {}", err);
                        }
                        break Ok(());
                    }
                }
            }
        };

        let cmd = match line {
            Ok(cmd) => cmd,
            Err(parse_error) => {
                let err = ControlChanError::from(parse_error);
                slog::warn!(logger, "Control channel error: {}", err);
                send_reply(&mut reply_sink, control_channel_error_reply(err.kind()), collect_metrics).await?;
                continue;
            }
        };

        slog::debug!(logger, "Received command"; "command" => %cmd);
        if collect_metrics {
            metrics::add_command_metric(&cmd);
        }

        let handler: Box<dyn CommandHandler<Storage>> = commands::handler_for(&cmd);
        let abortable = handler.is_abortable();
        let cancel = CancellationToken::new();
        let is_stor = matches!(cmd, Command::Stor { .. });
        if abortable {
            // Registered before the handler first runs, so an ABOR pipelined right behind the
            // command still finds something to cancel.
            env.session.lock().await.data_abort = Some(cancel.clone());
        }
        let mut running = handler.handle(env.context(cmd, cancel.clone()));

        let mut abort_reply: Option<Reply> = None;
        let mut exit_requested = false;

        let result = loop {
            tokio::select! {
                biased;
                Some(msg) = rx_control_chan.recv() => match msg {
                    ControlChanMsg::CommandChannelReply(reply) => send_reply(&mut reply_sink, reply, collect_metrics).await?,
                    ControlChanMsg::ExitControlLoop => exit_requested = true,
                },
                next = command_source.next(), if !client_gone => match next {
                    Some(Ok(Ok(Command::Abor))) if abortable && abort_reply.is_none() => {
                        if collect_metrics {
                            metrics::add_command_metric(&Command::Abor);
                        }
                        let reply = commands::Abor.handle(env.context(Command::Abor, CancellationToken::new())).await?;
                        abort_reply = Some(reply);
                    }
                    Some(Ok(line)) => backlog.push_back(line),
                    Some(Err(err)) => {
                        slog::warn!(logger, "Could not read from the control connection: {}", err);
                        client_gone = true;
                        cancel.cancel();
                    }
                    None => {
                        client_gone = true;
                        cancel.cancel();
                    }
                },
                result = &mut running => break result,
            }
        };

        // Marks the handler sent right before it finished still have to go out before its reply.
        while let Ok(msg) = rx_control_chan.try_recv() {
            match msg {
                ControlChanMsg::CommandChannelReply(reply) => send_reply(&mut reply_sink, reply, collect_metrics).await?,
                ControlChanMsg::ExitControlLoop => exit_requested = true,
            }
        }

        let reply = match result {
            Ok(reply) => {
                if is_stor && collect_metrics && reply.code() == ReplyCode::ClosingDataConnection {
                    metrics::add_upload_metric();
                }
                reply
            }
            Err(err) if err.kind() == &ControlChanErrorKind::TransferAborted => {
                if collect_metrics {
                    metrics::add_aborted_transfer_metric();
                }
                control_channel_error_reply(err.kind())
            }
            Err(err) => {
                slog::error!(logger, "Closing control connection after error: {:?}", err);
                break Err(err);
            }
        };
        if !client_gone {
            send_reply(&mut reply_sink, reply, collect_metrics).await?;
            if let Some(reply) = abort_reply.take() {
                send_reply(&mut reply_sink, reply, collect_metrics).await?;
            }
        }

        if exit_requested {
            slog::info!(logger, "Quit received");
            break Ok(());
        }
    };

    let unfinished = transfer_queue.in_flight_for(trace_id);
    if unfinished > 0 {
        slog::info!(logger, "Session ended with {} background transfer(s) still running", unfinished);
    }
    outcome
}

async fn send_reply<S>(sink: &mut S, reply: Reply, collect_metrics: bool) -> Result<(), ControlChanError>
where
    S: Sink<Reply, Error = ControlChanError> + Unpin,
{
    if collect_metrics {
        metrics::add_reply_metric(&reply);
    }
    sink.send(reply).await
}

fn control_channel_error_reply(kind: &ControlChanErrorKind) -> Reply {
    match kind {
        ControlChanErrorKind::UnknownCommand { .. } => Reply::new(ReplyCode::CommandSyntaxError, "Command not implemented"),
        ControlChanErrorKind::Utf8Error => Reply::new(ReplyCode::CommandSyntaxError, "Invalid UTF8 in command"),
        ControlChanErrorKind::InvalidCommand => Reply::new(ReplyCode::ParameterSyntaxError, "Invalid Parameter"),
        ControlChanErrorKind::ControlChannelTimeout => Reply::new(ReplyCode::ServiceNotAvailable, "Session timed out. Closing control connection"),
        ControlChanErrorKind::TransferAborted => Reply::new(ReplyCode::ConnectionClosed, "Connection closed; transfer aborted."),
        _ => Reply::new(ReplyCode::LocalError, "Unknown internal server error, please try again later"),
    }
}
