//! Single-task executor around the transfer queue
//!
//! All engine state lives on one tokio task. Application requests and link
//! events reach it through unbounded channels, so a completion callback that
//! sends again only posts a command; it never re-enters the queue.

use super::queue::{EngineState, TransferQueue};
use super::reassembly::Reassembler;
use super::task::{Pacing, TransferId, TransferOutcome, TransferTask};
use crate::config::{ConfigError, PacingMode, TransferConfig};
use crate::transport::abstraction::{BleLink, Characteristic, LinkEvent, PeerId};
use crate::TransferError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// A fully reassembled inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub peer: PeerId,
    pub characteristic: Characteristic,
    pub payload: Vec<u8>,
}

enum Command {
    Enqueue {
        task: TransferTask,
        ack: Option<oneshot::Sender<Result<TransferId, TransferError>>>,
    },
    Shutdown,
}

/// Cloneable handle for submitting transfers
#[derive(Clone)]
pub struct TransferHandle {
    commands: mpsc::UnboundedSender<Command>,
}

/// A transfer accepted into the queue
#[derive(Debug)]
pub struct PendingTransfer {
    id: TransferId,
    outcome: oneshot::Receiver<TransferOutcome>,
}

impl PendingTransfer {
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> Result<TransferOutcome, TransferError> {
        self.outcome.await.map_err(|_| TransferError::Shutdown)
    }
}

impl TransferHandle {
    /// Queue a transfer and wait until the engine accepted or rejected it.
    ///
    /// `Err(NotConnected)` is the immediate rejection; anything after
    /// acceptance is reported through [`PendingTransfer::wait`].
    pub async fn send(
        &self,
        payload: Vec<u8>,
        destination: PeerId,
        pacing: Option<Pacing>,
    ) -> Result<PendingTransfer, TransferError> {
        let (done_tx, done_rx) = oneshot::channel();
        let task = TransferTask::new(payload, destination, move |outcome| {
            let _ = done_tx.send(outcome);
        })
        .with_pacing(pacing);

        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(Command::Enqueue {
                task,
                ack: Some(ack_tx),
            })
            .map_err(|_| TransferError::Shutdown)?;

        let id = ack_rx.await.map_err(|_| TransferError::Shutdown)??;
        Ok(PendingTransfer {
            id,
            outcome: done_rx,
        })
    }

    /// Post a task without waiting. Safe to call from completion callbacks.
    ///
    /// Every outcome, including an immediate rejection, goes to the task's
    /// own callback. If the service is gone the callback fires with
    /// [`TransferError::Shutdown`].
    pub fn submit(&self, task: TransferTask) -> Result<(), TransferError> {
        if let Err(mpsc::error::SendError(command)) =
            self.commands.send(Command::Enqueue { task, ack: None })
        {
            if let Command::Enqueue { task, .. } = command {
                task.finish(Err(TransferError::Shutdown));
            }
            return Err(TransferError::Shutdown);
        }
        Ok(())
    }

    /// Stop the service; queued transfers fail with `Shutdown`
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Owns the queue and the reassembler; runs on one task
pub struct TransferService<L: BleLink> {
    queue: TransferQueue<L>,
    reassembler: Reassembler,
    pacing_mode: PacingMode,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    pacing_deadline: Option<Instant>,
}

impl<L: BleLink + 'static> TransferService<L> {
    /// Build a service over `link`, consuming link events from `events`.
    ///
    /// Returns the service, a handle for sending and the stream of
    /// reassembled inbound messages.
    pub fn new(
        link: L,
        config: TransferConfig,
        events: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Result<
        (
            Self,
            TransferHandle,
            mpsc::UnboundedReceiver<InboundMessage>,
        ),
        ConfigError,
    > {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let service = Self {
            queue: TransferQueue::new(link, &config),
            reassembler: Reassembler::from_config(&config),
            pacing_mode: config.pacing_mode,
            commands: command_rx,
            events,
            inbound: inbound_tx,
            pacing_deadline: None,
        };
        Ok((
            service,
            TransferHandle {
                commands: command_tx,
            },
            inbound_rx,
        ))
    }

    /// Run on a fresh tokio task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Event loop. Ends on `shutdown()` or once both the handles and the
    /// link event sender are gone.
    pub async fn run(mut self) {
        info!("Transfer service started ({:?} pacing)", self.pacing_mode);
        let mut commands_open = true;
        let mut events_open = true;

        while commands_open || events_open {
            let deadline = self.pacing_deadline;
            let wake = deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                command = self.commands.recv(), if commands_open => match command {
                    Some(Command::Enqueue { task, ack }) => {
                        let result = self.queue.enqueue(task);
                        if let Some(ack) = ack {
                            let _ = ack.send(result);
                        }
                    }
                    Some(Command::Shutdown) => break,
                    None => {
                        debug!("All transfer handles dropped");
                        commands_open = false;
                    }
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Link event channel closed");
                        events_open = false;
                    }
                },
                _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                    self.pacing_deadline = None;
                    self.queue.on_pacing_elapsed();
                }
            }
            self.schedule_pacing().await;
        }

        let mut failed = self.queue.shutdown();

        // Commands posted after the shutdown request still get an outcome
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Enqueue { task, ack } = command {
                task.finish(Err(TransferError::Shutdown));
                if let Some(ack) = ack {
                    let _ = ack.send(Err(TransferError::Shutdown));
                }
                failed += 1;
            }
        }
        info!("Transfer service stopped, {} transfer(s) abandoned", failed);
    }

    fn handle_event(&mut self, event: LinkEvent) {
        debug!("Link event: {}", event);
        match event {
            LinkEvent::ReadyForData { peer } => {
                self.queue.on_link_ready(&peer);
            }
            LinkEvent::PeerConnected { peer } => {
                info!("Peer connected: {}", peer);
            }
            LinkEvent::PeerDisconnected { peer } => {
                self.queue.on_peer_disconnected(&peer);
                self.reassembler.on_peer_disconnected(&peer);
            }
            LinkEvent::PacketReceived {
                peer,
                characteristic,
                data,
            } => {
                let reassembled = self
                    .reassembler
                    .on_packet_received(&peer, characteristic, &data);
                for e in &reassembled.dropped {
                    debug!("Reassembly dropped a message: {}", e);
                }
                for payload in reassembled.messages {
                    let message = InboundMessage {
                        peer: peer.clone(),
                        characteristic,
                        payload,
                    };
                    if self.inbound.send(message).is_err() {
                        debug!("Inbound receiver dropped, discarding message from {}", peer);
                    }
                }
            }
        }
    }

    /// Serve or arm whatever pacing delay the last step produced
    async fn schedule_pacing(&mut self) {
        match self.pacing_mode {
            PacingMode::Blocking => {
                while let Some(delay) = self.queue.take_pacing_delay() {
                    tokio::time::sleep(delay).await;
                    self.queue.on_pacing_elapsed();
                }
            }
            PacingMode::Scheduled => {
                if let Some(delay) = self.queue.take_pacing_delay() {
                    self.pacing_deadline = Some(Instant::now() + delay);
                }
            }
        }
        if !matches!(self.queue.state(), EngineState::Pacing { .. }) {
            self.pacing_deadline = None;
        }
    }
}
