//! The session gateway: the single task that owns all room state.
//!
//! Connection handlers never touch rooms directly. They send
//! [`GatewayCommand`]s over one channel, and the gateway applies them one
//! at a time against its [`RoomStore`] and [`SessionTable`]. That gives
//! two properties without any locks:
//!
//! - every room mutation is atomic with respect to every other, and
//! - within a room, broadcast order equals arrival order at the gateway.
//!
//! ```text
//! handler ─┐                                   ┌─▶ outbound queue ─▶ handler
//! handler ─┼─▶ GatewayCommand ─▶ SessionGateway ┼─▶ outbound queue ─▶ handler
//! reaper  ─┘   (mpsc, FIFO)      RoomStore      └─▶ ...
//!                                SessionTable
//! ```
//!
//! [`SessionGateway`] itself is synchronous, so tests can drive it
//! directly and inspect the outbound queues.

use std::sync::Arc;
use std::time::Duration;

use codesync_exec::Executor;
use codesync_protocol::{
    ClientMessage, CursorPosition, LanguageTag, ParticipantId, ProtocolError, RoomId,
    ServerMessage,
};
use codesync_room::{
    ReapDue, ReapReceiver, ReapSender, RoomConfig, RoomError, RoomStore, reap_channel,
};
use codesync_session::{OutboundSender, SessionError, SessionTable};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::CodesyncError;

/// Capacity of the gateway's command channel.
const COMMAND_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

/// Requests a connection handler can make of the gateway.
#[derive(Debug)]
pub enum GatewayCommand {
    /// Register a new connection and its outbound queue.
    Connect {
        participant: ParticipantId,
        outbound: OutboundSender,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    /// A decoded message from a connection.
    Inbound {
        participant: ParticipantId,
        msg: ClientMessage,
    },

    /// The connection is gone; run the leave flow for its room.
    Disconnect { participant: ParticipantId },

    /// Report connection and room counts.
    Stats { reply: oneshot::Sender<GatewayStats> },
}

/// Counts reported by [`GatewayHandle::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayStats {
    pub connections: usize,
    pub rooms: usize,
    pub pending_reaps: usize,
}

/// Cheap, cloneable handle for sending commands to a running gateway.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    sender: mpsc::Sender<GatewayCommand>,
}

impl GatewayHandle {
    /// Registers a connection. Returns once the gateway has accepted it,
    /// so every later [`send`](Self::send) is ordered after it.
    pub async fn connect(
        &self,
        participant: ParticipantId,
        outbound: OutboundSender,
    ) -> Result<(), CodesyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GatewayCommand::Connect {
                participant,
                outbound,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CodesyncError::GatewayClosed)?;
        reply_rx.await.map_err(|_| CodesyncError::GatewayClosed)??;
        Ok(())
    }

    /// Forwards a client message (fire-and-forget).
    pub async fn send(
        &self,
        participant: ParticipantId,
        msg: ClientMessage,
    ) -> Result<(), CodesyncError> {
        self.sender
            .send(GatewayCommand::Inbound { participant, msg })
            .await
            .map_err(|_| CodesyncError::GatewayClosed)
    }

    pub async fn disconnect(&self, participant: ParticipantId) -> Result<(), CodesyncError> {
        self.sender
            .send(GatewayCommand::Disconnect { participant })
            .await
            .map_err(|_| CodesyncError::GatewayClosed)
    }

    /// Queues a disconnect from synchronous code, such as a `Drop` impl.
    ///
    /// Falls back to a spawned send when the channel is full.
    pub fn disconnect_detached(&self, participant: ParticipantId) {
        match self
            .sender
            .try_send(GatewayCommand::Disconnect { participant })
        {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(cmd).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(%participant, "gateway closed before disconnect");
            }
        }
    }

    pub async fn stats(&self) -> Result<GatewayStats, CodesyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GatewayCommand::Stats { reply: reply_tx })
            .await
            .map_err(|_| CodesyncError::GatewayClosed)?;
        reply_rx.await.map_err(|_| CodesyncError::GatewayClosed)
    }
}

/// Starts a gateway task and returns its handle.
///
/// The task runs until every handle is dropped. `stats_interval` controls
/// how often connection and room counts are logged.
pub fn spawn_gateway<E: Executor>(
    config: RoomConfig,
    executor: E,
    stats_interval: Duration,
) -> GatewayHandle {
    let (reap_tx, reap_rx) = reap_channel();
    let gateway = SessionGateway::new(config, executor, reap_tx);
    let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    tokio::spawn(gateway.run(receiver, reap_rx, stats_interval));
    GatewayHandle { sender }
}

// ---------------------------------------------------------------------------
// SessionGateway
// ---------------------------------------------------------------------------

/// Routes client messages to the room store and fans out the results.
pub struct SessionGateway<E: Executor> {
    rooms: RoomStore,
    sessions: SessionTable,
    executor: Arc<E>,
}

impl<E: Executor> SessionGateway<E> {
    /// Creates a gateway with an empty store. Fired reaps arrive on the
    /// receiver paired with `reap_tx` and must be fed to [`reap`](Self::reap).
    pub fn new(config: RoomConfig, executor: E, reap_tx: ReapSender) -> Self {
        Self {
            rooms: RoomStore::new(config, reap_tx),
            sessions: SessionTable::new(),
            executor: Arc::new(executor),
        }
    }

    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            connections: self.sessions.len(),
            rooms: self.rooms.room_count(),
            pending_reaps: self.rooms.pending_reaps(),
        }
    }

    /// Runs the actor loop until every [`GatewayHandle`] is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<GatewayCommand>,
        mut reaps: ReapReceiver,
        stats_interval: Duration,
    ) {
        let mut stats = tokio::time::interval_at(
            tokio::time::Instant::now() + stats_interval,
            stats_interval.max(Duration::from_millis(1)),
        );
        stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("gateway started");

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.dispatch(cmd),
                    None => break,
                },
                Some(due) = reaps.recv() => {
                    self.reap(due);
                }
                _ = stats.tick() => self.log_stats(),
            }
        }

        tracing::info!("gateway stopped");
    }

    fn dispatch(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Connect {
                participant,
                outbound,
                reply,
            } => {
                let _ = reply.send(self.connect(participant, outbound));
            }
            GatewayCommand::Inbound { participant, msg } => self.handle(participant, msg),
            GatewayCommand::Disconnect { participant } => self.disconnect(participant),
            GatewayCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Registers a connection.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] for a duplicate participant.
    pub fn connect(
        &mut self,
        participant: ParticipantId,
        outbound: OutboundSender,
    ) -> Result<(), SessionError> {
        self.sessions.connect(participant, outbound)?;
        tracing::info!(%participant, connections = self.sessions.len(), "participant connected");
        Ok(())
    }

    /// Applies one client message.
    ///
    /// Rejections (empty room id, unknown room, leaving a room the
    /// connection is not in) are reported to the sender only.
    pub fn handle(&mut self, participant: ParticipantId, msg: ClientMessage) {
        if let Some(room_id) = msg.room_id() {
            if !room_id.is_valid() {
                tracing::warn!(%participant, "message with empty room id");
                self.reply_error(
                    participant,
                    ProtocolError::InvalidMessage("roomId must not be empty".into()),
                );
                return;
            }
        }

        match msg {
            ClientMessage::Join {
                room_id,
                display_id,
            } => self.on_join(participant, room_id, display_id),
            ClientMessage::BufferEdit {
                room_id,
                buffer,
                language,
            } => self.on_buffer_edit(participant, room_id, buffer, language),
            ClientMessage::LanguageChange { room_id, language } => {
                self.on_language_change(participant, room_id, language)
            }
            ClientMessage::CursorMove { room_id, position } => {
                self.on_cursor_move(participant, room_id, position)
            }
            ClientMessage::Leave { room_id } => self.on_leave(participant, room_id),
            ClientMessage::Execute { room_id } => self.on_execute(participant, room_id),
            ClientMessage::Heartbeat { .. } => {
                tracing::debug!(%participant, "heartbeat reached gateway, ignoring");
            }
        }
    }

    /// Cleans up after a closed connection, exactly like an explicit
    /// leave of its bound room.
    pub fn disconnect(&mut self, participant: ParticipantId) {
        let session = match self.sessions.disconnect(participant) {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(%participant, error = %e, "disconnect for unknown session");
                return;
            }
        };

        if let Some(room_id) = &session.room {
            self.depart(participant, room_id, session.display_name());
        }
        tracing::info!(%participant, connections = self.sessions.len(), "participant disconnected");
    }

    /// Applies a fired reap timer. Returns `true` if a room was deleted.
    pub fn reap(&mut self, due: ReapDue) -> bool {
        self.rooms.reap(due)
    }

    // -----------------------------------------------------------------------
    // Message flows
    // -----------------------------------------------------------------------

    fn on_join(&mut self, participant: ParticipantId, room_id: RoomId, display_id: Option<String>) {
        if self.sessions.get(participant).is_none() {
            tracing::debug!(%participant, "join from unknown session");
            return;
        }

        let previous_name = self.sessions.display_name(participant);
        let outcome = self.rooms.join(&room_id, participant);
        // The session was checked above, so binding cannot fail.
        let _ = self.sessions.bind(participant, room_id.clone(), display_id);
        let name = self.sessions.display_name(participant);

        if let Some(departure) = outcome.left {
            let notice = ServerMessage::MemberLeft {
                display_id: previous_name,
                member_count: departure.remaining,
            };
            let members = self.rooms.members(&departure.room_id);
            self.sessions.broadcast(&members, None, &notice);
        }

        let snapshot = outcome.snapshot;
        let member_count = snapshot.member_count;
        self.sessions.send_to(
            participant,
            ServerMessage::RoomState {
                room_id: snapshot.room_id,
                buffer: snapshot.buffer,
                language: snapshot.language,
                member_count,
            },
        );

        if !outcome.already_member {
            let notice = ServerMessage::MemberJoined {
                display_id: name.clone(),
                member_count,
            };
            let members = self.rooms.members(&room_id);
            self.sessions.broadcast(&members, Some(participant), &notice);
        }

        tracing::info!(%room_id, %participant, display_id = %name, members = member_count, "joined room");
    }

    fn on_buffer_edit(
        &mut self,
        participant: ParticipantId,
        room_id: RoomId,
        buffer: String,
        language: Option<LanguageTag>,
    ) {
        let snapshot = match self.rooms.update_buffer(&room_id, buffer, language) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.reply_error(participant, e);
                return;
            }
        };

        let notice = ServerMessage::BufferUpdated {
            buffer: snapshot.buffer,
            language,
            origin: self.sessions.display_name(participant),
        };
        let members = self.rooms.members(&room_id);
        let delivered = self
            .sessions
            .broadcast(&members, Some(participant), &notice);
        tracing::debug!(%room_id, %participant, delivered, "buffer updated");
    }

    fn on_language_change(
        &mut self,
        participant: ParticipantId,
        room_id: RoomId,
        language: LanguageTag,
    ) {
        let notice = ServerMessage::LanguageUpdated {
            language,
            origin: self.sessions.display_name(participant),
        };
        let members = self.rooms.members(&room_id);
        self.sessions
            .broadcast(&members, Some(participant), &notice);
        tracing::debug!(%room_id, %participant, %language, "language change relayed");
    }

    fn on_cursor_move(
        &mut self,
        participant: ParticipantId,
        room_id: RoomId,
        position: CursorPosition,
    ) {
        let notice = ServerMessage::CursorUpdated {
            origin: self.sessions.display_name(participant),
            position,
        };
        let members = self.rooms.members(&room_id);
        self.sessions
            .broadcast(&members, Some(participant), &notice);
    }

    fn on_leave(&mut self, participant: ParticipantId, room_id: RoomId) {
        if self.sessions.room_of(participant) != Some(&room_id) {
            tracing::debug!(%room_id, %participant, "leave for a room the connection is not in");
            self.reply_error(participant, RoomError::NotMember(room_id));
            return;
        }

        let name = self.sessions.display_name(participant);
        self.sessions.unbind(participant);
        self.depart(participant, &room_id, name);
    }

    fn on_execute(&mut self, participant: ParticipantId, room_id: RoomId) {
        let Some(snapshot) = self.rooms.snapshot(&room_id) else {
            self.reply_error(participant, RoomError::NotFound(room_id));
            return;
        };
        let Some(outbound) = self
            .sessions
            .get(participant)
            .map(|session| session.outbound.clone())
        else {
            return;
        };

        tracing::debug!(%room_id, %participant, language = %snapshot.language, "execution started");
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let result = executor.execute(snapshot.language, snapshot.buffer).await;
            // The requester may have disconnected meanwhile.
            let _ = outbound.send(result.into_message());
        });
    }

    /// Removes `participant` from `room_id` and tells the remaining members.
    fn depart(&mut self, participant: ParticipantId, room_id: &RoomId, name: String) {
        match self.rooms.leave(room_id, participant) {
            Ok(snapshot) => {
                let notice = ServerMessage::MemberLeft {
                    display_id: name,
                    member_count: snapshot.member_count,
                };
                let members = self.rooms.members(room_id);
                self.sessions.broadcast(&members, None, &notice);
                tracing::info!(%room_id, %participant, members = snapshot.member_count, "left room");
            }
            Err(e) => {
                tracing::debug!(%room_id, %participant, error = %e, "leave failed");
            }
        }
    }

    /// Reports a rejected request to the participant that sent it.
    fn reply_error(&self, participant: ParticipantId, err: impl Into<CodesyncError>) {
        self.sessions.send_to(participant, err.into().to_message());
    }

    fn log_stats(&self) {
        let stats = self.stats();
        tracing::info!(
            connections = stats.connections,
            rooms = stats.rooms,
            pending_reaps = stats.pending_reaps,
            "gateway stats"
        );
        for summary in self.rooms.summaries() {
            tracing::debug!(
                room_id = %summary.room_id,
                members = summary.member_count,
                language = %summary.language,
                age_secs = summary.age.as_secs(),
                idle_secs = summary.idle.as_secs(),
                "room"
            );
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
