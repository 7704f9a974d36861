//! Per-connection handler: decode, forward, and write back.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the participant with the gateway
//!   2. Loop: decode inbound envelopes → forward to the gateway, while
//!      draining the participant's outbound queue onto the socket
//!   3. Every `ping_interval`, send a WebSocket Ping. A peer that has sent
//!      no frame at all for `ping_interval + ping_timeout` is dropped
//!   4. On close, error, or a dead peer → the guard disconnects the
//!      participant, which runs the same cleanup as an explicit leave

use std::sync::Arc;
use std::time::Duration;

use codesync_protocol::{Channel, ClientMessage, Codec, Envelope, ParticipantId, ServerMessage};
use codesync_session::{OutboundSender, outbound_channel};
use codesync_transport::{Connection, WebSocketConnection};
use tokio::time::{Instant, MissedTickBehavior};

use crate::CodesyncError;
use crate::gateway::GatewayHandle;
use crate::server::ServerState;

/// Drop guard that disconnects the participant when the handler exits.
///
/// Runs on every exit path, including early returns through `?`.
struct DisconnectGuard {
    participant: ParticipantId,
    gateway: GatewayHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.gateway.disconnect_detached(self.participant);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), CodesyncError> {
    let conn_id = conn.id();
    let participant = ParticipantId::from(conn_id);
    tracing::debug!(%conn_id, %participant, "handling new connection");

    let (out_tx, mut out_rx) = outbound_channel();
    state.gateway.connect(participant, out_tx.clone()).await?;
    let _guard = DisconnectGuard {
        participant,
        gateway: state.gateway.clone(),
    };

    let mut seq: u64 = 1;
    let start = Instant::now();

    let ping_every = state.ping_interval.max(Duration::from_millis(1));
    let dead_after = ping_every + state.ping_timeout;
    let mut liveness = tokio::time::interval_at(start + ping_every, ping_every);
    liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            inbound = conn.recv() => {
                let data = match inbound {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%participant, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%participant, error = %e, "recv error");
                        break;
                    }
                };
                handle_frame(&state, participant, &data, &out_tx, &start).await?;
            }
            Some(msg) = out_rx.recv() => {
                send_message(&conn, &state.codec, msg, next_seq(&mut seq), &start).await?;
            }
            _ = liveness.tick() => {
                let idle = conn.idle_for();
                if idle >= dead_after {
                    tracing::info!(%participant, idle_ms = idle.as_millis(), "peer stopped answering pings");
                    let _ = conn.close().await;
                    break;
                }
                if let Err(e) = conn.ping().await {
                    tracing::debug!(%participant, error = %e, "ping failed");
                    break;
                }
            }
        }
    }

    // _guard drops here → gateway disconnect fires.
    Ok(())
}

/// Decodes one inbound frame and routes it.
///
/// Heartbeats are answered here; everything else goes to the gateway.
/// Undecodable frames get a 400 error on the sender's own queue, so it
/// stays ordered with everything else the sender receives.
async fn handle_frame<C: Codec>(
    state: &ServerState<C>,
    participant: ParticipantId,
    data: &[u8],
    out_tx: &OutboundSender,
    start: &Instant,
) -> Result<(), CodesyncError> {
    let envelope: Envelope<ClientMessage> = match state.codec.decode(data) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(%participant, error = %e, "failed to decode envelope");
            let _ = out_tx.send(CodesyncError::from(e).to_message());
            return Ok(());
        }
    };

    match envelope.payload {
        ClientMessage::Heartbeat { client_time } => {
            let _ = out_tx.send(ServerMessage::HeartbeatAck {
                client_time,
                server_time: elapsed_millis(start),
            });
        }
        msg => {
            tracing::debug!(%participant, seq = envelope.seq, ?msg, "inbound message");
            state.gateway.send(participant, msg).await?;
        }
    }
    Ok(())
}

/// Wraps a server message in an envelope and writes it to the socket.
async fn send_message(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    msg: ServerMessage,
    seq: u64,
    start: &Instant,
) -> Result<(), CodesyncError> {
    let envelope = Envelope::outbound(seq, elapsed_millis(start), msg);
    let bytes = codec.encode(&envelope)?;
    match envelope.channel {
        Channel::Unreliable => conn.send_unreliable(&bytes).await?,
        Channel::ReliableOrdered | Channel::ReliableUnordered => conn.send(&bytes).await?,
    }
    Ok(())
}

fn elapsed_millis(start: &Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
