//! One task per accepted subscriber connection.
//!
//! The task owns the socket. It reads the IDENTIFY frame, asks the dispatcher
//! whether the id may bind, and only then starts relaying frames in both
//! directions. All broker state stays with the dispatcher; the task talks to
//! it through `SessionEvent`s on a single channel, so events from all
//! connections are applied one at a time, in arrival order.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::broker::IdentifyOutcome;
use crate::client::{Client, ConnectionId};
use crate::transport::codec::{read_frame, write_frame};
use crate::transport::frame::{ClientId, Frame, MAX_FRAME_LEN};

/// What a connection task reports to the dispatcher.
#[derive(Debug)]
pub enum SessionEvent {
    /// The first frame was IDENTIFY. The task waits on `reply` before reading
    /// anything else.
    Identify {
        client_id: ClientId,
        client: Client,
        peer: SocketAddr,
        reply: oneshot::Sender<IdentifyOutcome>,
    },
    /// A frame arrived on an identified connection.
    Frame {
        connection: ConnectionId,
        frame: Frame,
    },
    /// The identified connection is gone.
    Closed { connection: ConnectionId },
}

/// Drive one subscriber connection until it closes.
pub async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!(%peer, error = %e, "Failed to disable Nagle");
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(MAX_FRAME_LEN);

    let client_id = match read_frame(&mut reader, &mut buf).await {
        Ok(Some(Frame::Identify { client_id })) => client_id,
        Ok(Some(other)) => {
            warn!(%peer, frame_type = ?other.frame_type(), "Expected IDENTIFY; closing connection");
            return;
        }
        Ok(None) => {
            debug!(%peer, "Connection closed before IDENTIFY");
            return;
        }
        Err(e) => {
            warn!(%peer, error = %e, "Handshake failed");
            return;
        }
    };

    let (sender, mut outbound) = mpsc::unbounded_channel();
    let client = Client::new(sender);
    let connection = client.id;
    let (reply, outcome) = oneshot::channel();

    let identify = SessionEvent::Identify {
        client_id: client_id.clone(),
        client,
        peer,
        reply,
    };
    if events.send(identify).is_err() {
        return;
    }
    match outcome.await {
        Ok(outcome) if outcome.is_accepted() => {}
        // rejected, or the dispatcher is shutting down: dropping the socket closes it
        _ => return,
    }

    loop {
        tokio::select! {
            // pending output (including a reconnect replay) goes out before
            // the next inbound frame is looked at
            biased;

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        warn!(client = %client_id, error = %e, "Send failed; closing connection");
                        break;
                    }
                }
                // the broker released this connection
                None => break,
            },

            inbound = read_frame(&mut reader, &mut buf) => match inbound {
                Ok(Some(frame)) => {
                    if events.send(SessionEvent::Frame { connection, frame }).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(client = %client_id, error = %e, "Receive failed; closing connection");
                    break;
                }
            },
        }
    }

    let _ = events.send(SessionEvent::Closed { connection });
}
