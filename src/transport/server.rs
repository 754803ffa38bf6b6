//! Broker dispatcher
//!
//! A single loop owns the `Broker` and multiplexes every input:
//!
//! - the TCP listener, whose connections each get a session task
//! - the UDP socket publishers send datagrams to
//! - session events from every connection task, through one channel
//! - the shutdown future (operator `exit`, Ctrl-C, or a test trigger)
//!
//! Only this loop mutates broker state, so nothing needs a lock.
//! The set of session tasks grows with every accepted connection and is
//! only trimmed as connections close; there is no connection cap.

use std::future::Future;
use std::net::{SocketAddr, SocketAddrV4};

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::broker::message::Message;
use crate::broker::{Broker, IdentifyOutcome};
use crate::config::{BrokerSettings, ServerSettings};
use crate::transport::session::{SessionEvent, run_connection};
use crate::transport::value::MAX_DATAGRAM_LEN;
use crate::utils::error::ServerError;

/// The two bound sockets the broker serves.
#[derive(Debug)]
pub struct Listeners {
    pub tcp: TcpListener,
    pub udp: UdpSocket,
}

impl Listeners {
    /// Address both sockets are bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.tcp.local_addr()?)
    }
}

/// Bind the subscriber listener and the publisher socket on one port.
///
/// With port 0 the OS picks the TCP port and UDP binds to the same one.
pub async fn bind(settings: &ServerSettings) -> Result<Listeners, ServerError> {
    let addr = settings.bind_addr();
    let tcp = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let local = tcp.local_addr()?;
    let udp = UdpSocket::bind(local)
        .await
        .map_err(|source| ServerError::Bind {
            addr: local.to_string(),
            source,
        })?;

    Ok(Listeners { tcp, udp })
}

/// Serve until `shutdown` resolves, then close every connection.
pub async fn run_server<F>(
    listeners: Listeners,
    settings: &BrokerSettings,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let Listeners { tcp, udp } = listeners;
    let mut broker = Broker::with_settings(settings);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut sessions = JoinSet::new();
    // one spare byte: an oversized datagram must fail to decode, not truncate
    let mut datagram = vec![0u8; MAX_DATAGRAM_LEN + 1];

    tokio::pin!(shutdown);
    info!(addr = %tcp.local_addr()?, "Broker listening");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }

            accepted = tcp.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Accepted connection");
                    sessions.spawn(run_connection(stream, peer, events_tx.clone()));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },

            received = udp.recv_from(&mut datagram) => match received {
                Ok((len, peer)) => ingest(&mut broker, &datagram[..len], peer),
                Err(e) => warn!(error = %e, "Failed to receive datagram"),
            },

            Some(event) = events.recv() => dispatch(&mut broker, event),

            Some(finished) = sessions.join_next() => {
                if let Err(e) = finished {
                    warn!(error = %e, "Session task failed");
                }
            }
        }
    }

    let released = broker.shutdown();
    sessions.shutdown().await;
    info!(released, "Broker stopped");
    Ok(())
}

/// Publish one datagram.
fn ingest(broker: &mut Broker, bytes: &[u8], peer: SocketAddr) {
    let Some(source) = ipv4_source(peer) else {
        warn!(%peer, "Ignoring datagram from a non-IPv4 sender");
        return;
    };

    match Message::from_datagram(bytes, source) {
        Ok(message) => {
            broker.publish(&message);
        }
        Err(e) => warn!(%peer, error = %e, "Dropping malformed datagram"),
    }
}

fn dispatch(broker: &mut Broker, event: SessionEvent) {
    match event {
        SessionEvent::Identify {
            client_id,
            client,
            peer,
            reply,
        } => {
            let outcome = broker.identify(client_id.clone(), client);
            match outcome {
                IdentifyOutcome::Accepted => {
                    info!(client = %client_id, %peer, "New client connected");
                }
                IdentifyOutcome::Reconnected { replayed } => {
                    info!(client = %client_id, %peer, replayed, "Client reconnected");
                }
                IdentifyOutcome::Rejected => {
                    info!(client = %client_id, %peer, "Client already connected");
                }
            }
            // a dropped reply means the task is gone; the broker notices on
            // its next send
            let _ = reply.send(outcome);
        }
        SessionEvent::Frame { connection, frame } => broker.handle_frame(connection, frame),
        SessionEvent::Closed { connection } => {
            if let Some(client_id) = broker.disconnect(connection) {
                info!(client = %client_id, "Client disconnected");
            }
        }
    }
}

fn ipv4_source(peer: SocketAddr) -> Option<SocketAddrV4> {
    match peer {
        SocketAddr::V4(v4) => Some(v4),
        SocketAddr::V6(v6) => v6
            .ip()
            .to_ipv4_mapped()
            .map(|ip| SocketAddrV4::new(ip, v6.port())),
    }
}
