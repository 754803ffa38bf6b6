use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use relaysub::broker::message::Message;
use relaysub::config::{BrokerSettings, ServerSettings};
use relaysub::transport::codec::{read_frame, write_frame};
use relaysub::transport::frame::{ClientId, Frame, encode_identify, encode_subscribe};
use relaysub::transport::server::{bind, run_server};
use relaysub::transport::value::{FixedPoint, Value, encode_datagram};
use relaysub::utils::error::ServerError;

const SYNC_TOPIC: &str = "__sync";

struct Harness {
    addr: SocketAddr,
    publisher: UdpSocket,
    stop: oneshot::Sender<()>,
    server: JoinHandle<Result<(), ServerError>>,
}

async fn start() -> Harness {
    let settings = ServerSettings {
        host: "127.0.0.1".into(),
        port: 0,
    };
    let listeners = bind(&settings).await.expect("bind");
    let addr = listeners.local_addr().expect("local addr");

    let (stop, stopped) = oneshot::channel::<()>();
    let broker = BrokerSettings {
        max_pending_per_subscriber: 0,
        overflow: Default::default(),
        resubscribe: Default::default(),
    };
    let server = tokio::spawn(async move {
        run_server(listeners, &broker, async {
            let _ = stopped.await;
        })
        .await
    });

    let publisher = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind publisher");

    Harness {
        addr,
        publisher,
        stop,
        server,
    }
}

impl Harness {
    async fn publish(&self, topic: &str, value: Value) {
        let mut datagram = BytesMut::new();
        encode_datagram(topic, &value, &mut datagram).expect("encode datagram");
        self.publisher
            .send_to(&datagram, self.addr)
            .await
            .expect("send datagram");
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.server.await.expect("join").expect("server result");
    }
}

struct Subscriber {
    id: ClientId,
    stream: TcpStream,
    buf: BytesMut,
}

impl Subscriber {
    async fn connect(addr: SocketAddr, id: &str) -> Self {
        let id = ClientId::try_from(id).expect("client id");
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        write_frame(&mut stream, &encode_identify(&id))
            .await
            .expect("identify");
        Self {
            id,
            stream,
            buf: BytesMut::new(),
        }
    }

    async fn subscribe(&mut self, topic: &str, store_and_forward: bool) {
        let frame = encode_subscribe(&self.id, topic, store_and_forward).expect("encode");
        write_frame(&mut self.stream, &frame).await.expect("subscribe");
    }

    /// Waits until the broker has applied every frame sent so far on this
    /// connection, by publishing to a private topic until one arrives.
    async fn sync(&mut self, harness: &Harness) {
        self.subscribe(SYNC_TOPIC, false).await;
        loop {
            harness.publish(SYNC_TOPIC, Value::Int(0)).await;
            match timeout(Duration::from_millis(100), self.next_frame()).await {
                Ok(Some(Message { topic, .. })) if topic == SYNC_TOPIC => return,
                Ok(Some(other)) => panic!("unexpected message before sync: {other}"),
                Ok(None) => panic!("connection closed during sync"),
                Err(_) => continue,
            }
        }
    }

    async fn next_frame(&mut self) -> Option<Message> {
        match read_frame(&mut self.stream, &mut self.buf).await.expect("read") {
            Some(Frame::Publish(message)) => Some(message),
            Some(other) => panic!("unexpected frame {other:?}"),
            None => None,
        }
    }

    /// Next message outside the sync topic.
    async fn next_message(&mut self) -> Message {
        loop {
            let next = timeout(Duration::from_secs(2), self.next_frame())
                .await
                .expect("timed out waiting for a message")
                .expect("connection closed");
            if next.topic != SYNC_TOPIC {
                return next;
            }
        }
    }

    async fn expect_closed(&mut self) {
        let closed = timeout(Duration::from_secs(2), async {
            loop {
                match read_frame(&mut self.stream, &mut self.buf).await {
                    Ok(None) | Err(_) => return,
                    Ok(Some(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "connection was not closed");
    }
}

#[tokio::test]
async fn integration_publish_fans_out_to_subscribers() {
    let harness = start().await;

    let mut a = Subscriber::connect(harness.addr, "A").await;
    let mut b = Subscriber::connect(harness.addr, "B").await;
    a.subscribe("weather", false).await;
    b.subscribe("weather", true).await;
    a.sync(&harness).await;
    b.sync(&harness).await;

    harness
        .publish("weather", Value::Float(FixedPoint::new(true, 1250, 2)))
        .await;

    for subscriber in [&mut a, &mut b] {
        let message = subscriber.next_message().await;
        assert_eq!(message.topic, "weather");
        assert_eq!(message.value.to_string(), "-12.5");
        assert_eq!(message.source.ip(), &Ipv4Addr::LOCALHOST);
        assert!(message.to_string().ends_with(" - weather - FLOAT - -12.5"));
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn integration_store_and_forward_replays_after_reconnect() {
    let harness = start().await;

    let mut a = Subscriber::connect(harness.addr, "A").await;
    a.subscribe("news", true).await;
    a.sync(&harness).await;
    drop(a);
    sleep(Duration::from_millis(300)).await;

    for text in ["first", "second", "third"] {
        harness.publish("news", Value::String(text.into())).await;
    }

    // let the datagrams land while A is away
    sleep(Duration::from_millis(300)).await;

    let mut a = Subscriber::connect(harness.addr, "A").await;
    for expected in ["first", "second", "third"] {
        let message = a.next_message().await;
        assert_eq!(message.value, Value::String(expected.into()));
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn integration_duplicate_id_is_rejected() {
    let harness = start().await;

    let mut first = Subscriber::connect(harness.addr, "C1").await;
    first.subscribe("t", false).await;
    first.sync(&harness).await;

    let mut second = Subscriber::connect(harness.addr, "C1").await;
    second.expect_closed().await;

    // the original connection keeps working
    harness.publish("t", Value::ShortReal(1705)).await;
    let message = first.next_message().await;
    assert_eq!(message.value.to_string(), "17.05");

    harness.shutdown().await;
}

#[tokio::test]
async fn integration_shutdown_closes_subscribers() {
    let harness = start().await;

    let mut a = Subscriber::connect(harness.addr, "A").await;
    a.sync(&harness).await;

    harness.shutdown().await;
    a.expect_closed().await;
}
