use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::message::Message;
use super::queue::{Enqueued, OverflowPolicy, PendingQueues};
use super::topic::{ResubscribePolicy, Topic};
use super::{Broker, IdentifyOutcome, PublishReport};
use crate::client::Client;
use crate::transport::codec::try_decode;
use crate::transport::frame::{ClientId, Frame, encode_subscribe};
use crate::transport::value::Value;

fn id(s: &str) -> ClientId {
    ClientId::try_from(s).unwrap()
}

fn connect() -> (Client, UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Client::new(tx), rx)
}

fn message(topic: &str, value: i64) -> Message {
    Message::new(
        topic,
        Value::Int(value),
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9000),
    )
}

/// Drains every frame currently in `rx` and returns the published ints.
fn received(rx: &mut UnboundedReceiver<Bytes>) -> Vec<i64> {
    let mut values = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        let mut buf = BytesMut::from(&bytes[..]);
        match try_decode(&mut buf) {
            Ok(Some(Frame::Publish(Message {
                value: Value::Int(v),
                ..
            }))) => values.push(v),
            other => panic!("unexpected frame {other:?}"),
        }
    }
    values
}

#[test]
fn test_topic_subscribe_and_unsubscribe() {
    let mut topic = Topic::new("t");
    assert!(!topic.subscribe(id("A"), false, ResubscribePolicy::Replace));
    assert!(topic.is_subscribed(&id("A")));

    assert!(topic.unsubscribe(&id("A")));
    assert!(!topic.is_subscribed(&id("A")));
    assert!(!topic.unsubscribe(&id("A")));
}

#[test]
fn test_topic_resubscribe_replace_updates_flag() {
    let mut topic = Topic::new("t");
    topic.subscribe(id("A"), false, ResubscribePolicy::Replace);
    assert!(topic.subscribe(id("A"), true, ResubscribePolicy::Replace));

    assert_eq!(topic.subscriptions.len(), 1);
    assert!(topic.subscriptions[0].store_and_forward);
}

#[test]
fn test_topic_resubscribe_duplicate_appends() {
    let mut topic = Topic::new("t");
    topic.subscribe(id("A"), false, ResubscribePolicy::Duplicate);
    assert!(!topic.subscribe(id("A"), true, ResubscribePolicy::Duplicate));
    assert_eq!(topic.subscriptions.len(), 2);

    // only the first entry goes
    topic.unsubscribe(&id("A"));
    assert_eq!(topic.subscriptions.len(), 1);
    assert!(topic.subscriptions[0].store_and_forward);
}

#[test]
fn test_queue_is_fifo() {
    let mut queues = PendingQueues::unbounded();
    for frame in [&b"1"[..], b"2", b"3"] {
        assert_eq!(
            queues.enqueue(&id("A"), Bytes::copy_from_slice(frame)),
            Enqueued::Stored
        );
    }
    let drained: Vec<_> = queues.drain(&id("A")).into_iter().collect();
    assert_eq!(drained, vec![&b"1"[..], b"2", b"3"]);
    assert!(queues.is_empty(&id("A")));
}

#[test]
fn test_queue_overflow_drop_oldest() {
    let mut queues = PendingQueues::new(2, OverflowPolicy::DropOldest);
    queues.enqueue(&id("A"), Bytes::from_static(b"1"));
    queues.enqueue(&id("A"), Bytes::from_static(b"2"));
    assert_eq!(
        queues.enqueue(&id("A"), Bytes::from_static(b"3")),
        Enqueued::DroppedOldest
    );
    let drained: Vec<_> = queues.drain(&id("A")).into_iter().collect();
    assert_eq!(drained, vec![&b"2"[..], b"3"]);
}

#[test]
fn test_queue_overflow_reject_new() {
    let mut queues = PendingQueues::new(1, OverflowPolicy::RejectNew);
    queues.enqueue(&id("A"), Bytes::from_static(b"1"));
    assert_eq!(
        queues.enqueue(&id("A"), Bytes::from_static(b"2")),
        Enqueued::Rejected
    );
    assert_eq!(queues.len(&id("A")), 1);
    assert_eq!(queues.total(), 1);
}

#[test]
fn test_queue_requeue_front_keeps_order() {
    let mut queues = PendingQueues::unbounded();
    queues.enqueue(&id("A"), Bytes::from_static(b"3"));
    queues.requeue_front(
        &id("A"),
        [Bytes::from_static(b"1"), Bytes::from_static(b"2")].into(),
    );
    let drained: Vec<_> = queues.drain(&id("A")).into_iter().collect();
    assert_eq!(drained, vec![&b"1"[..], b"2", b"3"]);
}

#[test]
fn test_identify_new_then_duplicate() {
    let mut broker = Broker::new();
    let (first, _rx1) = connect();
    let (second, mut rx2) = connect();

    assert_eq!(broker.identify(id("C1"), first.clone()), IdentifyOutcome::Accepted);
    assert_eq!(broker.identify(id("C1"), second), IdentifyOutcome::Rejected);

    // the existing binding is untouched
    assert_eq!(
        broker.registry().connection(&id("C1")).map(|c| c.id),
        Some(first.id)
    );
    assert_eq!(broker.registry().live_count(), 1);
    assert!(broker.registry().subscriber(&id("C1")).unwrap().is_live());
    assert!(rx2.try_recv().is_err());
}

#[test]
fn test_publish_fans_out_to_live_subscribers() {
    let mut broker = Broker::new();
    let (a, mut rx_a) = connect();
    let (b, mut rx_b) = connect();
    let (c, mut rx_c) = connect();
    broker.identify(id("A"), a);
    broker.identify(id("B"), b);
    broker.identify(id("C"), c);
    broker.subscribe(&id("A"), "t", false);
    broker.subscribe(&id("B"), "t", true);
    broker.subscribe(&id("C"), "other", true);

    let report = broker.publish(&message("t", 1));
    assert_eq!(
        report,
        PublishReport {
            delivered: 2,
            queued: 0,
            dropped: 0
        }
    );
    assert_eq!(received(&mut rx_a), vec![1]);
    assert_eq!(received(&mut rx_b), vec![1]);
    assert!(received(&mut rx_c).is_empty());
}

#[test]
fn test_publish_to_unknown_topic_is_noop() {
    let mut broker = Broker::new();
    let (a, mut rx_a) = connect();
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", true);

    assert_eq!(broker.publish(&message("other", 1)), PublishReport::default());
    assert!(received(&mut rx_a).is_empty());
}

#[test]
fn test_store_and_forward_replays_in_order() {
    let mut broker = Broker::new();
    let (a, _rx) = connect();
    let connection = a.id;
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", true);
    broker.disconnect(connection);

    for v in 1..=3 {
        let report = broker.publish(&message("t", v));
        assert_eq!(report.queued, 1);
    }
    assert_eq!(broker.pending().len(&id("A")), 3);

    let (back, mut rx) = connect();
    assert_eq!(
        broker.identify(id("A"), back),
        IdentifyOutcome::Reconnected { replayed: 3 }
    );
    broker.publish(&message("t", 4));

    assert_eq!(received(&mut rx), vec![1, 2, 3, 4]);
    assert!(broker.pending().is_empty(&id("A")));
}

#[test]
fn test_offline_without_store_and_forward_loses_messages() {
    let mut broker = Broker::new();
    let (a, _rx) = connect();
    let connection = a.id;
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", false);
    broker.disconnect(connection);

    let report = broker.publish(&message("t", 1));
    assert_eq!(report.dropped, 1);
    assert_eq!(broker.pending().total(), 0);

    let (back, mut rx) = connect();
    assert_eq!(
        broker.identify(id("A"), back),
        IdentifyOutcome::Reconnected { replayed: 0 }
    );
    assert!(received(&mut rx).is_empty());
}

#[test]
fn test_subscriptions_survive_reconnect() {
    let mut broker = Broker::new();
    let (a, _rx) = connect();
    let connection = a.id;
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", false);
    broker.disconnect(connection);

    let (back, mut rx) = connect();
    broker.identify(id("A"), back);
    broker.publish(&message("t", 9));
    assert_eq!(received(&mut rx), vec![9]);
}

#[test]
fn test_unsubscribe_affects_only_that_topic() {
    let mut broker = Broker::new();
    let (a, mut rx) = connect();
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t1", false);
    broker.subscribe(&id("A"), "t2", false);
    broker.unsubscribe(&id("A"), "t1");

    broker.publish(&message("t1", 1));
    broker.publish(&message("t2", 2));
    assert_eq!(received(&mut rx), vec![2]);
}

#[test]
fn test_unsubscribe_leaves_other_subscribers_on_topic() {
    let mut broker = Broker::new();
    let (a, mut rx_a) = connect();
    let (b, mut rx_b) = connect();
    broker.identify(id("A"), a);
    broker.identify(id("B"), b);
    broker.subscribe(&id("A"), "t", false);
    broker.subscribe(&id("B"), "t", true);
    broker.unsubscribe(&id("A"), "t");

    broker.publish(&message("t", 5));
    assert!(received(&mut rx_a).is_empty());
    assert_eq!(received(&mut rx_b), vec![5]);

    let topic = broker.registry().topic("t").unwrap();
    assert!(!topic.is_subscribed(&id("A")));
    assert!(topic.subscriptions[0].store_and_forward);
}

#[test]
fn test_duplicate_policy_delivers_once_per_entry() {
    let mut broker =
        Broker::with_policies(ResubscribePolicy::Duplicate, 0, OverflowPolicy::DropOldest);
    let (a, mut rx) = connect();
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", false);
    broker.subscribe(&id("A"), "t", false);

    broker.publish(&message("t", 1));
    assert_eq!(received(&mut rx), vec![1, 1]);
}

#[test]
fn test_bounded_queue_drops_oldest_on_publish() {
    let mut broker =
        Broker::with_policies(ResubscribePolicy::Replace, 2, OverflowPolicy::DropOldest);
    let (a, _rx) = connect();
    let connection = a.id;
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", true);
    broker.disconnect(connection);

    broker.publish(&message("t", 1));
    broker.publish(&message("t", 2));
    let report = broker.publish(&message("t", 3));
    assert_eq!(
        report,
        PublishReport {
            delivered: 0,
            queued: 1,
            dropped: 1
        }
    );

    let (back, mut rx) = connect();
    broker.identify(id("A"), back);
    assert_eq!(received(&mut rx), vec![2, 3]);
}

#[test]
fn test_failed_send_marks_subscriber_offline_and_queues() {
    let mut broker = Broker::new();
    let (a, rx) = connect();
    let connection = a.id;
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", true);
    drop(rx);

    let report = broker.publish(&message("t", 1));
    assert_eq!(report.delivered, 0);
    assert_eq!(report.queued, 1);
    assert!(broker.registry().connection(&id("A")).is_none());

    // the late close notification is harmless
    assert_eq!(broker.disconnect(connection), None);

    let (back, mut rx) = connect();
    assert_eq!(
        broker.identify(id("A"), back),
        IdentifyOutcome::Reconnected { replayed: 1 }
    );
    assert_eq!(received(&mut rx), vec![1]);
}

#[test]
fn test_replay_to_dead_connection_requeues_everything() {
    let mut broker = Broker::new();
    let (a, _rx) = connect();
    let connection = a.id;
    broker.identify(id("A"), a);
    broker.subscribe(&id("A"), "t", true);
    broker.disconnect(connection);
    broker.publish(&message("t", 1));
    broker.publish(&message("t", 2));

    let (dead, rx) = connect();
    drop(rx);
    assert_eq!(
        broker.identify(id("A"), dead),
        IdentifyOutcome::Reconnected { replayed: 0 }
    );
    assert!(broker.registry().connection(&id("A")).is_none());
    assert_eq!(broker.pending().len(&id("A")), 2);

    let (back, mut rx) = connect();
    broker.identify(id("A"), back);
    assert_eq!(received(&mut rx), vec![1, 2]);
}

#[test]
fn test_handle_frame_uses_bound_client() {
    let mut broker = Broker::new();
    let (a, mut rx) = connect();
    let connection = a.id;
    broker.identify(id("A"), a);

    // the frame claims another id; the binding wins
    let bytes = encode_subscribe(&id("Z"), "t", false).unwrap();
    let frame = try_decode(&mut BytesMut::from(&bytes[..])).unwrap().unwrap();
    broker.handle_frame(connection, frame);

    assert!(broker.registry().topic("t").unwrap().is_subscribed(&id("A")));
    assert!(!broker.registry().topic("t").unwrap().is_subscribed(&id("Z")));

    broker.publish(&message("t", 3));
    assert_eq!(received(&mut rx), vec![3]);
}

#[test]
fn test_disconnect_of_unidentified_connection_is_ignored() {
    let mut broker = Broker::new();
    let (stray, _rx) = connect();
    assert_eq!(broker.disconnect(stray.id), None);
}

#[test]
fn test_shutdown_closes_live_channels() {
    let mut broker = Broker::new();
    let (a, mut rx_a) = connect();
    let (b, mut rx_b) = connect();
    broker.identify(id("A"), a);
    broker.identify(id("B"), b);

    assert_eq!(broker.shutdown(), 2);
    assert_eq!(rx_a.try_recv(), Err(TryRecvError::Disconnected));
    assert_eq!(rx_b.try_recv(), Err(TryRecvError::Disconnected));
}
