//! End-to-end scenarios for the node event loop, driven over the in-memory
//! transport pair under paused virtual time.

use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rust_ndnc_common::ndn::{ForwardingEntry, KeyLocator, SignatureInfo, SignatureType};
use rust_ndnc_common::tlv::TlvElement;

use crate::registration::{NDND_ID_LEN, NDND_ID_PROBE_URI};
use crate::transport::memory_pair;

fn counting_on_data(counter: &Arc<AtomicUsize>) -> OnData {
    let counter = Arc::clone(counter);
    Box::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn counting_on_timeout(counter: &Arc<AtomicUsize>) -> OnTimeout {
    let counter = Arc::clone(counter);
    Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn probe_reply(probe: &Interest, digest: &[u8]) -> Data {
    Data::new(probe.name.clone(), Bytes::new()).with_signature(
        SignatureInfo::new(SignatureType::Sha256WithRsa)
            .with_key_locator(KeyLocator::new(digest.to_vec())),
        Bytes::new(),
    )
}

/// Runs the node's loop in the background and returns it once stopped.
fn run_loop(mut node: Node) -> (StopHandle, tokio::task::JoinHandle<Node>) {
    let stop = node.stop_handle();
    let handle = tokio::spawn(async move {
        node.process_events().await.unwrap();
        node
    });
    (stop, handle)
}

#[tokio::test(start_paused = true)]
async fn express_interest_matched_by_data() {
    let (transport, mut peer) = memory_pair();
    let mut node = Node::new(transport);

    let satisfied = Arc::new(AtomicUsize::new(0));
    let timed_out = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(None));
    let on_data: OnData = {
        let satisfied = Arc::clone(&satisfied);
        let seen = Arc::clone(&seen);
        Box::new(move |interest, data| {
            satisfied.fetch_add(1, Ordering::SeqCst);
            *seen.lock().unwrap() = Some((interest.name.clone(), data.name.clone()));
        })
    };

    node.express_interest(
        Interest::new(Name::from_uri("/a/b")).with_lifetime(1000),
        Some(on_data),
        Some(counting_on_timeout(&timed_out)),
    )
    .await
    .unwrap();

    // The Interest hits the wire immediately.
    let frame = peer.from_node.recv().await.unwrap();
    let sent = Interest::from_wire(&frame).unwrap();
    assert_eq!(sent.name, Name::from_uri("/a/b"));
    assert_eq!(sent.lifetime_ms, 1000);

    // Feed the matching Data twice: the entry fires at most once.
    let data = Data::new(Name::from_uri("/a/b/c"), Bytes::from_static(b"payload"));
    peer.to_node.send(data.to_wire().unwrap()).unwrap();
    peer.to_node.send(data.to_wire().unwrap()).unwrap();

    let (stop, handle) = run_loop(node);
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.stop();
    let node = handle.await.unwrap();

    assert_eq!(satisfied.load(Ordering::SeqCst), 1);
    assert_eq!(timed_out.load(Ordering::SeqCst), 0);
    assert_eq!(node.pending_interest_count(), 0);

    let (interest_name, data_name) = seen.lock().unwrap().take().unwrap();
    assert_eq!(interest_name, Name::from_uri("/a/b"));
    assert_eq!(data_name, Name::from_uri("/a/b/c"));
}

#[tokio::test(start_paused = true)]
async fn interest_times_out_without_data() {
    let (transport, _peer) = memory_pair();
    let mut node = Node::new(transport);

    let satisfied = Arc::new(AtomicUsize::new(0));
    let timed_out = Arc::new(AtomicUsize::new(0));
    node.express_interest(
        Interest::new(Name::from_uri("/x")).with_lifetime(150),
        Some(counting_on_data(&satisfied)),
        Some(counting_on_timeout(&timed_out)),
    )
    .await
    .unwrap();

    let (stop, handle) = run_loop(node);
    tokio::time::sleep(Duration::from_millis(250)).await;
    stop.stop();
    let node = handle.await.unwrap();

    assert_eq!(timed_out.load(Ordering::SeqCst), 1);
    assert_eq!(satisfied.load(Ordering::SeqCst), 0);
    assert_eq!(node.pending_interest_count(), 0);
    assert_eq!(node.metrics().interests_timed_out.value(), 1);
}

#[tokio::test(start_paused = true)]
async fn removed_interest_never_fires() {
    let (transport, peer) = memory_pair();
    let mut node = Node::new(transport);

    let satisfied = Arc::new(AtomicUsize::new(0));
    let timed_out = Arc::new(AtomicUsize::new(0));
    let id = node
        .express_interest(
            Interest::new(Name::from_uri("/y")).with_lifetime(1000),
            Some(counting_on_data(&satisfied)),
            Some(counting_on_timeout(&timed_out)),
        )
        .await
        .unwrap();

    node.remove_pending_interest(id);
    node.remove_pending_interest(id); // idempotent

    let data = Data::new(Name::from_uri("/y"), Bytes::new());
    peer.to_node.send(data.to_wire().unwrap()).unwrap();

    let (stop, handle) = run_loop(node);
    // Long enough to cover the would-be timeout as well.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    stop.stop();
    let node = handle.await.unwrap();

    assert_eq!(satisfied.load(Ordering::SeqCst), 0);
    assert_eq!(timed_out.load(Ordering::SeqCst), 0);
    assert_eq!(node.pending_interest_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeouts_fire_in_insertion_order() {
    let (transport, _peer) = memory_pair();
    let mut node = Node::new(transport);

    let order = Arc::new(Mutex::new(Vec::new()));
    for (uri, lifetime) in [("/t1", 150), ("/t2", 120)] {
        let order = Arc::clone(&order);
        node.express_interest(
            Interest::new(Name::from_uri(uri)).with_lifetime(lifetime),
            None,
            Some(Box::new(move |interest: &Interest| {
                order.lock().unwrap().push(interest.name.to_string());
            })),
        )
        .await
        .unwrap();
    }

    let (stop, handle) = run_loop(node);
    tokio::time::sleep(Duration::from_millis(250)).await;
    stop.stop();
    handle.await.unwrap();

    // Both deadlines fall inside the same 100 ms tick; insertion order wins
    // even though /t2 expires earlier.
    assert_eq!(*order.lock().unwrap(), vec!["/t1", "/t2"]);
}

#[tokio::test(start_paused = true)]
async fn registration_dispatches_by_longest_prefix() {
    let (transport, mut peer) = memory_pair();
    let mut node = Node::new(transport);

    let h1_names = Arc::new(Mutex::new(Vec::new()));
    let h2_names = Arc::new(Mutex::new(Vec::new()));

    let h1: OnInterest = {
        let names = Arc::clone(&h1_names);
        Box::new(move |_prefix, interest, transport, _id| {
            names.lock().unwrap().push(interest.name.to_string());
            // Reply through the transport handed to the callback.
            let reply = Data::new(interest.name.clone(), Bytes::from_static(b"ok"));
            transport.send(reply.to_wire().unwrap()).unwrap();
        })
    };
    let h2: OnInterest = {
        let names = Arc::clone(&h2_names);
        Box::new(move |_prefix, interest, _transport, _id| {
            names.lock().unwrap().push(interest.name.to_string());
        })
    };

    node.register_prefix(Name::from_uri("/a"), h1, None, ForwardingFlags::default())
        .await
        .unwrap();
    node.register_prefix(Name::from_uri("/a/b"), h2, None, ForwardingFlags::default())
        .await
        .unwrap();

    // One probe on the wire, and nothing else until its reply.
    let probe = Interest::from_wire(&peer.from_node.recv().await.unwrap()).unwrap();
    assert_eq!(probe.name.to_string(), NDND_ID_PROBE_URI);
    assert_eq!(probe.lifetime_ms, 4000);
    assert!(peer.from_node.try_recv().is_err());

    let digest = [0x7Au8; NDND_ID_LEN];
    peer.to_node
        .send(probe_reply(&probe, &digest).to_wire().unwrap())
        .unwrap();

    let (stop, handle) = run_loop(node);

    // Both queued registrations complete, in order, as selfreg Interests.
    for expected_prefix in ["/a", "/a/b"] {
        let selfreg = Interest::from_wire(&peer.from_node.recv().await.unwrap()).unwrap();
        assert_eq!(selfreg.scope, Some(1));
        assert_eq!(selfreg.name.get(0).unwrap().as_bytes().as_ref(), b"ndnx");
        assert_eq!(selfreg.name.get(1).unwrap().as_bytes().as_ref(), &digest[..]);
        assert_eq!(selfreg.name.get(2).unwrap().as_bytes().as_ref(), b"selfreg");

        let payload = Data::from_wire(selfreg.name.get(3).unwrap().as_bytes()).unwrap();
        let mut content = payload.content.clone();
        let entry = ForwardingEntry::from_tlv(&TlvElement::decode(&mut content).unwrap()).unwrap();
        assert_eq!(entry.action, "selfreg");
        assert_eq!(entry.prefix, Name::from_uri(expected_prefix));
    }

    // Longest matching prefix wins the dispatch.
    for uri in ["/a/b/c", "/a/x"] {
        let interest = Interest::new(Name::from_uri(uri)).with_nonce(1);
        peer.to_node.send(interest.to_wire().unwrap()).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.stop();
    let node = handle.await.unwrap();

    assert_eq!(*h1_names.lock().unwrap(), vec!["/a/x"]);
    assert_eq!(*h2_names.lock().unwrap(), vec!["/a/b/c"]);
    assert_eq!(node.registered_prefix_count(), 2);
    assert_eq!(node.ndnd_id().as_ref(), &digest[..]);

    // The handler's reply went out over the transport.
    let reply = Data::from_wire(&peer.from_node.recv().await.unwrap()).unwrap();
    assert_eq!(reply.name, Name::from_uri("/a/x"));
}

#[tokio::test(start_paused = true)]
async fn probe_timeout_fails_registration() {
    let (transport, mut peer) = memory_pair();
    let mut node = Node::new(transport);

    let failed = Arc::new(Mutex::new(Vec::new()));
    let on_failed: OnRegisterFailed = {
        let failed = Arc::clone(&failed);
        Box::new(move |prefix: &Name| {
            failed.lock().unwrap().push(prefix.to_string());
        })
    };

    node.register_prefix(
        Name::from_uri("/p"),
        Box::new(|_, _, _, _| {}),
        Some(on_failed),
        ForwardingFlags::default(),
    )
    .await
    .unwrap();

    let probe = Interest::from_wire(&peer.from_node.recv().await.unwrap()).unwrap();
    assert_eq!(probe.name.to_string(), NDND_ID_PROBE_URI);

    let (stop, handle) = run_loop(node);
    // Never reply; the 4 s probe lifetime elapses.
    tokio::time::sleep(Duration::from_millis(4300)).await;
    stop.stop();
    let node = handle.await.unwrap();

    assert_eq!(*failed.lock().unwrap(), vec!["/p"]);
    assert_eq!(node.registered_prefix_count(), 0);
    assert_eq!(node.pending_interest_count(), 0);
    assert!(node.ndnd_id().is_empty());
    assert_eq!(node.metrics().registrations_failed.value(), 1);
    // No selfreg Interest ever went out.
    assert!(peer.from_node.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn panicking_callback_does_not_kill_the_loop(){
    let (transport, peer) = memory_pair();
    let mut node = Node::new(transport);

    let satisfied = Arc::new(AtomicUsize::new(0));
    node.express_interest(
        Interest::new(Name::from_uri("/boom")).with_lifetime(1000),
        Some(Box::new(|_, _| panic!("handler bug"))),
        None,
    )
    .await
    .unwrap();
    node.express_interest(
        Interest::new(Name::from_uri("/fine")).with_lifetime(1000),
        Some(counting_on_data(&satisfied)),
        None,
    )
    .await
    .unwrap();

    peer.to_node
        .send(Data::new(Name::from_uri("/boom"), Bytes::new()).to_wire().unwrap())
        .unwrap();
    // Junk and undecodable frames are dropped without stopping the loop.
    peer.to_node.send(Bytes::from_static(&[0xFF, 0x00])).unwrap();
    peer.to_node.send(Bytes::from_static(&[0x05, 0x03, 0x01])).unwrap();
    peer.to_node
        .send(Data::new(Name::from_uri("/fine"), Bytes::new()).to_wire().unwrap())
        .unwrap();

    let (stop, handle) = run_loop(node);
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.stop();
    let node = handle.await.unwrap();

    assert_eq!(satisfied.load(Ordering::SeqCst), 1);
    assert_eq!(node.pending_interest_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn data_callback_can_reexpress_through_handle() {
    let (transport, mut peer) = memory_pair();
    let mut node = Node::new(transport);
    let handle = node.handle();

    let second = Arc::new(AtomicUsize::new(0));
    let on_first: OnData = {
        let second = Arc::clone(&second);
        Box::new(move |interest, _data| {
            // Re-express the same name from inside the Data callback; the
            // posted Interest lands in the table after this dispatch.
            let counter = Arc::clone(&second);
            handle
                .express_interest(
                    Interest::new(interest.name.clone()).with_lifetime(1000),
                    Some(Box::new(move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })),
                    None,
                )
                .unwrap();
        })
    };

    node.express_interest(
        Interest::new(Name::from_uri("/r")).with_lifetime(1000),
        Some(on_first),
        None,
    )
    .await
    .unwrap();
    peer.to_node
        .send(Data::new(Name::from_uri("/r"), Bytes::new()).to_wire().unwrap())
        .unwrap();

    let (stop, task) = run_loop(node);

    // First outbound frame is the original Interest, second the
    // re-expression posted from the callback.
    let first = Interest::from_wire(&peer.from_node.recv().await.unwrap()).unwrap();
    assert_eq!(first.name, Name::from_uri("/r"));
    let reexpressed = Interest::from_wire(&peer.from_node.recv().await.unwrap()).unwrap();
    assert_eq!(reexpressed.name, Name::from_uri("/r"));

    peer.to_node
        .send(Data::new(Name::from_uri("/r"), Bytes::new()).to_wire().unwrap())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.stop();
    let node = task.await.unwrap();

    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(node.pending_interest_count(), 0);
    assert_eq!(node.metrics().interests_satisfied.value(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_pending_interests() {
    let (transport, _peer) = memory_pair();
    let mut node = Node::new(transport);

    let satisfied = Arc::new(AtomicUsize::new(0));
    let timed_out = Arc::new(AtomicUsize::new(0));
    node.express_interest(
        Interest::new(Name::from_uri("/pending")).with_lifetime(100),
        Some(counting_on_data(&satisfied)),
        Some(counting_on_timeout(&timed_out)),
    )
    .await
    .unwrap();

    node.shutdown().await;
    // The stored stop permit makes the loop return immediately.
    node.process_events().await.unwrap();

    assert_eq!(satisfied.load(Ordering::SeqCst), 0);
    assert_eq!(timed_out.load(Ordering::SeqCst), 0);
    assert_eq!(node.pending_interest_count(), 1);

    // The closed transport rejects further expressions, leaving no entry.
    let err = node
        .express_interest(Interest::new(Name::from_uri("/late")), None, None)
        .await;
    assert!(matches!(err, Err(Error::Transport(_))));
    assert_eq!(node.pending_interest_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_send_leaves_no_state() {
    let (transport, peer) = memory_pair();
    drop(peer); // sends will fail
    let mut node = Node::new(transport);

    let err = node
        .register_prefix(
            Name::from_uri("/p"),
            Box::new(|_, _, _, _| {}),
            None,
            ForwardingFlags::default(),
        )
        .await;

    assert!(matches!(err, Err(Error::Transport(_))));
    assert_eq!(node.pending_interest_count(), 0);
    assert_eq!(node.registered_prefix_count(), 0);
    assert!(!node.registration.is_probing());
}

#[tokio::test(start_paused = true)]
async fn process_events_rejects_reentry() {
    let (transport, _peer) = memory_pair();
    let mut node = Node::new(transport);
    node.running = true;
    assert!(matches!(
        node.process_events().await,
        Err(Error::AlreadyRunning)
    ));
}
