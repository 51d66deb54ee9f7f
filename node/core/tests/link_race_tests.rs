//! Link race and link lifetime tests
//!
//! Run with: cargo test -p overlay-core --test link_race_tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{caller, DelayedLinker, TestLink};
use overlay_core::router::Hints;
use overlay_core::{
    EventQueue, Identity, LinkError, Network, NetworkError, Node, NodeConfig, NodeEvent, Query, RouteContext,
};

/// Node whose network runs until the returned context is cancelled
async fn running_node() -> (Arc<Node>, RouteContext, tokio::task::JoinHandle<Result<(), NetworkError>>) {
    let node = Arc::new(Node::new(NodeConfig::default()).unwrap());
    let ctx = RouteContext::new();
    let runner = {
        let node = node.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { node.run(&ctx).await })
    };
    while !node.network().is_running() {
        tokio::task::yield_now().await;
    }
    (node, ctx, runner)
}

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<NodeEvent>) -> NodeEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within deadline")
        .expect("event queue open")
}

#[tokio::test]
async fn test_first_success_wins_and_late_links_close() {
    let (node, ctx, runner) = running_node().await;
    let mut events = node.events().subscribe();
    let peer = Identity::generate();

    let fast = DelayedLinker::succeeding("fast", node.identity().clone(), Duration::from_millis(5));
    let slow = DelayedLinker::succeeding("slow", node.identity().clone(), Duration::from_millis(40));
    let broken = DelayedLinker::failing("broken", Duration::from_millis(1));
    node.network().add_linker(broken);
    node.network().add_linker(slow.clone());
    node.network().add_linker(fast.clone());

    let active = node.network().link(&RouteContext::new(), &peer).await.unwrap();
    assert_eq!(active.link().network(), "fast");
    assert_eq!(active.remote_identity(), peer);

    // the race waited for the slow linker, which closed its own link
    assert_eq!(slow.produced().len(), 1);
    assert!(slow.produced()[0].is_closed());
    assert!(!fast.produced()[0].is_closed());

    assert_eq!(node.network().links().len(), 1);
    let routes = node.router().routes();
    let link_route = routes.iter().find(|r| r.target == peer).unwrap();
    assert_eq!(link_route.priority, 50);
    assert_eq!(&link_route.caller, node.identity());

    assert!(matches!(next_event(&mut events).await, NodeEvent::LinkAdded { .. }));

    // queries from this node to the peer now go over the link
    let q = Query::new(node.identity().clone(), peer.clone(), "echo");
    let (src, _rx) = caller();
    let dst = node.route(&RouteContext::new(), &q, src, &Hints::default()).await.unwrap();
    assert_eq!(dst.identity(), Some(peer));

    ctx.cancel();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_all_linkers_fail() {
    let (node, ctx, runner) = running_node().await;
    node.network().add_linker(DelayedLinker::failing("tcp", Duration::from_millis(1)));
    node.network().add_linker(DelayedLinker::failing("tor", Duration::from_millis(3)));

    let err = node
        .network()
        .link(&RouteContext::new(), &Identity::generate())
        .await
        .unwrap_err();

    match &err {
        NetworkError::AllFailed(failures) => {
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|(_, e)| matches!(e, LinkError::Unreachable(_))));
        }
        other => panic!("expected AllFailed, got {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("tcp") && message.contains("tor"));
    assert!(node.network().links().is_empty());

    ctx.cancel();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_no_linkers_is_configuration_error() {
    let events = EventQueue::default();
    let identity = Identity::generate();
    let router = Arc::new(overlay_core::CoreRouter::new(events.clone()));
    let network = Network::new(identity, router, events);

    let res = network.link(&RouteContext::new(), &Identity::generate()).await;
    assert!(matches!(res, Err(NetworkError::NoLinkers)));
}

#[tokio::test]
async fn test_link_death_removes_route_and_reports_reason() {
    let (node, ctx, runner) = running_node().await;
    let mut events = node.events().subscribe();
    let peer = Identity::generate();

    let link = TestLink::new(node.identity().clone(), peer.clone(), "tcp");
    let active = node.network().add_link(link.clone()).unwrap();
    assert!(matches!(next_event(&mut events).await, NodeEvent::LinkAdded { .. }));
    assert_eq!(node.router().routes().len(), 2);

    link.fail(LinkError::Io("connection reset".to_string()));

    match next_event(&mut events).await {
        NodeEvent::LinkRemoved { link: gone, reason } => {
            assert_eq!(gone.id(), active.id());
            assert!(reason.unwrap().contains("connection reset"));
        }
        other => panic!("expected LinkRemoved, got {}", other.kind()),
    }
    assert!(node.network().links().is_empty());
    assert_eq!(node.router().routes().len(), 1);

    // the same link instance cannot come back twice at once
    let again = TestLink::new(node.identity().clone(), peer, "tcp");
    node.network().add_link(again.clone()).unwrap();
    assert!(matches!(
        node.network().add_link(again),
        Err(NetworkError::DuplicateLink)
    ));

    ctx.cancel();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_every_link() {
    let (node, ctx, runner) = running_node().await;
    let mut events = node.events().subscribe();

    let links: Vec<_> = (0..3)
        .map(|_| TestLink::new(node.identity().clone(), Identity::generate(), "tcp"))
        .collect();
    for link in &links {
        node.network().add_link(link.clone()).unwrap();
    }
    assert_eq!(node.network().links().len(), 3);

    ctx.cancel();
    runner.await.unwrap().unwrap();

    assert!(links.iter().all(|l| l.is_closed()));
    assert!(node.network().links().is_empty());
    assert!(!node.network().is_running());
    assert!(matches!(
        node.network().add_link(TestLink::new(node.identity().clone(), Identity::generate(), "tcp")),
        Err(NetworkError::NotRunning)
    ));

    let mut removed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, NodeEvent::LinkRemoved { .. }) {
            removed += 1;
        }
    }
    assert_eq!(removed, 3);
}
