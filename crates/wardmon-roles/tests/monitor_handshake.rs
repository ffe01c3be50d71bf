//! Monitor connection handling over real TCP on loopback.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use wardmon_core::Config;
use wardmon_roles::{Command, LineCodec, Monitor, Registry};

const TESTER_CONFIG: &str = "[general]\n\
                             role = monitor\n\
                             ip = 127.0.0.1\n\
                             port = 0\n\
                             \n\
                             [gateway]\n\
                             proto = icmp\n\
                             dest = 192.168.1.1\n";

async fn start_monitor() -> (std::net::SocketAddr, Registry) {
    let config = Config::parse(TESTER_CONFIG);
    let monitor = Monitor::bind(&config).await.unwrap();
    let addr = monitor.local_addr().unwrap();
    let registry = monitor.registry();
    tokio::spawn(monitor.run());
    (addr, registry)
}

async fn connect(addr: std::net::SocketAddr) -> Framed<TcpStream, LineCodec> {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, LineCodec::new())
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn config_request_answered_with_config_minus_general() {
    let (addr, _registry) = start_monitor().await;
    let mut link = connect(addr).await;

    link.feed(Command::Name("t1".to_string()).into_line()).await.unwrap();
    link.send(Command::ConfigRequest.into_line()).await.unwrap();

    let frame = link.next().await.unwrap().unwrap();
    let config: Value = serde_json::from_str(&frame).unwrap();
    assert!(config.get("general").is_none());
    assert_eq!(config["gateway"]["proto"], "icmp");
    assert_eq!(config["gateway"]["dest"], "192.168.1.1");
}

#[tokio::test]
async fn each_config_request_gets_exactly_one_frame() {
    let (addr, _registry) = start_monitor().await;
    let mut link = connect(addr).await;

    for _ in 0..3 {
        link.send(Command::ConfigRequest.into_line()).await.unwrap();
        let frame = link.next().await.unwrap().unwrap();
        assert!(serde_json::from_str::<Value>(&frame).is_ok());
    }

    // No unrequested frames follow.
    let extra = tokio::time::timeout(Duration::from_millis(200), link.next()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn stats_update_replaces_peer_snapshot() {
    let (addr, registry) = start_monitor().await;
    let mut link = connect(addr).await;

    link.feed(Command::Name("t1".to_string()).into_line()).await.unwrap();
    link.send(Command::StatsUpdate("{\"gateway\":0.004}".to_string()).into_line())
        .await
        .unwrap();
    wait_for("first snapshot", || {
        registry.aggregated().get("t1").map(|s| s["gateway"] == 0.004) == Some(true)
    })
    .await;

    link.send(Command::StatsUpdate("{\"gateway\":-1}".to_string()).into_line())
        .await
        .unwrap();
    wait_for("replaced snapshot", || {
        registry.aggregated().get("t1").map(|s| s["gateway"] == -1) == Some(true)
    })
    .await;
}

#[tokio::test]
async fn bogus_command_keeps_connection_alive() {
    let (addr, _registry) = start_monitor().await;
    let mut link = connect(addr).await;

    link.send("BOGUS_CMD:value".to_string()).await.unwrap();
    link.send("no-colon-at-all".to_string()).await.unwrap();

    // A well-formed request afterwards is still served.
    link.send(Command::ConfigRequest.into_line()).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), link.next())
        .await
        .expect("connection stayed open")
        .unwrap()
        .unwrap();
    assert!(serde_json::from_str::<Value>(&frame).is_ok());
}

#[tokio::test]
async fn bad_stats_json_is_non_fatal() {
    let (addr, registry) = start_monitor().await;
    let mut link = connect(addr).await;

    link.feed(Command::Name("t1".to_string()).into_line()).await.unwrap();
    link.send(Command::StatsUpdate("{not json".to_string()).into_line())
        .await
        .unwrap();

    // The peer survives and a good update still lands.
    link.send(Command::StatsUpdate("{\"g\":true}".to_string()).into_line())
        .await
        .unwrap();
    wait_for("good snapshot after bad one", || {
        registry.aggregated().get("t1").map(|s| s["g"] == true) == Some(true)
    })
    .await;
}

#[tokio::test]
async fn closed_peer_is_removed() {
    let (addr, registry) = start_monitor().await;
    let link = connect(addr).await;
    wait_for("peer registered", || registry.peer_count() == 1).await;

    drop(link);
    wait_for("peer removed", || registry.peer_count() == 0).await;
}
