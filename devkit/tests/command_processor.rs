use lalin_devkit::{MockProvider, MockTransport};
use lalin_server::{
    protocol, ClientRegistry, CommandProcessor, Coordinates, Handled, MonitorState, MonitorTarget,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], port))
}

struct Fixture {
    transport: MockTransport,
    provider: MockProvider,
    registry: ClientRegistry,
    monitor: MonitorState,
    processor: CommandProcessor,
}

fn fixture(provider: MockProvider) -> Fixture {
    let transport = MockTransport::new();
    let registry = ClientRegistry::new();
    let monitor = MonitorState::new();
    let processor = CommandProcessor::new(
        Arc::new(transport.clone()),
        registry.clone(),
        monitor.clone(),
        Arc::new(provider.clone()),
        Duration::from_millis(200),
    );
    Fixture {
        transport,
        provider,
        registry,
        monitor,
        processor,
    }
}

#[tokio::test]
async fn test_join_registers_each_distinct_endpoint_once() {
    let f = fixture(MockProvider::new());

    for port in [1, 2, 3, 1, 2, 1] {
        f.processor.handle_datagram(b"JOIN", addr(port)).await;
    }

    assert_eq!(f.registry.len(), 3);
    for port in [1, 2, 3] {
        // welcome une seule fois, même après plusieurs JOIN
        assert_eq!(f.transport.sent_to(addr(port)), vec![protocol::WELCOME.to_string()]);
    }
}

#[tokio::test]
async fn test_join_reports_new_only_the_first_time() {
    let f = fixture(MockProvider::new());
    assert_eq!(
        f.processor.handle_datagram(b"join", addr(1)).await,
        Handled::Joined { new: true }
    );
    assert_eq!(
        f.processor.handle_datagram(b"JOIN", addr(1)).await,
        Handled::Joined { new: false }
    );
}

#[tokio::test]
async fn test_any_first_message_registers_sender() {
    let f = fixture(MockProvider::new());

    let outcome = f.processor.handle_datagram(b"hello there", addr(9)).await;
    assert_eq!(outcome, Handled::Ignored);
    assert!(f.registry.contains(&addr(9)));
    assert_eq!(f.transport.sent_to(addr(9)), vec![protocol::WELCOME.to_string()]);
}

#[tokio::test]
async fn test_malformed_datagrams_are_dropped_silently() {
    let f = fixture(MockProvider::new());

    assert_eq!(f.processor.handle_datagram(&[0xff, 0xfe], addr(1)).await, Handled::Dropped);
    assert_eq!(f.processor.handle_datagram(b"  \r\n ", addr(2)).await, Handled::Dropped);

    assert!(f.registry.is_empty());
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn test_search_success_sets_target_and_notifies_everyone() {
    let f = fixture(MockProvider::new().with_location("Jalan Kenjeran", -7.24, 112.77));
    f.processor.handle_datagram(b"JOIN", addr(1)).await;
    f.processor.handle_datagram(b"JOIN", addr(2)).await;
    f.transport.clear();

    let outcome = f
        .processor
        .handle_datagram(b"SEARCH: Jalan Kenjeran ", addr(1))
        .await;

    assert_eq!(
        outcome,
        Handled::TargetChanged {
            name: "Jalan Kenjeran".into(),
            notified: 2
        }
    );
    assert_eq!(
        f.monitor.snapshot(),
        Some(MonitorTarget::new("Jalan Kenjeran", Coordinates::new(-7.24, 112.77)))
    );
    for port in [1, 2] {
        let received = f.transport.sent_to(addr(port));
        assert_eq!(received.len(), 1);
        assert!(received[0].starts_with("[SERVER] OK:"));
        assert!(received[0].contains("'Jalan Kenjeran'"));
    }
}

#[tokio::test]
async fn test_search_failure_only_tells_the_sender() {
    let f = fixture(MockProvider::new().with_location("Jalan Darmo", -7.28, 112.73));
    f.processor.handle_datagram(b"JOIN", addr(1)).await;
    f.processor.handle_datagram(b"JOIN", addr(2)).await;
    f.processor.handle_datagram(b"SEARCH:Jalan Darmo", addr(2)).await;
    let before = f.monitor.snapshot();
    f.transport.clear();

    let outcome = f.processor.handle_datagram(b"search:Atlantis", addr(1)).await;

    assert_eq!(outcome, Handled::LookupFailed { name: "Atlantis".into() });
    assert_eq!(f.monitor.snapshot(), before);
    assert_eq!(
        f.transport.sent_to(addr(1)),
        vec![protocol::search_not_found("Atlantis")]
    );
    assert!(f.transport.sent_to(addr(2)).is_empty());
}

#[tokio::test]
async fn test_search_lookup_timeout_is_reported_to_sender() {
    let f = fixture(MockProvider::new().with_location("Jalan Kenjeran", -7.24, 112.77));
    f.provider.set_delay(Some(Duration::from_secs(5)));
    f.processor.handle_datagram(b"JOIN", addr(1)).await;
    f.transport.clear();

    let outcome = f
        .processor
        .handle_datagram(b"SEARCH:Jalan Kenjeran", addr(1))
        .await;

    assert_eq!(outcome, Handled::LookupFailed { name: "Jalan Kenjeran".into() });
    assert!(f.monitor.is_idle());
    let reply = f.transport.sent_to(addr(1));
    assert_eq!(reply.len(), 1);
    assert!(reply[0].starts_with("[SERVER] GAGAL:"));
    assert!(reply[0].contains("timed out"));
}

#[tokio::test]
async fn test_search_with_empty_text_is_ignored() {
    let f = fixture(MockProvider::new());
    f.processor.handle_datagram(b"JOIN", addr(1)).await;
    f.transport.clear();

    assert_eq!(f.processor.handle_datagram(b"SEARCH:   ", addr(1)).await, Handled::Ignored);
    assert_eq!(f.provider.lookup_count(), 0);
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn test_reset_when_idle_only_answers_requester() {
    let f = fixture(MockProvider::new());
    f.processor.handle_datagram(b"JOIN", addr(1)).await;
    f.processor.handle_datagram(b"JOIN", addr(2)).await;
    f.transport.clear();

    assert_eq!(f.processor.handle_datagram(b"RESET", addr(1)).await, Handled::AlreadyIdle);
    assert_eq!(f.transport.sent_to(addr(1)), vec![protocol::already_idle()]);
    assert!(f.transport.sent_to(addr(2)).is_empty());
}

#[tokio::test]
async fn test_reset_when_active_clears_and_broadcasts_once() {
    let f = fixture(MockProvider::new().with_location("Jalan Kenjeran", -7.24, 112.77));
    f.processor.handle_datagram(b"JOIN", addr(1)).await;
    f.processor.handle_datagram(b"JOIN", addr(2)).await;
    f.processor.handle_datagram(b"SEARCH:Jalan Kenjeran", addr(1)).await;
    f.transport.clear();

    assert_eq!(
        f.processor.handle_datagram(b"reset", addr(2)).await,
        Handled::Reset { notified: 2 }
    );
    assert!(f.monitor.is_idle());
    for port in [1, 2] {
        assert_eq!(f.transport.sent_to(addr(port)), vec![protocol::standby()]);
    }
}

#[tokio::test]
async fn test_failed_reply_evicts_sender() {
    let f = fixture(MockProvider::new());
    f.transport.fail_sends_to(addr(1));

    f.processor.handle_datagram(b"JOIN", addr(1)).await;
    assert!(!f.registry.contains(&addr(1)));
}

#[tokio::test]
async fn test_run_loop_survives_receive_errors_and_noise() {
    let f = fixture(MockProvider::new());
    let (stop, shutdown) = tokio::sync::watch::channel(false);
    let transport = f.transport.clone();
    let registry = f.registry.clone();
    let task = tokio::spawn(f.processor.run(shutdown));

    transport.inject_error(std::io::ErrorKind::ConnectionReset);
    transport.inject(vec![0xc3, 0x28], addr(1));
    transport.inject("JOIN", addr(2));

    tokio::time::timeout(Duration::from_secs(2), async {
        while !registry.contains(&addr(2)) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("JOIN after errors was not processed");
    assert!(!registry.contains(&addr(1)));

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("command loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_join_only_registers_on_join_without_welcome() {
    let transport = MockTransport::new();
    let registry = ClientRegistry::new();
    let processor = CommandProcessor::join_only(Arc::new(transport.clone()), registry.clone());

    assert_eq!(
        processor.handle_datagram(b"JOIN", addr(1)).await,
        Handled::Joined { new: true }
    );
    assert_eq!(
        processor.handle_datagram(b"JOIN", addr(1)).await,
        Handled::Joined { new: false }
    );
    assert_eq!(registry.snapshot(), vec![addr(1)]);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_join_only_ignores_steering_commands() {
    let transport = MockTransport::new();
    let registry = ClientRegistry::new();
    let processor = CommandProcessor::join_only(Arc::new(transport.clone()), registry.clone());

    let payloads: [&[u8]; 3] = [b"SEARCH:Jalan Darmo", b"RESET", b"hello"];
    for payload in payloads {
        assert_eq!(processor.handle_datagram(payload, addr(2)).await, Handled::Ignored);
    }
    assert_eq!(processor.handle_datagram(&[0xff], addr(2)).await, Handled::Dropped);
    assert!(registry.is_empty());
    assert!(transport.sent().is_empty());
}
