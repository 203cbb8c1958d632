use lalin_devkit::{sample_reading, MockBulletin, MockProvider, MockTransport};
use lalin_server::{
    broadcast_message, protocol, BroadcastLoop, Bulletin, ClientRegistry, Coordinates,
    CycleOutcome, MonitorState, MonitorTarget,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 2], port))
}

fn kenjeran() -> MonitorTarget {
    MonitorTarget::new("Jalan Kenjeran", Coordinates::new(-7.24, 112.77))
}

struct Fixture {
    transport: MockTransport,
    provider: MockProvider,
    registry: ClientRegistry,
    monitor: MonitorState,
    broadcaster: BroadcastLoop,
}

fn fixture(interval: Duration) -> Fixture {
    let transport = MockTransport::new();
    let provider = MockProvider::new();
    let registry = ClientRegistry::new();
    let monitor = MonitorState::new();
    let broadcaster = BroadcastLoop::new(
        Arc::new(transport.clone()),
        registry.clone(),
        monitor.clone(),
        Arc::new(provider.clone()),
        interval,
        Duration::from_millis(200),
    );
    Fixture {
        transport,
        provider,
        registry,
        monitor,
        broadcaster,
    }
}

#[tokio::test]
async fn test_idle_cycle_neither_fetches_nor_sends() {
    let f = fixture(Duration::from_secs(1));
    f.registry.add(addr(1));

    assert_eq!(f.broadcaster.run_cycle().await, CycleOutcome::Idle);
    assert_eq!(f.provider.fetch_count(), 0);
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn test_active_cycle_without_subscribers_skips_fetch() {
    let f = fixture(Duration::from_secs(1));
    f.monitor.set(kenjeran());

    assert_eq!(f.broadcaster.run_cycle().await, CycleOutcome::NoSubscribers);
    assert_eq!(f.provider.fetch_count(), 0);
}

#[tokio::test]
async fn test_successful_reading_reaches_every_subscriber() {
    let f = fixture(Duration::from_secs(1));
    f.monitor.set(kenjeran());
    f.provider.set_reading(sample_reading("Jalan Kenjeran"));
    for port in [1, 2, 3] {
        f.registry.add(addr(port));
    }

    let outcome = f.broadcaster.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Broadcast {
            delivered: 3,
            evicted: 0,
            upstream_ok: true
        }
    );
    assert_eq!(f.provider.fetched_coordinates(), vec![Coordinates::new(-7.24, 112.77)]);
    for port in [1, 2, 3] {
        let received = f.transport.sent_to(addr(port));
        assert_eq!(received.len(), 1);
        assert!(received[0].starts_with("[LALU LINTAS] "));
        assert!(received[0].contains(" | Lokasi: Jalan Kenjeran | Kecepatan: 20 km/jam | "));
        assert!(received[0].ends_with("Kemacetan: 50.0% | Confidence: 0.9"));
    }
}

#[tokio::test]
async fn test_provider_failure_is_broadcast_once_and_target_kept() {
    let f = fixture(Duration::from_secs(1));
    f.monitor.set(kenjeran());
    f.provider.set_failure("HTTP 503");
    f.registry.add(addr(1));
    f.registry.add(addr(2));

    let outcome = f.broadcaster.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Broadcast {
            delivered: 2,
            evicted: 0,
            upstream_ok: false
        }
    );
    for port in [1, 2] {
        assert_eq!(
            f.transport.sent_to(addr(port)),
            vec![protocol::fetch_failure_line("HTTP 503")]
        );
    }
    assert_eq!(f.monitor.snapshot(), Some(kenjeran()));
}

#[tokio::test]
async fn test_provider_timeout_yields_failure_broadcast() {
    let f = fixture(Duration::from_secs(1));
    f.monitor.set(kenjeran());
    f.provider.set_reading(sample_reading("Jalan Kenjeran"));
    f.provider.set_delay(Some(Duration::from_secs(5)));
    f.registry.add(addr(1));

    let started = std::time::Instant::now();
    let outcome = f.broadcaster.run_cycle().await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(outcome, CycleOutcome::Broadcast { upstream_ok: false, .. }));
    let received = f.transport.sent_to(addr(1));
    assert_eq!(received.len(), 1);
    assert!(received[0].starts_with("[LALU LINTAS] Gagal ambil data: upstream timed out"));
}

#[tokio::test]
async fn test_dead_subscriber_does_not_block_others() {
    let f = fixture(Duration::from_secs(1));
    f.monitor.set(kenjeran());
    f.provider.set_reading(sample_reading("Jalan Kenjeran"));
    f.registry.add(addr(1));
    f.registry.add(addr(2));
    f.transport.fail_sends_to(addr(1));

    let outcome = f.broadcaster.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Broadcast {
            delivered: 1,
            evicted: 1,
            upstream_ok: true
        }
    );
    assert_eq!(f.transport.sent_to(addr(2)).len(), 1);
    assert!(!f.registry.contains(&addr(1)));

    // cycle suivant : A n'est plus ciblé
    f.transport.clear();
    f.broadcaster.run_cycle().await;
    assert_eq!(f.registry.snapshot(), vec![addr(2)]);
    assert_eq!(f.transport.sent().len(), 1);
}

#[tokio::test]
async fn test_broadcast_message_reports_fan_out() {
    let transport = MockTransport::new();
    let registry = ClientRegistry::new();
    registry.add(addr(1));
    registry.add(addr(2));
    transport.fail_sends_to(addr(2));

    let report = broadcast_message(&transport, &registry, "[SERVER] hello").await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.evicted, vec![addr(2)]);
    assert_eq!(registry.snapshot(), vec![addr(1)]);
}

#[tokio::test]
async fn test_cycle_sees_whole_target_during_concurrent_changes() {
    let f = fixture(Duration::from_secs(1));
    let darmo = MonitorTarget::new("Jalan Darmo", Coordinates::new(-7.28, 112.73));
    f.provider.set_reading(sample_reading("x"));
    f.registry.add(addr(1));
    f.monitor.set(kenjeran());

    let writer = {
        let monitor = f.monitor.clone();
        let darmo = darmo.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                monitor.set(if i % 2 == 0 { darmo.clone() } else { kenjeran() });
                tokio::task::yield_now().await;
            }
        })
    };
    for _ in 0..50 {
        f.broadcaster.run_cycle().await;
    }
    writer.await.unwrap();

    let allowed = [kenjeran().coordinates(), darmo.coordinates()];
    for coords in f.provider.fetched_coordinates() {
        assert!(allowed.contains(&coords), "mixed coordinates fetched: {coords:?}");
    }
}

#[tokio::test]
async fn test_run_ticks_until_shutdown() {
    let f = fixture(Duration::from_millis(50));
    f.monitor.set(kenjeran());
    f.provider.set_reading(sample_reading("Jalan Kenjeran"));
    f.registry.add(addr(1));

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(f.broadcaster.run(shutdown));

    tokio::time::sleep(Duration::from_millis(230)).await;
    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("broadcast loop did not stop")
        .unwrap();

    // premier tick immédiat puis toutes les 50ms
    let ticks = f.transport.sent_to(addr(1)).len();
    assert!((3..=6).contains(&ticks), "unexpected tick count {ticks}");
}

#[tokio::test]
async fn test_reading_is_dropped_when_reset_lands_during_fetch() {
    let f = fixture(Duration::from_secs(1));
    f.monitor.set(kenjeran());
    f.provider.set_reading(sample_reading("Jalan Kenjeran"));
    f.provider.set_delay(Some(Duration::from_millis(100)));
    f.registry.add(addr(1));

    let (outcome, _) = tokio::join!(f.broadcaster.run_cycle(), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.monitor.clear();
    });

    assert_eq!(outcome, CycleOutcome::Superseded);
    assert_eq!(f.provider.fetch_count(), 1);
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn test_reading_for_old_target_is_dropped_after_search() {
    let f = fixture(Duration::from_secs(1));
    f.monitor.set(kenjeran());
    f.provider.set_reading(sample_reading("Jalan Kenjeran"));
    f.provider.set_delay(Some(Duration::from_millis(100)));
    f.registry.add(addr(1));

    let (outcome, _) = tokio::join!(f.broadcaster.run_cycle(), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.monitor
            .set(MonitorTarget::new("Jalan Darmo", Coordinates::new(-7.28, 112.73)));
    });

    assert_eq!(outcome, CycleOutcome::Superseded);
    assert!(f.transport.sent().is_empty());

    // le cycle suivant sert la nouvelle cible
    f.provider.set_delay(None);
    assert!(matches!(
        f.broadcaster.run_cycle().await,
        CycleOutcome::Broadcast { delivered: 1, .. }
    ));
    assert_eq!(
        f.provider.fetched_coordinates().last(),
        Some(&Coordinates::new(-7.28, 112.73))
    );
}

struct WeatherFixture {
    transport: MockTransport,
    bulletin: MockBulletin,
    registry: ClientRegistry,
    broadcaster: BroadcastLoop,
}

fn weather_fixture() -> WeatherFixture {
    let transport = MockTransport::new();
    let bulletin = MockBulletin::new();
    let registry = ClientRegistry::new();
    let broadcaster = BroadcastLoop::weather(
        Arc::new(transport.clone()),
        registry.clone(),
        Arc::new(bulletin.clone()),
        Duration::from_secs(60),
        Duration::from_millis(200),
    );
    WeatherFixture {
        transport,
        bulletin,
        registry,
        broadcaster,
    }
}

#[tokio::test]
async fn test_weather_bulletin_reaches_every_subscriber() {
    let f = weather_fixture();
    f.bulletin
        .set_bulletin(Bulletin::Nowcast("Hujan sedang di Surabaya Timur".into()));
    f.registry.add(addr(1));
    f.registry.add(addr(2));

    let outcome = f.broadcaster.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Broadcast {
            delivered: 2,
            evicted: 0,
            upstream_ok: true
        }
    );
    for port in [1, 2] {
        assert_eq!(
            f.transport.sent_to(addr(port)),
            vec!["🌦️ BMKG Nowcast: Hujan sedang di Surabaya Timur".to_string()]
        );
    }
}

#[tokio::test]
async fn test_weather_failure_and_empty_registry() {
    let f = weather_fixture();
    f.bulletin.set_failure("HTTP 503");

    assert_eq!(f.broadcaster.run_cycle().await, CycleOutcome::NoSubscribers);
    assert_eq!(f.bulletin.fetch_count(), 0);

    f.registry.add(addr(1));
    let outcome = f.broadcaster.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Broadcast { upstream_ok: false, .. }));
    assert_eq!(
        f.transport.sent_to(addr(1)),
        vec![protocol::weather_failure_line("HTTP 503")]
    );
}

#[tokio::test]
async fn test_slow_bulletin_times_out() {
    let f = weather_fixture();
    f.bulletin.set_bulletin(Bulletin::Headline("Peringatan Dini Cuaca".into()));
    f.bulletin.set_delay(Some(Duration::from_secs(5)));
    f.registry.add(addr(1));

    let started = std::time::Instant::now();
    let outcome = f.broadcaster.run_cycle().await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(outcome, CycleOutcome::Broadcast { upstream_ok: false, .. }));
    let received = f.transport.sent_to(addr(1));
    assert!(received[0].starts_with("⚠️ Gagal ambil data BMKG: upstream timed out"));
}
