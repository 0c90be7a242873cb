//! Single-device show flow: start, safety cutoff, persistence, hardware loss

use cardstunt::actuator::{SimulatedTorch, TorchActuator};
use cardstunt::clock::{Clock, ManualClock, SystemClock};
use cardstunt::safety::{DAILY_LIMIT_REASON, MemorySafetyStore, SafetyStore, YamlSafetyStore};
use cardstunt::sync::MemoryStore;
use cardstunt::{FlashShow, Phase, Seat, ShowConfig, ShowParts, StartOutcome, StartTime};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

// 2024-01-01T00:00:00Z
const MIDNIGHT: i64 = 1_704_067_200_000;

fn show_with(
    seat: &str,
    torch: &SimulatedTorch,
    safety_store: Arc<dyn SafetyStore>,
    clock: Arc<dyn Clock>,
) -> FlashShow {
    let parts = ShowParts {
        actuator: Arc::new(TorchActuator::probe(torch.clone())),
        safety_store,
        shared_store: Arc::new(MemoryStore::new()),
        clock,
        device_id: "device-under-test".into(),
    };
    FlashShow::new(ShowConfig::default(), Seat::parse(seat).unwrap(), parts).unwrap()
}

#[tokio::test(start_paused = true)]
async fn photosensitive_session_is_cut_off_after_thirty_seconds() {
    let _ = tracing_subscriber::fmt::try_init();

    let torch = SimulatedTorch::with_rear_flash();
    let show = show_with(
        "Section A, Row 5, Seat 12",
        &torch,
        Arc::new(MemorySafetyStore::new()),
        Arc::new(SystemClock::new()),
    );
    show.safety().set_photosensitive_mode(true);
    assert_eq!(show.start(), StartOutcome::Started);

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    assert!(show.is_running());
    assert!(show.safety().is_session_active());

    tokio::time::sleep(Duration::from_millis(11_500)).await;
    assert!(!show.safety().is_session_active());
    assert!(!show.is_running());
    assert_eq!(show.current_phase(), Phase::Stopped);
    assert_eq!(torch.last_write(), Some(false));
    assert!(show.safety().cumulative_today_ms() > 30_000);

    // The daily budget is spent too
    let state = show.safety().state();
    assert!(!state.can_flash);
    assert_eq!(
        show.start(),
        StartOutcome::Blocked { reason: DAILY_LIMIT_REASON.to_string() }
    );
}

#[tokio::test(start_paused = true)]
async fn no_writes_after_cutoff() {
    let torch = SimulatedTorch::with_rear_flash();
    let show = show_with(
        "A-1-2",
        &torch,
        Arc::new(MemorySafetyStore::new()),
        Arc::new(SystemClock::new()),
    );
    show.safety().set_photosensitive_mode(true);
    assert_eq!(show.start(), StartOutcome::Started);

    tokio::time::sleep(Duration::from_millis(32_000)).await;
    let writes = torch.writes().len();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(torch.writes().len(), writes);
}

#[tokio::test(start_paused = true)]
async fn usage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("safety.yaml");
    let torch = SimulatedTorch::with_rear_flash();

    {
        let show = show_with(
            "A-5-12",
            &torch,
            Arc::new(YamlSafetyStore::new(&path)),
            Arc::new(SystemClock::new()),
        );
        assert_eq!(show.start(), StartOutcome::Started);
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        show.stop();
    }

    let show = show_with(
        "A-5-12",
        &torch,
        Arc::new(YamlSafetyStore::new(&path)),
        Arc::new(SystemClock::new()),
    );
    assert!(show.safety().cumulative_today_ms() >= 2_000);
    assert_eq!(show.safety().remaining_ms(), 300_000 - show.safety().cumulative_today_ms());
}

#[tokio::test(start_paused = true)]
async fn hardware_loss_keeps_phases_running() {
    let torch = SimulatedTorch::with_rear_flash();
    let show = show_with(
        "B-2-4",
        &torch,
        Arc::new(MemorySafetyStore::new()),
        Arc::new(SystemClock::new()),
    );
    assert_eq!(show.start(), StartOutcome::Started);
    tokio::time::sleep(Duration::from_millis(100)).await;

    torch.fail_writes(true);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let mut flash = show.subscribe_flash();
    assert_eq!(flash.next().await, Some(false));
    assert!(show.is_running());
    assert_ne!(show.current_phase(), Phase::Stopped);

    show.stop();
    assert_eq!(show.start(), StartOutcome::Unavailable);
}

#[tokio::test(start_paused = true)]
async fn scheduled_start_waits_for_time_of_day() {
    let clock = ManualClock::new(0, MIDNIGHT + 20 * 3_600_000 - 2_000);
    let torch = SimulatedTorch::with_rear_flash();
    let show = show_with(
        "A-5-12",
        &torch,
        Arc::new(MemorySafetyStore::new()),
        Arc::new(clock.clone()),
    );
    let start = StartTime::parse("20:00:00").unwrap();

    let (outcome, ()) = tokio::join!(show.start_at(start), async {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!show.is_running());
        clock.advance(2_000);
    });

    assert_eq!(outcome, StartOutcome::Started);
    assert!(show.is_running());
    show.stop();
}

#[tokio::test(start_paused = true)]
async fn scheduled_start_uses_local_time() {
    // 18:00 UTC, 20:00 on the device
    let clock = ManualClock::new(0, MIDNIGHT + 18 * 3_600_000);
    clock.set_utc_offset(2 * 3_600);
    let torch = SimulatedTorch::with_rear_flash();
    let show = show_with(
        "A-5-12",
        &torch,
        Arc::new(MemorySafetyStore::new()),
        Arc::new(clock.clone()),
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        show.start_at(StartTime::parse("20:00:00").unwrap()),
    )
    .await;
    assert_eq!(outcome, Ok(StartOutcome::Started));
    show.stop();
}

#[tokio::test(start_paused = true)]
async fn frequency_change_restarts_running_loop() {
    let torch = SimulatedTorch::with_rear_flash();
    let show = show_with(
        "A-5-12",
        &torch,
        Arc::new(MemorySafetyStore::new()),
        Arc::new(SystemClock::new()),
    );
    assert_eq!(show.start(), StartOutcome::Started);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let before = torch.writes().len();

    show.set_frequency(10).unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    // 10Hz with half duty toggles every 50ms
    assert!(torch.writes().len() - before >= 15);
    assert!(show.safety().is_session_active());
    show.stop();
}
