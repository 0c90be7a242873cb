//! In-process venue simulation
//!
//! Runs several seats against one shared in-memory store: a controller
//! device starts the sync, every seat joins and flashes, and the run ends
//! with a per-seat summary of torch writes.
//!
//! ```text
//! venue_sim [--seconds N] [--frequency HZ] [--config show.yaml] [--photosensitive]
//! ```

use anyhow::{Context, bail};
use cardstunt::actuator::{SimulatedTorch, TorchActuator};
use cardstunt::clock::{Clock, SystemClock};
use cardstunt::identity::{StaticIdentity, resolve_device_id};
use cardstunt::safety::MemorySafetyStore;
use cardstunt::scheduler::format_countdown;
use cardstunt::sync::MemoryStore;
use cardstunt::{EventDetails, FlashShow, Seat, ShowConfig, ShowParts, StartOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SEATS: &[&str] = &[
    "Section A, Row 5, Seat 12",
    "Section: A, Row: 5, Seat: 13",
    "A-5-14",
    "b 3 7",
    "C-1-1",
    "C-1-2",
];

#[derive(Debug)]
struct CliArgs {
    seconds: u64,
    frequency: Option<u32>,
    config: Option<String>,
    photosensitive: bool,
    event: String,
}

impl CliArgs {
    fn parse() -> anyhow::Result<Self> {
        let mut args = CliArgs {
            seconds: 5,
            frequency: None,
            config: None,
            photosensitive: false,
            event: "Championship Final, City Stadium".to_string(),
        };

        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--seconds" => {
                    let value = iter.next().context("--seconds needs a value")?;
                    args.seconds = value.parse().with_context(|| format!("bad --seconds '{value}'"))?;
                }
                "--frequency" => {
                    let value = iter.next().context("--frequency needs a value")?;
                    args.frequency =
                        Some(value.parse().with_context(|| format!("bad --frequency '{value}'"))?);
                }
                "--config" => args.config = Some(iter.next().context("--config needs a path")?),
                "--event" => args.event = iter.next().context("--event needs a value")?,
                "--photosensitive" => args.photosensitive = true,
                other => bail!("unknown argument '{other}'"),
            }
        }
        Ok(args)
    }
}

struct SimSeat {
    show: FlashShow,
    torch: SimulatedTorch,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = CliArgs::parse()?;
    let config = match &args.config {
        Some(path) => ShowConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => ShowConfig::default(),
    };
    let event = EventDetails::parse(&args.event);
    info!(event = %event.name, venue = %event.venue, "Starting venue simulation");

    let store = MemoryStore::new();
    let clock = SystemClock::new();

    let mut seats = Vec::with_capacity(SEATS.len());
    for (index, text) in SEATS.iter().enumerate() {
        let seat = Seat::parse(text).with_context(|| format!("seat '{text}'"))?;
        let identity = StaticIdentity(format!("device-{index}"));
        let device_id = resolve_device_id(&identity, &clock, config.remote_timeout()).await;

        let torch = SimulatedTorch::with_rear_flash();
        let parts = ShowParts {
            actuator: Arc::new(TorchActuator::probe(torch.clone())),
            safety_store: Arc::new(MemorySafetyStore::new()),
            shared_store: Arc::new(store.clone()),
            clock: Arc::new(clock.clone()),
            device_id,
        };
        let show = FlashShow::new(config.clone(), seat, parts)?;
        show.safety().set_photosensitive_mode(args.photosensitive);
        if let Some(frequency) = args.frequency {
            show.set_frequency(frequency)?;
        }
        seats.push(SimSeat { show, torch });
    }

    let Some(controller) = seats.first() else {
        bail!("no seats configured");
    };
    controller.show.sync().start_sync(&event.name, controller.show.frequency()).await;
    for seat in &seats[1..] {
        seat.show.sync().join(&event.name).await;
    }
    // Give the listeners a turn to receive the record
    tokio::time::sleep(Duration::from_millis(50)).await;

    for seat in &seats {
        let pattern = seat.show.pattern();
        let color = seat.show.seat_color().await;
        match seat.show.start() {
            StartOutcome::Started => info!(
                seat = %seat.show.seat().key(),
                color = %color,
                "{}",
                pattern.description()
            ),
            StartOutcome::Blocked { reason } => {
                warn!(seat = %seat.show.seat().key(), "Blocked: {}", reason)
            }
            StartOutcome::Unavailable => warn!(seat = %seat.show.seat().key(), "No flash"),
        }
    }

    let run = Duration::from_secs(args.seconds);
    let started = tokio::time::Instant::now();
    while started.elapsed() < run {
        let remaining = run.saturating_sub(started.elapsed());
        let participants = store.record().map(|r| r.participant_count).unwrap_or(0);
        info!(
            remaining = %format_countdown(remaining.as_millis() as u64),
            participants,
            latency_ms = controller.show.sync().sync_state().latency_ms,
            "Show running"
        );
        tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
    }

    for seat in &seats {
        seat.show.stop();
    }
    controller.show.sync().stop_sync().await;
    for seat in &seats[1..] {
        seat.show.sync().leave().await;
    }

    println!("\n=== Venue Summary ({} ms) ===", clock.monotonic_ms());
    for seat in &seats {
        let writes = seat.torch.writes();
        println!(
            "{:<10} {:<5} flashes: {:>4}  flash time today: {} ms",
            seat.show.seat().key(),
            if seat.show.seat().is_even() { "even" } else { "odd" },
            writes.iter().filter(|lit| **lit).count(),
            seat.show.safety().cumulative_today_ms()
        );
    }
    if let Some(record) = store.record() {
        println!("Final sync record: active={} participants={}", record.active, record.participant_count);
    }
    Ok(())
}
