//! End-to-end logger behaviour against the simulated link and in-memory or on-disk storage

use datalogger::{DataLogger, LoggerConfig, TickOutcome, MOCK_DEVICE};
use obd_protocol::{LinkDriver, MockLink, Pid};
use obd_scheduler::{LinkState, TierTable};
use std::time::Duration;
use storage::{FsStorage, MemoryStorage, StorageDriver, FLUSH_THRESHOLD};
use tempfile::TempDir;

type TestLogger = DataLogger<MockLink, MemoryStorage>;

fn config() -> LoggerConfig {
    LoggerConfig {
        device: MOCK_DEVICE.to_string(),
        ..Default::default()
    }
}

fn logger_with(link: MockLink, storage: MemoryStorage, config: &LoggerConfig) -> TestLogger {
    DataLogger::new(link, storage, config).unwrap()
}

fn logger_with_fs(dir: &TempDir) -> DataLogger<MockLink, FsStorage> {
    DataLogger::new(MockLink::new(), FsStorage::new(dir.path(), "csv"), &config()).unwrap()
}

async fn ready_logger() -> TestLogger {
    let mut logger = logger_with(MockLink::new(), MemoryStorage::new(), &config());
    logger.setup().await;
    logger
}

async fn tick_n<L: LinkDriver, D: StorageDriver>(
    logger: &mut DataLogger<L, D>,
    n: usize,
) -> Vec<TickOutcome> {
    let mut outcomes = Vec::with_capacity(n);
    for _ in 0..n {
        outcomes.push(logger.tick().await);
    }
    outcomes
}

#[tokio::test(start_paused = true)]
async fn setup_connects_and_opens_first_session() {
    let logger = ready_logger().await;

    assert_eq!(logger.connection().state(), LinkState::Connected);
    assert_eq!(logger.link().init_attempts(), 1);
    assert_eq!(logger.sink().session_index(), Some(0));
    assert_eq!(logger.capabilities().map(|c| c.len()), Some(14));
}

#[tokio::test(start_paused = true)]
async fn ticks_follow_the_tier_schedule() {
    let mut logger = ready_logger().await;
    let outcomes = tick_n(&mut logger, 15).await;

    assert!(outcomes
        .iter()
        .all(|o| matches!(o, TickOutcome::Sampled { logged: true, .. })));
    let queries = logger.link().queries();
    assert_eq!(
        &queries[..5],
        &[Pid::Rpm, Pid::Speed, Pid::EngineLoad, Pid::Throttle, Pid::TimingAdvance]
    );
    assert_eq!(queries[9], Pid::CoolantTemp);
    assert_eq!(queries[14], Pid::IntakeTemp);
    assert_eq!(logger.stats().samples_logged, 15);
}

#[tokio::test(start_paused = true)]
async fn four_failures_then_success_resets_counter() {
    let mut logger = ready_logger().await;
    logger.link_mut().fail_next_receives(4);

    let outcomes = tick_n(&mut logger, 4).await;
    for (i, outcome) in outcomes.iter().enumerate() {
        assert!(
            matches!(outcome, TickOutcome::QueryFailed { consecutive, .. } if *consecutive == i as u32 + 1),
            "tick {}: {:?}",
            i,
            outcome
        );
    }
    assert_eq!(logger.connection().error_count(), 4);

    assert!(matches!(logger.tick().await, TickOutcome::Sampled { .. }));
    assert_eq!(logger.connection().error_count(), 0);
    assert_eq!(logger.connection().state(), LinkState::Connected);
    assert_eq!(logger.stats().reconnects, 0);
    assert_eq!(logger.sink().session_index(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn fifth_failure_reconnects_into_a_new_session() {
    let mut logger = ready_logger().await;
    logger.tick().await;
    logger.link_mut().fail_next_receives(5);

    tick_n(&mut logger, 4).await;
    // The link stays down for three attempts before coming back
    logger.link_mut().script_init([false, false, false]);
    assert_eq!(logger.tick().await, TickOutcome::Reconnected { session: 1 });

    assert_eq!(logger.connection().state(), LinkState::Connected);
    assert_eq!(logger.connection().error_count(), 0);
    assert_eq!(logger.link().init_attempts(), 1 + 4);
    assert_eq!(logger.stats().reconnects, 1);

    let storage = logger.sink().driver();
    assert_eq!(storage.session_indices(), vec![0, 1]);
    let first = storage.session(0).unwrap();
    assert!(first.closed);
    assert!(!first.flushed.is_empty());
    assert_eq!(logger.sink().session_index(), Some(1));

    assert!(matches!(logger.tick().await, TickOutcome::Sampled { logged: true, .. }));
}

#[tokio::test(start_paused = true)]
async fn storage_outage_does_not_stop_polling() {
    let mut storage = MemoryStorage::new();
    storage.set_medium_present(false);
    let mut logger = logger_with(MockLink::new(), storage, &config());
    logger.setup().await;

    assert!(!logger.sink().is_ready());
    let outcomes = tick_n(&mut logger, 10).await;
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, TickOutcome::Sampled { logged: false, .. })));
    assert_eq!(logger.link().queries().len(), 10);
    assert!(logger.sink().driver().session_indices().is_empty());

    // Medium comes back, but the next probe waits for the reprobe interval
    logger.sink_mut().driver_mut().set_medium_present(true);
    assert!(matches!(logger.tick().await, TickOutcome::Sampled { logged: false, .. }));

    tokio::time::advance(Duration::from_millis(10_000)).await;
    assert!(matches!(logger.tick().await, TickOutcome::Sampled { logged: true, .. }));
    assert_eq!(logger.sink().session_index(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn write_failure_mid_session_recovers_after_reprobe() {
    let mut logger = ready_logger().await;
    tick_n(&mut logger, 3).await;

    logger.sink_mut().driver_mut().set_writes_fail(true);
    assert!(matches!(logger.tick().await, TickOutcome::Sampled { logged: false, .. }));
    assert_eq!(logger.stats().storage_errors, 1);
    assert!(!logger.sink().has_session());

    logger.sink_mut().driver_mut().set_writes_fail(false);
    tokio::time::advance(Duration::from_millis(10_000)).await;
    assert!(matches!(logger.tick().await, TickOutcome::Sampled { logged: true, .. }));
    assert_eq!(logger.connection().state(), LinkState::Connected);
}

#[tokio::test(start_paused = true)]
async fn storage_recovery_appends_to_the_interrupted_session() {
    let mut logger = ready_logger().await;
    tick_n(&mut logger, 200).await;
    let before = logger.sink().driver().session(0).unwrap().flushed.clone();
    assert!(before.len() >= FLUSH_THRESHOLD);

    logger.sink_mut().driver_mut().set_writes_fail(true);
    logger.tick().await;
    logger.sink_mut().driver_mut().set_writes_fail(false);
    tokio::time::advance(Duration::from_millis(10_000)).await;
    tick_n(&mut logger, 200).await;

    assert_eq!(logger.sink().session_index(), Some(0));
    let log = logger.sink().driver().session(0).unwrap();
    assert!(log.flushed.starts_with(&before));
    assert!(log.flushed.len() > before.len());
}

#[tokio::test(start_paused = true)]
async fn restart_logs_after_the_previous_boot() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("DATA");

    let mut first_boot = logger_with_fs(&dir);
    first_boot.setup().await;
    assert_eq!(first_boot.sink().log_index(0), Some(0));
    tick_n(&mut first_boot, 300).await;
    drop(first_boot);
    let first_log = std::fs::read(data.join("DAT00000.csv")).unwrap();
    assert!(!first_log.is_empty());

    let mut second_boot = logger_with_fs(&dir);
    second_boot.setup().await;
    assert_eq!(second_boot.sink().session_index(), Some(0));
    assert_eq!(second_boot.sink().log_index(0), Some(1));
    tick_n(&mut second_boot, 300).await;
    drop(second_boot);

    assert_eq!(std::fs::read(data.join("DAT00000.csv")).unwrap(), first_log);
    assert!(!std::fs::read(data.join("DAT00001.csv")).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_paces_ticks_by_the_configured_interval() {
    let mut config = config();
    config.tick_interval_ms = 100;
    let mut logger = logger_with(MockLink::new(), MemoryStorage::new(), &config);

    let stopped = tokio::time::timeout(Duration::from_millis(1_000), logger.run()).await;
    assert!(stopped.is_err());
    let ticks = logger.stats().ticks;
    assert!((10..=11).contains(&ticks), "ticks: {}", ticks);
    assert_eq!(logger.stats().queries, ticks);
}

#[tokio::test(start_paused = true)]
async fn run_backs_off_while_the_link_is_absent() {
    let mut link = MockLink::new();
    link.set_offline(true);
    let mut logger = logger_with(link, MemoryStorage::new(), &config());

    let stopped = tokio::time::timeout(Duration::from_millis(1_000), logger.run()).await;
    assert!(stopped.is_err());
    let ticks = logger.stats().ticks;
    assert!((10..=11).contains(&ticks), "ticks: {}", ticks);
    assert!(logger.link().queries().is_empty());
    assert_eq!(logger.link().init_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn cold_boot_without_link_retries_every_ten_seconds() {
    let mut link = MockLink::new();
    link.script_init([false, false, false, false]);
    let mut logger = logger_with(link, MemoryStorage::new(), &config());
    logger.setup().await;

    assert_eq!(logger.connection().state(), LinkState::Disconnected);
    assert_eq!(logger.link().init_attempts(), 3);
    assert!(logger.capabilities().is_none());
    assert!(!logger.sink().has_session());

    assert_eq!(logger.tick().await, TickOutcome::Idle);
    tokio::time::advance(Duration::from_millis(9_999)).await;
    assert_eq!(logger.tick().await, TickOutcome::Idle);
    assert!(logger.link().queries().is_empty());

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(logger.tick().await, TickOutcome::RetryFailed);
    assert_eq!(logger.link().init_attempts(), 4);

    tokio::time::advance(Duration::from_millis(10_000)).await;
    assert_eq!(logger.tick().await, TickOutcome::Connected { session: 0 });
    assert!(logger.capabilities().is_some());
    assert_eq!(logger.sink().session_index(), Some(0));
    assert!(matches!(logger.tick().await, TickOutcome::Sampled { logged: true, .. }));
}

#[tokio::test(start_paused = true)]
async fn unsupported_tier1_pid_alone_does_not_reconnect() {
    let mut link = MockLink::new();
    link.mark_unsupported(Pid::Speed);
    let mut logger = logger_with(link, MemoryStorage::new(), &config());
    logger.setup().await;

    tick_n(&mut logger, 100).await;

    // Speed is one of every five queries, so failures never run five deep
    assert_eq!(logger.stats().query_failures, 20);
    assert_eq!(logger.stats().reconnects, 0);
    assert_eq!(logger.capabilities().unwrap().get(Pid::Speed), Some(false));
}

#[tokio::test(start_paused = true)]
async fn unsupported_pid_dominating_schedule_forces_reconnect() {
    let mut config = config();
    config.tiers = TierTable::new(vec![Pid::Speed], vec![], vec![]).unwrap();
    let mut link = MockLink::new();
    link.mark_unsupported(Pid::Speed);
    let mut logger = logger_with(link, MemoryStorage::new(), &config);
    logger.setup().await;

    let outcomes = tick_n(&mut logger, 5).await;
    assert_eq!(outcomes[4], TickOutcome::Reconnected { session: 1 });
}

#[tokio::test(start_paused = true)]
async fn write_cursor_is_flushed_on_the_crossing_tick() {
    let mut logger = ready_logger().await;
    for _ in 0..400 {
        logger.tick().await;
        tokio::time::advance(Duration::from_millis(7)).await;
        assert!(logger.sink().write_cursor() < FLUSH_THRESHOLD);
    }

    let stats = logger.sink().stats();
    let log = logger.sink().driver().session(0).unwrap();
    assert!(log.flushes > 0);
    assert_eq!(log.flushes as u64, stats.flushes);
    assert_eq!(log.buffered.len(), logger.sink().write_cursor());
}

#[tokio::test(start_paused = true)]
async fn sample_timestamps_track_the_logger_clock() {
    let mut logger = ready_logger().await;
    let mut last = 0;
    for step in 1..=10u64 {
        tokio::time::advance(Duration::from_millis(25)).await;
        match logger.tick().await {
            TickOutcome::Sampled { sample, .. } => {
                assert!(sample.timestamp_ms >= last);
                assert_eq!(sample.timestamp_ms, step * 25);
                last = sample.timestamp_ms;
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
