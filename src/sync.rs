// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::SyncError;
use crate::feed::{Track, TrackSource};
use crate::playlist::PlaylistApi;
use crate::reconcile::{ReconcilePolicy, SyncResult, reconcile};

/// Settings for the recurring synchronization service
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub station: String,
    pub playlist_id: String,
    pub interval: Duration,
    pub max_tracks: usize,
    pub enabled: bool,
    pub policy: ReconcilePolicy,
}

/// Snapshot of the orchestrator's state, safe to read during a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub is_running: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_result: Option<SyncResult>,
    pub next_sync: Option<DateTime<Utc>>,
    pub total_syncs: u64,
}

/// Outcome of a sync request
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Completed(SyncResult),
    /// Another run was already in flight; nothing was touched
    Busy,
}

struct TimerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the recurring sync schedule and the single-flight guard.
///
/// Scheduled fires and on-demand requests funnel through the same atomic
/// check-and-set; a run already in flight makes either return `Busy`.
pub struct SyncService<S, P> {
    source: S,
    target: P,
    config: SyncConfig,
    running: AtomicBool,
    status: Mutex<SyncStatus>,
    timer: Mutex<Option<TimerHandle>>,
}

impl<S, P> SyncService<S, P>
where
    S: TrackSource + Send + Sync + 'static,
    P: PlaylistApi + Send + Sync + 'static,
{
    pub fn new(source: S, target: P, config: SyncConfig) -> Self {
        Self {
            source,
            target,
            config,
            running: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::default()),
            timer: Mutex::new(None),
        }
    }

    /// Authenticates eagerly, arms the recurring timer, and performs one
    /// immediate run. No-op when sync is disabled in the configuration.
    pub async fn start(self: &Arc<Self>) -> Result<(), SyncError> {
        if !self.config.enabled {
            info!("sync service disabled");
            return Ok(());
        }

        // Fail fast on bad credentials before arming the timer
        self.target.authenticate().await?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let service = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // The first tick fires immediately and doubles as
                        // the initial run
                        if let SyncOutcome::Busy = service.sync_once().await {
                            info!("scheduled sync skipped, previous run still in flight");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        *self.timer.lock().unwrap() = Some(TimerHandle {
            shutdown: shutdown_tx,
            task,
        });
        info!(
            interval_secs = self.config.interval.as_secs(),
            station = %self.config.station,
            "sync service started"
        );
        Ok(())
    }

    /// Disarms the recurring timer. An in-flight run is left to finish.
    pub async fn stop(&self) {
        let timer = self.timer.lock().unwrap().take();
        if let Some(timer) = timer {
            let _ = timer.shutdown.send(true);
            let _ = timer.task.await;
            info!("sync service stopped");
        }
    }

    /// Runs one full reconciliation cycle unless a run is already in
    /// flight. Failures are captured in the result, never propagated.
    pub async fn sync_once(&self) -> SyncOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return SyncOutcome::Busy;
        }

        let result = match self.run().await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "sync run failed");
                SyncResult::failed(e.to_string())
            }
        };

        self.record(result.clone());
        self.running.store(false, Ordering::SeqCst);
        SyncOutcome::Completed(result)
    }

    async fn run(&self) -> Result<SyncResult, SyncError> {
        let tracks = self
            .source
            .get_recent_tracks(&self.config.station, self.config.max_tracks)
            .await?;
        reconcile(
            &self.target,
            &self.config.playlist_id,
            &tracks,
            self.config.policy,
        )
        .await
    }

    fn record(&self, result: SyncResult) {
        let mut status = self.status.lock().unwrap();
        let now = Utc::now();
        status.last_sync = Some(now);
        status.next_sync = Some(now + chrono::Duration::seconds(self.config.interval.as_secs() as i64));
        status.total_syncs += 1;
        status.last_result = Some(result);
    }

    /// Read-only snapshot, safe to call concurrently with a run
    pub fn status(&self) -> SyncStatus {
        let mut snapshot = self.status.lock().unwrap().clone();
        snapshot.is_running = self.is_running();
        snapshot
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pass-through read of the station feed
    pub async fn recent_tracks(
        &self,
        station: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Track>, crate::error::FeedError> {
        let station = station.unwrap_or(&self.config.station);
        self.source.get_recent_tracks(station, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::error::{AuthError, FeedError};

    struct StubSource {
        tracks: Vec<Track>,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    impl StubSource {
        fn with_tracks(tracks: Vec<Track>) -> Self {
            Self {
                tracks,
                gate: None,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl TrackSource for StubSource {
        async fn get_recent_tracks(
            &self,
            _station: &str,
            limit: usize,
        ) -> Result<Vec<Track>, FeedError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(FeedError::BadStatus { status: 503 });
            }
            Ok(self.tracks.iter().take(limit).cloned().collect())
        }
    }

    /// Playlist stub resolving every search to `resolved-<title>`
    #[derive(Default)]
    struct StubTarget {
        auth_calls: Arc<AtomicUsize>,
        api_calls: Arc<AtomicUsize>,
        reject_auth: bool,
    }

    #[async_trait]
    impl PlaylistApi for StubTarget {
        async fn authenticate(&self) -> Result<(), SyncError> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_auth {
                return Err(AuthError::MissingRefreshToken.into());
            }
            Ok(())
        }

        async fn list_items(&self, _playlist_id: &str) -> Result<Vec<String>, SyncError> {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn search(&self, title: &str, _artist: &str) -> Result<Option<String>, SyncError> {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("resolved-{title}")))
        }

        async fn add_items(&self, _playlist_id: &str, _ids: &[String]) -> Result<(), SyncError> {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove_items(&self, _playlist_id: &str, _ids: &[String]) -> Result<(), SyncError> {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(enabled: bool) -> SyncConfig {
        SyncConfig {
            station: "teststation".into(),
            playlist_id: "pl1".into(),
            interval: Duration::from_secs(3600),
            max_tracks: 50,
            enabled,
            policy: ReconcilePolicy::Additive,
        }
    }

    fn track(title: &str) -> Track {
        Track {
            title: title.into(),
            artists: vec!["Artist".into()],
            timestamp: None,
            source_id: None,
            album: None,
        }
    }

    #[tokio::test]
    async fn sync_once_records_status() {
        let service = SyncService::new(
            StubSource::with_tracks(vec![track("Gravity")]),
            StubTarget::default(),
            config(true),
        );

        let outcome = service.sync_once().await;

        let result = match outcome {
            SyncOutcome::Completed(result) => result,
            SyncOutcome::Busy => panic!("unexpected busy"),
        };
        assert!(result.success);
        assert_eq!(result.tracks_added, 1);

        let status = service.status();
        assert!(!status.is_running);
        assert_eq!(status.total_syncs, 1);
        assert!(status.last_sync.is_some());
        assert!(status.next_sync.is_some());
        assert!(status.last_result.unwrap().success);
    }

    #[tokio::test]
    async fn run_failure_is_captured_in_result() {
        let service = SyncService::new(
            StubSource {
                tracks: vec![],
                gate: None,
                fail: true,
            },
            StubTarget::default(),
            config(true),
        );

        let outcome = service.sync_once().await;

        let result = match outcome {
            SyncOutcome::Completed(result) => result,
            SyncOutcome::Busy => panic!("unexpected busy"),
        };
        assert!(!result.success);
        assert!(result.error.unwrap().contains("503"));

        // The failed run still advanced the status counters
        let status = service.status();
        assert_eq!(status.total_syncs, 1);
        assert!(!status.is_running);
    }

    #[tokio::test]
    async fn concurrent_requests_are_single_flight() {
        let gate = Arc::new(Notify::new());
        let api_calls = Arc::new(AtomicUsize::new(0));

        let service = Arc::new(SyncService::new(
            StubSource {
                tracks: vec![track("Gravity")],
                gate: Some(gate.clone()),
                fail: false,
            },
            StubTarget {
                api_calls: api_calls.clone(),
                ..StubTarget::default()
            },
            config(true),
        ));

        let first = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.sync_once().await }
        });

        // Wait until the first run holds the single-flight guard
        while !service.is_running() {
            tokio::task::yield_now().await;
        }

        let second = service.sync_once().await;
        assert!(matches!(second, SyncOutcome::Busy));
        // The rejected request never touched the playlist adapter
        assert_eq!(api_calls.load(Ordering::SeqCst), 0);

        gate.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, SyncOutcome::Completed(_)));
        assert_eq!(service.status().total_syncs, 1);
    }

    #[tokio::test]
    async fn start_is_a_noop_when_disabled() {
        let auth_calls = Arc::new(AtomicUsize::new(0));
        let service = Arc::new(SyncService::new(
            StubSource::with_tracks(vec![]),
            StubTarget {
                auth_calls: auth_calls.clone(),
                ..StubTarget::default()
            },
            config(false),
        ));

        service.start().await.unwrap();

        assert_eq!(auth_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.status().total_syncs, 0);
        service.stop().await;
    }

    #[tokio::test]
    async fn start_fails_fast_on_bad_credentials() {
        let service = Arc::new(SyncService::new(
            StubSource::with_tracks(vec![]),
            StubTarget {
                reject_auth: true,
                ..StubTarget::default()
            },
            config(true),
        ));

        let err = service.start().await.unwrap_err();

        assert!(matches!(err, SyncError::Auth(AuthError::MissingRefreshToken)));
        assert_eq!(service.status().total_syncs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_immediately_and_stop_disarms() {
        let service = Arc::new(SyncService::new(
            StubSource::with_tracks(vec![track("Gravity")]),
            StubTarget::default(),
            config(true),
        ));

        service.start().await.unwrap();

        // Give the timer task its immediate first tick
        while service.status().total_syncs == 0 {
            tokio::task::yield_now().await;
        }

        service.stop().await;
        let after_stop = service.status().total_syncs;

        tokio::time::advance(Duration::from_secs(7200)).await;
        tokio::task::yield_now().await;
        assert_eq!(service.status().total_syncs, after_stop);
    }
}
