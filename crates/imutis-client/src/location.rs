//! # Location Sampler
//!
//! Permission-gated position sampling, one-shot or continuous, with each
//! sample attributed to a subject and stamped with the device's current
//! network address.
//!
//! ## Watch Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    watch(subject, on_sample, on_error)                  │
//! │                                                                         │
//! │  spawn task ──► permission granted? ── no ──► on_error(PermissionDenied)│
//! │                        │ yes                                            │
//! │                        ▼                                                │
//! │  provider.watch() ──► mpsc::Receiver<PositionFix>                      │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  MovementFilter  (≥ min interval AND ≥ min distance since last sample) │
//! │                        │ admitted                                       │
//! │                        ▼                                                │
//! │  current_address() ──► LocationSample ──► on_sample                    │
//! │                                                                         │
//! │  WatchHandle::stop() or drop ──► task exits ──► receiver dropped       │
//! │                                   (provider sees its feed closed)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use imutis_core::validation::{validate_coordinates, validate_subject_id};
use imutis_core::{messages, LocationSample, MovementFilter, MovementThresholds, PositionFix, PostalAddress};

use crate::config::LocationSettings;
use crate::device::DeviceIdentityService;
use crate::error::ClientResult;

// =============================================================================
// Platform Boundary
// =============================================================================

/// Foreground location permission. Anything short of granted is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Queries and requests foreground location permission.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn status(&self) -> ClientResult<PermissionStatus>;

    /// Prompts the user. Returns the resulting status.
    async fn request(&self) -> ClientResult<PermissionStatus>;
}

/// Source of position fixes.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// One fix, aiming for `accuracy_m` meters of horizontal accuracy.
    async fn current_fix(&self, accuracy_m: f64) -> ClientResult<PositionFix>;

    /// Starts a continuous feed. `hint` lets the platform pre-throttle; the
    /// sampler applies the thresholds itself regardless.
    ///
    /// The provider must stop producing once the receiver is dropped.
    async fn watch(&self, hint: MovementThresholds) -> ClientResult<mpsc::Receiver<PositionFix>>;
}

/// Turns coordinates into postal addresses.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> ClientResult<Vec<PostalAddress>>;
}

/// Reported to a watcher's error callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location provider failed: {0}")]
    Provider(String),
}

impl LocationError {
    pub fn user_message(&self) -> &str {
        match self {
            LocationError::PermissionDenied => messages::LOCATION_PERMISSION_DENIED,
            LocationError::Provider(reason) => reason,
        }
    }
}

// =============================================================================
// Watch Handle
// =============================================================================

/// Controls a running watch started by [`LocationSampler::watch`].
///
/// Dropping the handle also stops the watch.
#[must_use = "dropping a WatchHandle stops the watch"]
#[derive(Debug)]
pub struct WatchHandle {
    stopped: Arc<AtomicBool>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stops sampling and releases the provider feed. Repeated calls are
    /// no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Capacity 1 and a single sender: the first signal always fits.
        let _ = self.shutdown_tx.try_send(());
        debug!("Location watch stop requested");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// True once the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// =============================================================================
// Sampler
// =============================================================================

/// Location sampling service.
#[derive(Clone)]
pub struct LocationSampler {
    permissions: Arc<dyn PermissionGate>,
    provider: Arc<dyn PositionProvider>,
    geocoder: Option<Arc<dyn Geocoder>>,
    identity: DeviceIdentityService,
    settings: LocationSettings,
}

impl std::fmt::Debug for LocationSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSampler")
            .field("settings", &self.settings)
            .field("geocoder", &self.geocoder.is_some())
            .finish_non_exhaustive()
    }
}

impl LocationSampler {
    pub fn new(
        permissions: Arc<dyn PermissionGate>,
        provider: Arc<dyn PositionProvider>,
        identity: DeviceIdentityService,
        settings: LocationSettings,
    ) -> Self {
        LocationSampler {
            permissions,
            provider,
            geocoder: None,
            identity,
            settings,
        }
    }

    /// Enables [`LocationSampler::reverse_geocode`].
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    // =========================================================================
    // Permission
    // =========================================================================

    /// True only if permission is currently granted. Errors count as denied.
    pub async fn has_permission(&self) -> bool {
        match self.permissions.status().await {
            Ok(status) => status == PermissionStatus::Granted,
            Err(e) => {
                warn!(error = %e, "Failed to check location permission");
                false
            }
        }
    }

    /// Prompts for permission. Errors count as denied.
    pub async fn request_permission(&self) -> bool {
        match self.permissions.request().await {
            Ok(status) => {
                info!(?status, "Location permission requested");
                status == PermissionStatus::Granted
            }
            Err(e) => {
                warn!(error = %e, "Failed to request location permission");
                false
            }
        }
    }

    /// Checks, then requests if needed.
    async fn ensure_permission(&self) -> bool {
        self.has_permission().await || self.request_permission().await
    }

    // =========================================================================
    // Sampling
    // =========================================================================

    /// One sample for `subject_id`, or `None` when permission is denied, no
    /// fix arrives within the configured timeout, or the provider fails.
    pub async fn get_current_sample(&self, subject_id: &str) -> Option<LocationSample> {
        if let Err(e) = validate_subject_id(subject_id) {
            warn!(error = %e, "Rejecting sample request");
            return None;
        }

        if !self.ensure_permission().await {
            warn!("{}", messages::LOCATION_PERMISSION_DENIED);
            return None;
        }

        let fix = tokio::time::timeout(
            self.settings.fix_timeout(),
            self.provider.current_fix(self.settings.accuracy_threshold_m),
        )
        .await;

        let fix = match fix {
            Ok(Ok(fix)) => fix,
            Ok(Err(e)) => {
                warn!(error = %e, "Position provider failed");
                return None;
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.settings.fix_timeout_secs,
                    "No position fix before timeout"
                );
                return None;
            }
        };

        let address = self.identity.current_address().await;
        Some(LocationSample::from_fix(subject_id, &address, &fix))
    }

    /// Starts continuous sampling in a background task.
    ///
    /// `on_error` fires at most once: when permission is denied at start or
    /// the provider feed can't be opened. Either way no samples follow.
    pub fn watch<S, E>(&self, subject_id: impl Into<String>, on_sample: S, on_error: E) -> WatchHandle
    where
        S: Fn(LocationSample) + Send + 'static,
        E: FnOnce(LocationError) + Send + 'static,
    {
        let subject_id = subject_id.into();
        let stopped = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let sampler = self.clone();
        let task_stopped = Arc::clone(&stopped);
        let task = tokio::spawn(async move {
            sampler
                .run_watch(subject_id, on_sample, on_error, task_stopped, shutdown_rx)
                .await;
        });

        WatchHandle {
            stopped,
            shutdown_tx,
            task,
        }
    }

    async fn run_watch<S, E>(
        self,
        subject_id: String,
        on_sample: S,
        on_error: E,
        stopped: Arc<AtomicBool>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) where
        S: Fn(LocationSample) + Send + 'static,
        E: FnOnce(LocationError) + Send + 'static,
    {
        if let Err(e) = validate_subject_id(&subject_id) {
            on_error(LocationError::Provider(e.to_string()));
            return;
        }

        if !self.ensure_permission().await {
            if !stopped.load(Ordering::SeqCst) {
                warn!(subject_id = %subject_id, "Location watch denied");
                on_error(LocationError::PermissionDenied);
            }
            return;
        }

        if stopped.load(Ordering::SeqCst) {
            return;
        }

        let thresholds = self.settings.thresholds();
        let mut feed = match self.provider.watch(thresholds).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!(error = %e, "Failed to open position feed");
                on_error(LocationError::Provider(e.to_string()));
                return;
            }
        };

        info!(
            subject_id = %subject_id,
            min_interval_secs = thresholds.min_interval.as_secs(),
            min_distance_m = thresholds.min_distance_m,
            "Location watch started"
        );

        let mut filter = MovementFilter::new(thresholds);
        let mut emitted = 0u64;

        loop {
            tokio::select! {
                // Fires on stop() and when the handle is dropped
                _ = shutdown_rx.recv() => break,

                fix = feed.recv() => {
                    let Some(fix) = fix else {
                        debug!("Position feed closed by provider");
                        break;
                    };

                    if !filter.admit(&fix) {
                        continue;
                    }

                    let address = self.identity.current_address().await;
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }

                    emitted += 1;
                    on_sample(LocationSample::from_fix(&subject_id, &address, &fix));
                }
            }
        }

        info!(subject_id = %subject_id, emitted, "Location watch stopped");
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Great-circle distance in meters.
    pub fn distance_meters(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        imutis_core::distance_meters(lat1, lon1, lat2, lon2)
    }

    /// First address for the coordinates as one display line, or `None`.
    ///
    /// Out-of-range coordinates never reach the geocoder.
    pub async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;

        if let Err(e) = validate_coordinates(latitude, longitude) {
            warn!(error = %e, "Rejecting reverse geocode");
            return None;
        }

        match geocoder.reverse_geocode(latitude, longitude).await {
            Ok(addresses) => addresses.first().map(PostalAddress::display_line),
            Err(e) => {
                warn!(error = %e, "Reverse geocoding failed");
                None
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::test_support::{pixel_tablet, probe, storage};
    use chrono::{TimeZone, Utc};
    use imutis_core::Activity;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Duration;

    // =========================================================================
    // Doubles
    // =========================================================================

    struct FakePermissions {
        status: PermissionStatus,
        grant_on_request: bool,
        requests: AtomicU32,
    }

    impl FakePermissions {
        fn granted() -> Self {
            FakePermissions {
                status: PermissionStatus::Granted,
                grant_on_request: true,
                requests: AtomicU32::new(0),
            }
        }

        fn denied() -> Self {
            FakePermissions {
                status: PermissionStatus::Denied,
                grant_on_request: false,
                requests: AtomicU32::new(0),
            }
        }

        fn grant_when_asked() -> Self {
            FakePermissions {
                status: PermissionStatus::Denied,
                grant_on_request: true,
                requests: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PermissionGate for FakePermissions {
        async fn status(&self) -> ClientResult<PermissionStatus> {
            Ok(self.status)
        }

        async fn request(&self) -> ClientResult<PermissionStatus> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(if self.grant_on_request {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            })
        }
    }

    struct BrokenPermissions;

    #[async_trait]
    impl PermissionGate for BrokenPermissions {
        async fn status(&self) -> ClientResult<PermissionStatus> {
            Err(ClientError::Platform("no location module".into()))
        }

        async fn request(&self) -> ClientResult<PermissionStatus> {
            Err(ClientError::Platform("no location module".into()))
        }
    }

    /// Provider whose watch feed is driven by the test.
    #[derive(Default)]
    struct ScriptedProvider {
        one_shot: Option<PositionFix>,
        feed: Mutex<Option<mpsc::Sender<PositionFix>>>,
        watches: AtomicU32,
    }

    impl ScriptedProvider {
        fn with_fix(fix: PositionFix) -> Self {
            ScriptedProvider {
                one_shot: Some(fix),
                ..Default::default()
            }
        }

        /// Hands the feed to the test; dropping it closes the stream.
        fn take_feed(&self) -> mpsc::Sender<PositionFix> {
            self.feed.lock().unwrap().take().expect("watch not started")
        }
    }

    #[async_trait]
    impl PositionProvider for ScriptedProvider {
        async fn current_fix(&self, _accuracy_m: f64) -> ClientResult<PositionFix> {
            match self.one_shot {
                Some(fix) => Ok(fix),
                // Never answers
                None => std::future::pending().await,
            }
        }

        async fn watch(&self, _hint: MovementThresholds) -> ClientResult<mpsc::Receiver<PositionFix>> {
            let (tx, rx) = mpsc::channel(16);
            *self.feed.lock().unwrap() = Some(tx);
            self.watches.fetch_add(1, Ordering::SeqCst);
            Ok(rx)
        }
    }

    struct FixedGeocoder(ClientResult<Vec<PostalAddress>>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn reverse_geocode(&self, _lat: f64, _lon: f64) -> ClientResult<Vec<PostalAddress>> {
            match &self.0 {
                Ok(list) => Ok(list.clone()),
                Err(_) => Err(ClientError::Platform("geocoder offline".into())),
            }
        }
    }

    fn fix_at(secs: i64, lat: f64, lon: f64, speed: Option<f64>) -> PositionFix {
        PositionFix {
            latitude: lat,
            longitude: lon,
            accuracy: Some(8.0),
            speed,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs),
        }
    }

    fn sampler(
        permissions: Arc<dyn PermissionGate>,
        provider: Arc<dyn PositionProvider>,
        addresses: &[&str],
    ) -> LocationSampler {
        let identity = DeviceIdentityService::new(storage(), Arc::new(pixel_tablet()), probe(addresses), "1.0.0");
        LocationSampler::new(permissions, provider, identity, LocationSettings::default())
    }

    // =========================================================================
    // Permission
    // =========================================================================

    #[tokio::test]
    async fn test_permission_checks_fail_closed() {
        let provider = Arc::new(ScriptedProvider::default());
        let s = sampler(Arc::new(BrokenPermissions), provider, &["10.0.0.5"]);

        assert!(!s.has_permission().await);
        assert!(!s.request_permission().await);
    }

    // =========================================================================
    // One-shot
    // =========================================================================

    #[tokio::test]
    async fn test_current_sample_requests_permission_when_needed() {
        let permissions = Arc::new(FakePermissions::grant_when_asked());
        let provider = Arc::new(ScriptedProvider::with_fix(fix_at(0, -1.9441, 30.0619, Some(4.0))));
        let s = sampler(permissions.clone(), provider, &["10.0.0.5"]);

        let sample = s.get_current_sample("rider-7").await.unwrap();

        assert_eq!(permissions.requests.load(Ordering::SeqCst), 1);
        assert_eq!(sample.subject_id, "rider-7");
        assert_eq!(sample.device_address, "10.0.0.5");
        assert_eq!(sample.accuracy_meters, 8.0);
        assert_eq!(sample.activity, Activity::Traveling);
    }

    #[tokio::test]
    async fn test_current_sample_absent_when_denied() {
        let provider = Arc::new(ScriptedProvider::with_fix(fix_at(0, 0.0, 0.0, None)));
        let s = sampler(Arc::new(FakePermissions::denied()), provider, &["10.0.0.5"]);

        assert!(s.get_current_sample("rider-7").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_sample_absent_after_fix_timeout() {
        let provider = Arc::new(ScriptedProvider::default());
        let s = sampler(Arc::new(FakePermissions::granted()), provider, &["10.0.0.5"]);

        assert!(s.get_current_sample("rider-7").await.is_none());
    }

    #[tokio::test]
    async fn test_current_sample_rejects_blank_subject() {
        let provider = Arc::new(ScriptedProvider::with_fix(fix_at(0, 0.0, 0.0, None)));
        let s = sampler(Arc::new(FakePermissions::granted()), provider, &["10.0.0.5"]);

        assert!(s.get_current_sample("  ").await.is_none());
    }

    // =========================================================================
    // Watch
    // =========================================================================

    async fn wait_for_feed(provider: &ScriptedProvider) -> mpsc::Sender<PositionFix> {
        for _ in 0..100 {
            if provider.watches.load(Ordering::SeqCst) > 0 {
                return provider.take_feed();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("watch never subscribed to the provider");
    }

    #[tokio::test]
    async fn test_watch_emits_only_when_both_thresholds_met() {
        let provider = Arc::new(ScriptedProvider::default());
        let s = sampler(
            Arc::new(FakePermissions::granted()),
            provider.clone(),
            &["10.0.0.5", "10.0.0.9"],
        );

        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
        let handle = s.watch(
            "rider-7",
            move |sample| {
                let _ = sample_tx.send(sample);
            },
            |e| panic!("unexpected watch error: {}", e),
        );

        let feed = wait_for_feed(&provider).await;
        // First fix is always emitted
        feed.send(fix_at(0, 0.0, 0.0, Some(0.5))).await.unwrap();
        // Far enough, too soon
        feed.send(fix_at(5, 0.0, 0.01, Some(3.0))).await.unwrap();
        // Late enough, too close (~5.5 m)
        feed.send(fix_at(12, 0.0, 0.00005, None)).await.unwrap();
        // Both thresholds met (~111 m, 20 s)
        feed.send(fix_at(20, 0.0, 0.001, Some(3.0))).await.unwrap();
        drop(feed);

        let mut samples = Vec::new();
        while let Ok(Some(sample)) = tokio::time::timeout(Duration::from_secs(2), sample_rx.recv()).await {
            samples.push(sample);
        }

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].activity, Activity::Browsing);
        assert_eq!(samples[0].device_address, "10.0.0.5");
        assert_eq!(samples[1].activity, Activity::Traveling);
        assert_eq!(samples[1].device_address, "10.0.0.9");
        assert_eq!(samples[1].longitude, 0.001);
        drop(handle);
    }

    #[tokio::test]
    async fn test_watch_stop_releases_provider_feed() {
        let provider = Arc::new(ScriptedProvider::default());
        let s = sampler(Arc::new(FakePermissions::granted()), provider.clone(), &["10.0.0.5"]);

        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
        let handle = s.watch(
            "rider-7",
            move |sample| {
                let _ = sample_tx.send(sample);
            },
            |_| {},
        );

        let feed = wait_for_feed(&provider).await;
        feed.send(fix_at(0, 0.0, 0.0, None)).await.unwrap();
        assert!(sample_rx.recv().await.is_some());

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());

        tokio::time::timeout(Duration::from_secs(2), feed.closed())
            .await
            .expect("provider feed still open after stop");
    }

    #[tokio::test]
    async fn test_watch_permission_denied_reports_once() {
        let provider = Arc::new(ScriptedProvider::default());
        let s = sampler(Arc::new(FakePermissions::denied()), provider.clone(), &["10.0.0.5"]);

        let (error_tx, mut error_rx) = mpsc::unbounded_channel();
        let handle = s.watch(
            "rider-7",
            |_| panic!("no samples expected"),
            move |e| {
                let _ = error_tx.send(e);
            },
        );

        let err = error_rx.recv().await.unwrap();
        assert_eq!(err, LocationError::PermissionDenied);
        assert_eq!(err.user_message(), "Location permission denied");
        // Sender dropped with the task: nothing else arrives
        assert!(error_rx.recv().await.is_none());
        assert_eq!(provider.watches.load(Ordering::SeqCst), 0);
        drop(handle);
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    #[tokio::test]
    async fn test_distance_and_reverse_geocode() {
        let provider = Arc::new(ScriptedProvider::default());
        let base = sampler(Arc::new(FakePermissions::granted()), provider, &["10.0.0.5"]);

        let d = base.distance_meters(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 50.0);
        assert_eq!(base.distance_meters(1.5, 2.5, 1.5, 2.5), 0.0);

        assert_eq!(base.reverse_geocode(0.0, 0.0).await, None);

        let found = base.clone().with_geocoder(Arc::new(FixedGeocoder(Ok(vec![
            PostalAddress {
                street: Some("KN 3 Rd".into()),
                city: Some("Kigali".into()),
                region: None,
                country: Some("Rwanda".into()),
            },
            PostalAddress::default(),
        ]))));
        assert_eq!(
            found.reverse_geocode(-1.95, 30.06).await.as_deref(),
            Some("KN 3 Rd, Kigali, , Rwanda")
        );
        // Same geocoder, impossible latitude
        assert_eq!(found.reverse_geocode(95.0, 30.06).await, None);
        assert_eq!(found.reverse_geocode(f64::NAN, 30.06).await, None);

        let empty = base.clone().with_geocoder(Arc::new(FixedGeocoder(Ok(vec![]))));
        assert_eq!(empty.reverse_geocode(0.0, 0.0).await, None);

        let failing = base.with_geocoder(Arc::new(FixedGeocoder(Err(ClientError::Platform(
            "x".into(),
        )))));
        assert_eq!(failing.reverse_geocode(0.0, 0.0).await, None);
    }
}
