//! One end-to-end alert run.
//!
//! The run owns no clock: the caller passes `today`. Reference data is
//! loaded before anything is fetched so that an unusable reference set
//! aborts the run without touching upstream quotas, the chat group, or the
//! persisted state.

use chrono::NaiveDate;
use fire_alert_detection_models::{ClassifiedDetection, RunState, TrackedDetection};
use fire_alert_notify::AlertDispatcher;
use fire_alert_notify::format::render_alert;
use fire_alert_source::aggregate::aggregate;
use fire_alert_source::{DetectionSource, FetchOptions};
use fire_alert_state::{StateStore, load_or_empty};

use crate::PipelineError;
use crate::classify::classify;
use crate::dedup::{DedupDecision, should_dispatch};
use crate::gate::retain_protected;
use crate::proximity::{flag_industrial, select_candidates};
use crate::reference::{ReferenceData, ReferenceLoader};

/// Immutable per-run parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Region name shown in the alert header.
    pub region_name: String,
    /// Upstream query parameters.
    pub fetch: FetchOptions,
    /// Industrial exclusion radius in kilometers (inclusive).
    pub industrial_radius_km: f64,
    /// UTC offset used to display acquisition times.
    pub utc_offset_hours: i32,
    /// Chat/group id receiving the alert.
    pub destination: String,
    /// Render the alert without sending it or writing state.
    pub dry_run: bool,
}

/// External systems a run talks to.
pub struct Collaborators<'a> {
    /// Upstream detection products, in declaration order.
    pub sources: &'a [Box<dyn DetectionSource>],
    /// Reference data provider.
    pub reference: &'a dyn ReferenceLoader,
    /// Alert delivery.
    pub dispatcher: &'a dyn AlertDispatcher,
    /// Last-alert storage.
    pub store: &'a dyn StateStore,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No source returned any detection.
    Empty,
    /// Every detection was industrial or not dated today.
    NoCandidates,
    /// No candidate fell inside the administrative layer.
    OutsideAreaOfInterest,
    /// No detection fell inside a conservation unit or buffer zone.
    NoQualifyingDetections,
    /// Same day and count as the last alert; nothing sent.
    Suppressed {
        /// Qualifying detections.
        count: usize,
    },
    /// The alert was delivered and the state updated.
    Alerted {
        /// Qualifying detections.
        count: usize,
        /// Provider message id, if returned.
        message_id: Option<String>,
    },
    /// The alert was rendered but not sent.
    DryRun {
        /// Qualifying detections.
        count: usize,
        /// Rendered alert body.
        message: String,
    },
    /// Delivery failed; state was left untouched.
    DispatchFailed {
        /// Qualifying detections.
        count: usize,
        /// Delivery error.
        error: String,
    },
}

impl RunOutcome {
    /// The delivery error, when the run should be reported as failed.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::DispatchFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Result of the pure filtering stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Nothing survived the proximity/date filter.
    NoCandidates,
    /// Nothing fell inside the administrative layer.
    OutsideAreaOfInterest,
    /// Nothing fell inside a protected area.
    NoQualifyingDetections,
    /// Detections to alert on, in aggregation order.
    Qualifying(Vec<ClassifiedDetection>),
}

/// Runs proximity filtering, classification and the protected-area gate.
#[must_use]
pub fn select_alert_detections(
    detections: Vec<TrackedDetection>,
    reference: &ReferenceData,
    industrial_radius_km: f64,
    today: NaiveDate,
) -> Selection {
    let flagged = flag_industrial(detections, &reference.industrial, industrial_radius_km);
    let candidates = select_candidates(flagged, today);
    if candidates.is_empty() {
        return Selection::NoCandidates;
    }

    let classified = classify(candidates, &reference.layers);
    if classified.is_empty() {
        return Selection::OutsideAreaOfInterest;
    }

    let protected = retain_protected(classified);
    if protected.is_empty() {
        return Selection::NoQualifyingDetections;
    }

    Selection::Qualifying(protected)
}

/// Executes one run for `today`.
///
/// # Errors
///
/// Returns [`PipelineError::ReferenceData`] if reference data cannot be
/// loaded. Source, state and delivery failures are handled inside the run
/// and reflected in the [`RunOutcome`].
pub async fn run(
    config: &PipelineConfig,
    deps: &Collaborators<'_>,
    today: NaiveDate,
) -> Result<RunOutcome, PipelineError> {
    log::info!("Starting fire alert run for {} on {today}", config.region_name);

    let reference = deps.reference.load().map_err(|e| {
        log::error!("Aborting run, reference data unavailable: {e}");
        PipelineError::from(e)
    })?;

    let batch = aggregate(deps.sources, &config.fetch).await;
    if batch.is_empty() {
        log::info!("No detections returned by any source");
        return Ok(RunOutcome::Empty);
    }

    let alerts = match select_alert_detections(
        batch.detections,
        &reference,
        config.industrial_radius_km,
        today,
    ) {
        Selection::NoCandidates => {
            log::info!("No non-industrial detections dated {today}");
            return Ok(RunOutcome::NoCandidates);
        }
        Selection::OutsideAreaOfInterest => {
            log::info!("No detections inside the administrative area");
            return Ok(RunOutcome::OutsideAreaOfInterest);
        }
        Selection::NoQualifyingDetections => {
            log::info!("No detections inside conservation units or buffer zones");
            return Ok(RunOutcome::NoQualifyingDetections);
        }
        Selection::Qualifying(alerts) => alerts,
    };
    let count = alerts.len();

    let prior = load_or_empty(deps.store);
    if should_dispatch(prior.as_ref(), today, count) == DedupDecision::Suppress {
        log::info!("Already alerted {count} detection(s) today, suppressing");
        return Ok(RunOutcome::Suppressed { count });
    }

    let message = render_alert(&alerts, today, &config.region_name, config.utc_offset_hours);

    if config.dry_run {
        log::info!("Dry run: rendered alert for {count} detection(s), not sending");
        return Ok(RunOutcome::DryRun { count, message });
    }

    match deps.dispatcher.dispatch(&config.destination, &message).await {
        Ok(receipt) => {
            let state = RunState { date: today, count };
            if let Err(e) = deps.store.save(&state) {
                log::error!("Alert sent but run state could not be saved: {e}");
            }
            log::info!("Alerted {count} detection(s)");
            Ok(RunOutcome::Alerted {
                count,
                message_id: receipt.message_id,
            })
        }
        Err(e) => {
            log::error!("Failed to dispatch alert for {count} detection(s): {e}");
            Ok(RunOutcome::DispatchFailed {
                count,
                error: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveTime;
    use fire_alert_detection_models::{BoundingBox, DayNight, Detection};
    use fire_alert_notify::{DispatchError, DispatchReceipt};
    use fire_alert_source::SourceError;
    use fire_alert_spatial::SpatialError;
    use fire_alert_spatial::industrial::IndustrialIndex;
    use fire_alert_state::StateError;

    use super::*;
    use crate::classify::tests::rio_layers;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 14).unwrap()
    }

    fn detection(lat: f64, lng: f64) -> Detection {
        Detection {
            product: "VIIRS_NOAA20_NRT".to_string(),
            latitude: lat,
            longitude: lng,
            acquired_on: today(),
            acquired_at: NaiveTime::from_hms_opt(16, 20, 0).unwrap(),
            day_night: DayNight::Day,
            satellite: "N20".to_string(),
            instrument: "VIIRS".to_string(),
            confidence: Some("n".to_string()),
            frp: Some(2.5),
        }
    }

    enum FakeSource {
        Rows(&'static str, Vec<Detection>),
        Fail(&'static str),
    }

    #[async_trait]
    impl DetectionSource for FakeSource {
        fn id(&self) -> &str {
            match self {
                Self::Rows(id, _) | Self::Fail(id) => *id,
            }
        }

        async fn fetch(&self, _options: &FetchOptions) -> Result<Vec<Detection>, SourceError> {
            match self {
                Self::Rows(_, rows) => Ok(rows.clone()),
                Self::Fail(_) => Err(SourceError::Malformed {
                    message: "empty body".to_string(),
                }),
            }
        }
    }

    struct FixtureReference;

    impl ReferenceLoader for FixtureReference {
        fn load(&self) -> Result<ReferenceData, SpatialError> {
            Ok(ReferenceData {
                industrial: IndustrialIndex::from_csv("name,latitude,longitude\nUTE,-22.5,-42.8\n")?,
                layers: rio_layers(),
            })
        }
    }

    struct BrokenReference;

    impl ReferenceLoader for BrokenReference {
        fn load(&self) -> Result<ReferenceData, SpatialError> {
            Err(SpatialError::InvalidLayer {
                layer: "conservation_units".to_string(),
                message: "layer contains no polygon features".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        fail: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AlertDispatcher for RecordingDispatcher {
        async fn dispatch(&self, destination: &str, body: &str) -> Result<DispatchReceipt, DispatchError> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), body.to_string()));
            if self.fail {
                return Err(DispatchError::Rejected {
                    status: 503,
                    message: "gateway unavailable".to_string(),
                });
            }
            Ok(DispatchReceipt {
                message_id: Some("msg-1".to_string()),
            })
        }
    }

    impl RecordingDispatcher {
        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<Option<RunState>>,
        corrupt: bool,
        saves: Mutex<usize>,
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<Option<RunState>, StateError> {
            if self.corrupt {
                return Err(StateError::Corrupt(
                    serde_json::from_str::<RunState>("{").unwrap_err(),
                ));
            }
            Ok(*self.state.lock().unwrap())
        }

        fn save(&self, state: &RunState) -> Result<(), StateError> {
            *self.state.lock().unwrap() = Some(*state);
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    impl MemoryStore {
        fn with(state: RunState) -> Self {
            Self {
                state: Mutex::new(Some(state)),
                ..Self::default()
            }
        }

        fn current(&self) -> Option<RunState> {
            *self.state.lock().unwrap()
        }

        fn saves(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            region_name: "Rio de Janeiro".to_string(),
            fetch: FetchOptions {
                bbox: BoundingBox {
                    west: -45.4,
                    south: -23.6,
                    east: -40.9,
                    north: -20.7,
                },
                day_range: 1,
                timeout: Duration::from_secs(5),
            },
            industrial_radius_km: 1.5,
            utc_offset_hours: -3,
            destination: "120363000000000000@g.us".to_string(),
            dry_run: false,
        }
    }

    /// Five rows (two industrial, two in the conservation unit, one plain),
    /// a failing source, and three rows (one outside the administrative
    /// area, two plain).
    fn scenario_sources() -> Vec<Box<dyn DetectionSource>> {
        vec![
            Box::new(FakeSource::Rows(
                "noaa20",
                vec![
                    detection(-22.5, -42.8),
                    detection(-22.505, -42.8),
                    detection(-23.0, -43.2),
                    detection(-22.9, -43.3),
                    detection(-22.3, -43.8),
                ],
            )),
            Box::new(FakeSource::Fail("snpp")),
            Box::new(FakeSource::Rows(
                "modis",
                vec![
                    detection(-21.0, -41.0),
                    detection(-23.5, -42.5),
                    detection(-22.2, -42.9),
                ],
            )),
        ]
    }

    #[test]
    fn scenario_counts_through_each_stage() {
        let reference = FixtureReference.load().unwrap();
        let all: Vec<Detection> = vec![
            detection(-22.5, -42.8),
            detection(-22.505, -42.8),
            detection(-23.0, -43.2),
            detection(-22.9, -43.3),
            detection(-22.3, -43.8),
            detection(-21.0, -41.0),
            detection(-23.5, -42.5),
            detection(-22.2, -42.9),
        ];
        let tracked: Vec<TrackedDetection> = all
            .into_iter()
            .enumerate()
            .map(|(i, detection)| TrackedDetection {
                source_id: fire_alert_detection_models::SourceId(u32::try_from(i).unwrap()),
                detection,
            })
            .collect();
        assert_eq!(tracked.len(), 8);

        let flagged = flag_industrial(tracked.clone(), &reference.industrial, 1.5);
        let candidates = select_candidates(flagged, today());
        assert_eq!(candidates.len(), 6);

        let classified = classify(candidates, &reference.layers);
        assert_eq!(classified.len(), 5);

        let Selection::Qualifying(alerts) = select_alert_detections(tracked, &reference, 1.5, today())
        else {
            panic!("expected qualifying detections");
        };
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.conservation_unit.is_some()));
    }

    #[tokio::test]
    async fn scenario_dispatches_two_detections() {
        let sources = scenario_sources();
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore::default();
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let outcome = run(&config(), &deps, today()).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Alerted {
                count: 2,
                message_id: Some("msg-1".to_string())
            }
        );
        let sent = dispatcher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "120363000000000000@g.us");
        assert!(sent[0].1.contains("Foco 2:"));
        assert!(!sent[0].1.contains("Foco 3:"));
        assert_eq!(
            store.current(),
            Some(RunState {
                date: today(),
                count: 2
            })
        );
    }

    #[tokio::test]
    async fn reference_failure_aborts_without_side_effects() {
        let sources = scenario_sources();
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore::with(RunState {
            date: today(),
            count: 7,
        });
        let deps = Collaborators {
            sources: &sources,
            reference: &BrokenReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let result = run(&config(), &deps, today()).await;

        assert!(matches!(result, Err(PipelineError::ReferenceData(_))));
        assert_eq!(dispatcher.sent(), 0);
        assert_eq!(store.saves(), 0);
        assert_eq!(store.current().map(|s| s.count), Some(7));
    }

    #[tokio::test]
    async fn empty_sources_end_early() {
        let sources: Vec<Box<dyn DetectionSource>> = vec![
            Box::new(FakeSource::Rows("noaa20", Vec::new())),
            Box::new(FakeSource::Fail("snpp")),
        ];
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore::default();
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let outcome = run(&config(), &deps, today()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Empty);
        assert_eq!(dispatcher.sent(), 0);
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn early_outcomes_for_each_empty_stage() {
        let cases = [
            (detection(-22.5, -42.8), RunOutcome::NoCandidates),
            (detection(-21.0, -41.0), RunOutcome::OutsideAreaOfInterest),
            (detection(-22.3, -43.8), RunOutcome::NoQualifyingDetections),
        ];

        for (row, expected) in cases {
            let sources: Vec<Box<dyn DetectionSource>> =
                vec![Box::new(FakeSource::Rows("noaa20", vec![row]))];
            let dispatcher = RecordingDispatcher::default();
            let store = MemoryStore::default();
            let deps = Collaborators {
                sources: &sources,
                reference: &FixtureReference,
                dispatcher: &dispatcher,
                store: &store,
            };

            let outcome = run(&config(), &deps, today()).await.unwrap();
            assert_eq!(outcome, expected);
            assert_eq!(dispatcher.sent(), 0);
        }
    }

    #[tokio::test]
    async fn yesterdays_detections_are_not_candidates() {
        let mut old = detection(-23.0, -43.2);
        old.acquired_on = today().pred_opt().unwrap();
        let sources: Vec<Box<dyn DetectionSource>> =
            vec![Box::new(FakeSource::Rows("noaa20", vec![old]))];
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore::default();
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let outcome = run(&config(), &deps, today()).await.unwrap();
        assert_eq!(outcome, RunOutcome::NoCandidates);
    }

    #[tokio::test]
    async fn same_count_same_day_is_suppressed() {
        let sources = scenario_sources();
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore::with(RunState {
            date: today(),
            count: 2,
        });
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let outcome = run(&config(), &deps, today()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Suppressed { count: 2 });
        assert_eq!(dispatcher.sent(), 0);
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn changed_count_dispatches_again() {
        let sources = scenario_sources();
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore::with(RunState {
            date: today(),
            count: 1,
        });
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let outcome = run(&config(), &deps, today()).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Alerted { count: 2, .. }));
        assert_eq!(store.current().map(|s| s.count), Some(2));
    }

    #[tokio::test]
    async fn corrupt_state_fails_open() {
        let sources = scenario_sources();
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore {
            corrupt: true,
            ..MemoryStore::default()
        };
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let outcome = run(&config(), &deps, today()).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Alerted { count: 2, .. }));
        assert_eq!(dispatcher.sent(), 1);
    }

    #[tokio::test]
    async fn dispatch_failure_leaves_state_unchanged() {
        let sources = scenario_sources();
        let dispatcher = RecordingDispatcher {
            fail: true,
            ..RecordingDispatcher::default()
        };
        let prior = RunState {
            date: today().pred_opt().unwrap(),
            count: 2,
        };
        let store = MemoryStore::with(prior);
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };

        let outcome = run(&config(), &deps, today()).await.unwrap();

        assert_eq!(
            outcome.failure(),
            Some("Provider rejected message (HTTP 503): gateway unavailable")
        );
        assert!(matches!(outcome, RunOutcome::DispatchFailed { count: 2, .. }));
        assert_eq!(dispatcher.sent(), 1);
        assert_eq!(store.saves(), 0);
        assert_eq!(store.current(), Some(prior));
    }

    #[tokio::test]
    async fn dry_run_renders_without_side_effects() {
        let sources = scenario_sources();
        let dispatcher = RecordingDispatcher::default();
        let store = MemoryStore::default();
        let deps = Collaborators {
            sources: &sources,
            reference: &FixtureReference,
            dispatcher: &dispatcher,
            store: &store,
        };
        let config = PipelineConfig {
            dry_run: true,
            ..config()
        };

        let outcome = run(&config, &deps, today()).await.unwrap();

        let RunOutcome::DryRun { count, message } = outcome else {
            panic!("expected dry run outcome");
        };
        assert_eq!(count, 2);
        assert!(message.starts_with("Focos de calor encontrados em Rio de Janeiro"));
        assert!(message.contains("Parque Estadual da Pedra Branca"));
        assert_eq!(dispatcher.sent(), 0);
        assert_eq!(store.saves(), 0);
    }
}
