//! Runs a [`MapSession`] on its own tokio task.
//!
//! All mutations go through a single mpsc queue, so datasets delivered by
//! concurrent loaders and region changes from the UI are applied one at a
//! time in arrival order.

use std::sync::Arc;
use std::time::Instant;

use chart_map_annotation_models::{DatasetKind, MapRegion, RawRecord};
use chart_map_source::{AnnotationSource, SourceError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{MapSession, RenderSurface, SessionError, TapTarget};

const DEFAULT_QUEUE_CAPACITY: usize = 64;

enum Command {
    Deliver {
        kind: DatasetKind,
        records: Vec<RawRecord>,
    },
    SetLoading {
        kind: DatasetKind,
        value: bool,
    },
    RegionChanged {
        region: MapRegion,
        at: Instant,
    },
    Tapped {
        dataset: DatasetKind,
        id: String,
        current_bin: Option<i32>,
        reply: oneshot::Sender<Option<TapTarget>>,
    },
    SetOverlayEnabled(bool),
    ToggleOverlayLayer(u32),
    SetOverlayLayers(Vec<u32>),
    Shutdown,
}

/// Cloneable handle to a running map session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deliver { kind, records } => f
                .debug_struct("Deliver")
                .field("kind", kind)
                .field("records", &records.len())
                .finish(),
            Self::SetLoading { kind, value } => f
                .debug_struct("SetLoading")
                .field("kind", kind)
                .field("value", value)
                .finish(),
            Self::RegionChanged { region, .. } => {
                f.debug_tuple("RegionChanged").field(region).finish()
            }
            Self::Tapped { dataset, id, .. } => f
                .debug_struct("Tapped")
                .field("dataset", dataset)
                .field("id", id)
                .finish_non_exhaustive(),
            Self::SetOverlayEnabled(enabled) => {
                f.debug_tuple("SetOverlayEnabled").field(enabled).finish()
            }
            Self::ToggleOverlayLayer(layer) => {
                f.debug_tuple("ToggleOverlayLayer").field(layer).finish()
            }
            Self::SetOverlayLayers(layers) => {
                f.debug_tuple("SetOverlayLayers").field(layers).finish()
            }
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Moves `session` onto a new tokio task.
///
/// The task runs until [`SessionHandle::shutdown`] is called or every
/// handle is dropped, then yields the session back through the returned
/// [`JoinHandle`].
pub fn spawn_session<S>(session: MapSession<S>) -> (SessionHandle, JoinHandle<MapSession<S>>)
where
    S: RenderSurface + Send + 'static,
{
    spawn_session_with_capacity(session, DEFAULT_QUEUE_CAPACITY)
}

/// Like [`spawn_session`] with an explicit command queue capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn spawn_session_with_capacity<S>(
    mut session: MapSession<S>,
    capacity: usize,
) -> (SessionHandle, JoinHandle<MapSession<S>>)
where
    S: RenderSurface + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    session.announce();
    let task = tokio::spawn(run(session, rx));
    (SessionHandle { tx }, task)
}

async fn run<S: RenderSurface>(
    mut session: MapSession<S>,
    mut rx: mpsc::Receiver<Command>,
) -> MapSession<S> {
    log::debug!("Map session started");

    loop {
        let command = if let Some(deadline) = session.pending_deadline() {
            tokio::select! {
                command = rx.recv() => command,
                () = tokio::time::sleep_until(deadline.into()) => {
                    session.flush_pending(Instant::now());
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        let Some(command) = command else {
            log::debug!("All session handles dropped");
            break;
        };

        log::trace!("Session command: {command:?}");

        match command {
            Command::Deliver { kind, records } => {
                session.deliver(kind, records);
            }
            Command::SetLoading { kind, value } => session.set_loading(kind, value),
            Command::RegionChanged { region, at } => {
                session.region_did_change(region, at);
            }
            Command::Tapped {
                dataset,
                id,
                current_bin,
                reply,
            } => {
                // Receiver may have given up waiting.
                let _ = reply.send(session.annotation_tapped(dataset, &id, current_bin));
            }
            Command::SetOverlayEnabled(enabled) => {
                session.set_overlay_enabled(enabled).ok();
            }
            Command::ToggleOverlayLayer(layer) => {
                session.toggle_overlay_layer(layer).ok();
            }
            Command::SetOverlayLayers(layers) => {
                session.set_overlay_layers(layers).ok();
            }
            Command::Shutdown => break,
        }
    }

    log::debug!("Map session stopped");
    session
}

impl SessionHandle {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.tx.send(command).await.map_err(|_| SessionError::Closed)
    }

    /// Replaces dataset `kind` with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn deliver(&self, kind: DatasetKind, records: Vec<RawRecord>) -> Result<(), SessionError> {
        self.send(Command::Deliver { kind, records }).await
    }

    /// Marks dataset `kind` as loading or done.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn set_loading(&self, kind: DatasetKind, value: bool) -> Result<(), SessionError> {
        self.send(Command::SetLoading { kind, value }).await
    }

    /// Reports a viewport change, timestamped now.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn region_did_change(&self, region: MapRegion) -> Result<(), SessionError> {
        self.send(Command::RegionChanged {
            region,
            at: Instant::now(),
        })
        .await
    }

    /// Reports a viewport change without waiting for queue space.
    ///
    /// Intended for render callbacks that must not block. Dropping an
    /// event under load is harmless since a later one supersedes it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] if the queue is full or
    /// [`SessionError::Closed`] if the session has stopped.
    pub fn try_region_did_change(&self, region: MapRegion) -> Result<(), SessionError> {
        self.tx
            .try_send(Command::RegionChanged {
                region,
                at: Instant::now(),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SessionError::Busy,
                mpsc::error::TrySendError::Closed(_) => SessionError::Closed,
            })
    }

    /// Resolves a tapped marker.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn annotation_tapped(
        &self,
        dataset: DatasetKind,
        id: impl Into<String>,
        current_bin: Option<i32>,
    ) -> Result<Option<TapTarget>, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Tapped {
            dataset,
            id: id.into(),
            current_bin,
            reply,
        })
        .await?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Turns the chart overlay on or off.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn set_overlay_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.send(Command::SetOverlayEnabled(enabled)).await
    }

    /// Adds or removes a chart layer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn toggle_overlay_layer(&self, layer: u32) -> Result<(), SessionError> {
        self.send(Command::ToggleOverlayLayer(layer)).await
    }

    /// Replaces the chart layer selection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub async fn set_overlay_layers(&self, layers: Vec<u32>) -> Result<(), SessionError> {
        self.send(Command::SetOverlayLayers(layers)).await
    }

    /// Stops the session task after the commands already queued.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has already stopped.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    /// Whether the session task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What happened to a dataset load started by [`spawn_loader`].
#[derive(Debug)]
pub enum LoadOutcome {
    /// The dataset was delivered to the session.
    Delivered {
        /// Number of records handed over, before position filtering.
        records: usize,
    },
    /// The source failed; the session was told loading finished.
    Failed(SourceError),
}

/// Loads `source` in the background and delivers it to the session.
///
/// The dataset is flagged as loading for the duration. Fetch failures are
/// logged and reported as [`LoadOutcome::Failed`]; only a closed session is
/// an error.
pub fn spawn_loader(
    handle: SessionHandle,
    source: Arc<dyn AnnotationSource>,
) -> JoinHandle<Result<LoadOutcome, SessionError>> {
    tokio::spawn(async move {
        let kind = source.dataset();
        handle.set_loading(kind, true).await?;

        log::debug!("Loading {} from {}", kind.label(), source.label());

        let outcome = match source.fetch().await {
            Ok(records) => {
                let count = records.len();
                handle.deliver(kind, records).await?;
                LoadOutcome::Delivered { records: count }
            }
            Err(e) => {
                log::warn!("Failed to load {} from {}: {e}", kind.label(), source.label());
                LoadOutcome::Failed(e)
            }
        };

        handle.set_loading(kind, false).await?;
        Ok(outcome)
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chart_map_annotation_models::{Coordinate, Span};
    use chart_map_config::MapConfig;
    use chart_map_overlay::{ChartOverlay, MemoryPreferenceStore};
    use chart_map_source::StaticSource;

    use super::*;
    use crate::testing::{RecordingSurface, SurfaceEvent};

    fn session(throttle_ms: u64) -> MapSession<RecordingSurface> {
        let config = MapConfig {
            throttle_interval_ms: throttle_ms,
            ..MapConfig::default()
        };
        let overlay = ChartOverlay::restore("map", Arc::new(MemoryPreferenceStore::default()));
        MapSession::new(&config, RecordingSurface::default(), overlay)
    }

    fn region(lat: f64, lon: f64) -> MapRegion {
        MapRegion::new(Coordinate::new(lat, lon), Span::new(0.05, 0.05))
    }

    struct FailingSource;

    #[async_trait]
    impl AnnotationSource for FailingSource {
        fn dataset(&self) -> DatasetKind {
            DatasetKind::BuoyStation
        }

        fn label(&self) -> &str {
            "failing"
        }

        async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
            Err(SourceError::Unavailable {
                message: "offline".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn loader_delivers_and_clears_loading() {
        let (handle, task) = spawn_session(session(300));
        handle.region_did_change(region(37.805, -122.415)).await.unwrap();

        let source = Arc::new(StaticSource::new(
            DatasetKind::NavUnit,
            vec![
                RawRecord::new("1", "Pier 39", 37.80, -122.41),
                RawRecord::new("2", "Pier 45", 37.81, -122.42),
            ],
        ));
        let outcome = spawn_loader(handle.clone(), source).await.unwrap().unwrap();
        assert!(matches!(outcome, LoadOutcome::Delivered { records: 2 }));

        handle.shutdown().await.unwrap();
        let session = task.await.unwrap();

        assert_eq!(session.rendered().len(), 2);
        assert!(!session.is_loading());
        let loading: Vec<bool> = session
            .surface()
            .events
            .iter()
            .filter_map(|event| match event {
                SurfaceEvent::Loading(value) => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(loading, vec![false, true, false]);
    }

    #[tokio::test]
    async fn failed_loader_reports_and_clears_loading() {
        let (handle, task) = spawn_session(session(300));
        let outcome = spawn_loader(handle.clone(), Arc::new(FailingSource))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            outcome,
            LoadOutcome::Failed(SourceError::Unavailable { .. })
        ));

        handle.shutdown().await.unwrap();
        let session = task.await.unwrap();
        assert!(!session.is_loading());
        assert!(session.aggregator().is_empty());
    }

    #[tokio::test]
    async fn throttled_region_is_flushed_by_task() {
        let (handle, task) = spawn_session(session(20));
        handle
            .deliver(
                DatasetKind::TidalHeightStation,
                vec![RawRecord::new("9414290", "San Francisco", 37.806, -122.465)],
            )
            .await
            .unwrap();

        handle.region_did_change(region(10.0, 10.0)).await.unwrap();
        handle.region_did_change(region(37.806, -122.465)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown().await.unwrap();
        let session = task.await.unwrap();

        assert_eq!(session.rendered().len(), 1);
        assert_eq!(session.rendered()[0].id(), "9414290");
    }

    #[tokio::test]
    async fn tap_is_answered_through_handle() {
        let (handle, task) = spawn_session(session(300));
        handle
            .deliver(
                DatasetKind::BuoyStation,
                vec![RawRecord::new("46026", "San Francisco Buoy", 37.75, -122.84)],
            )
            .await
            .unwrap();

        let target = handle
            .annotation_tapped(DatasetKind::BuoyStation, "46026", None)
            .await
            .unwrap();
        assert!(matches!(target, Some(TapTarget::BuoyStation(_))));

        let missing = handle
            .annotation_tapped(DatasetKind::NavUnit, "46026", None)
            .await
            .unwrap();
        assert!(missing.is_none());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loaders_all_land() {
        let (handle, task) = spawn_session(session(300));
        handle.region_did_change(region(37.8, -122.4)).await.unwrap();

        let loaders: Vec<_> = DatasetKind::ALL
            .into_iter()
            .enumerate()
            .map(|(k, kind)| {
                let shift = f64::from(u32::try_from(k).unwrap()) * 0.0001;
                let records = (0..20_u32)
                    .map(|i| {
                        let offset = f64::from(i).mul_add(0.0005, shift);
                        RawRecord::new(
                            format!("{kind}-{i}"),
                            format!("{kind} {i}"),
                            37.79 + offset,
                            -122.41 + offset,
                        )
                    })
                    .collect();
                spawn_loader(handle.clone(), Arc::new(StaticSource::new(kind, records)))
            })
            .collect();

        for loader in loaders {
            let outcome = loader.await.unwrap().unwrap();
            assert!(matches!(outcome, LoadOutcome::Delivered { records: 20 }));
        }

        handle.shutdown().await.unwrap();
        let session = task.await.unwrap();

        assert_eq!(session.aggregator().len(), 80);
        for kind in DatasetKind::ALL {
            assert_eq!(session.aggregator().count(kind), 20);
        }
        assert_eq!(session.rendered().len(), 80);
        assert_eq!(session.surface().shown.len(), 80);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn closed_session_rejects_commands() {
        let (handle, task) = spawn_session(session(300));
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            handle.set_overlay_enabled(true).await,
            Err(SessionError::Closed)
        ));
        assert!(matches!(
            handle.try_region_did_change(region(1.0, 1.0)),
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn overlay_commands_reach_surface() {
        let (handle, task) = spawn_session(session(300));
        handle.set_overlay_layers(vec![3]).await.unwrap();
        handle.toggle_overlay_layer(4).await.unwrap();
        handle.set_overlay_enabled(true).await.unwrap();
        handle.shutdown().await.unwrap();

        let session = task.await.unwrap();
        assert!(session.overlay().enabled);
        assert_eq!(
            session.overlay().layers.iter().copied().collect::<Vec<_>>(),
            vec![0, 3, 4]
        );
    }
}
