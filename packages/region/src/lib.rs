#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Throttle and deadzone filter for map region-change events.
//!
//! The rendering surface reports a region change on every frame of a pan or
//! zoom gesture. [`RegionChangeController`] lets through at most one event
//! per throttle interval and drops events that barely move the viewport, so
//! visible-set recomputation runs a few times per second at most.
//!
//! An event rejected only because it arrived too soon is kept as *pending*.
//! Once the throttle window has passed, [`RegionChangeController::flush_pending`]
//! offers it again, so the viewport where a gesture comes to rest is always
//! processed.

use std::time::{Duration, Instant};

use chart_map_annotation_models::MapRegion;
use chart_map_config::MapConfig;

/// Filters region-change events by time and by movement.
#[derive(Debug, Clone)]
pub struct RegionChangeController {
    throttle_interval: Duration,
    deadzone: f64,
    last_accepted: Option<(MapRegion, Instant)>,
    pending: Option<MapRegion>,
}

impl RegionChangeController {
    /// Creates a controller with an explicit throttle interval and
    /// deadzone (degrees).
    #[must_use]
    pub const fn new(throttle_interval: Duration, deadzone: f64) -> Self {
        Self {
            throttle_interval,
            deadzone,
            last_accepted: None,
            pending: None,
        }
    }

    /// Creates a controller from the throttle and deadzone settings in
    /// `config`.
    #[must_use]
    pub const fn from_config(config: &MapConfig) -> Self {
        Self::new(config.throttle_interval(), config.deadzone_degrees)
    }

    /// Offers a region change observed at `now`.
    ///
    /// Returns the region if it should be processed:
    ///
    /// 1. Rejected if less than the throttle interval has passed since the
    ///    last accepted region (the region becomes pending).
    /// 2. Rejected if the center latitude, center longitude, and latitude
    ///    span all moved less than the deadzone.
    /// 3. Accepted otherwise.
    pub fn accept(&mut self, region: MapRegion, now: Instant) -> Option<MapRegion> {
        if let Some((last, at)) = self.last_accepted {
            if now.saturating_duration_since(at) < self.throttle_interval {
                log::trace!("Region change throttled");
                self.pending = Some(region);
                return None;
            }

            if self.within_deadzone(&last, &region) {
                log::trace!("Region change below deadzone");
                self.pending = None;
                return None;
            }
        }

        self.last_accepted = Some((region, now));
        self.pending = None;
        Some(region)
    }

    /// Re-offers the pending region, if any.
    ///
    /// Returns the region if it is now accepted. If the throttle window has
    /// not passed yet it stays pending.
    pub fn flush_pending(&mut self, now: Instant) -> Option<MapRegion> {
        let region = self.pending.take()?;
        self.accept(region, now)
    }

    /// When the pending region can next be flushed, if there is one.
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending?;
        self.last_accepted
            .map(|(_, at)| at + self.throttle_interval)
    }

    /// Whether a throttled region is waiting to be flushed.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The most recently accepted region.
    #[must_use]
    pub fn last_accepted(&self) -> Option<MapRegion> {
        self.last_accepted.map(|(region, _)| region)
    }

    /// Forgets all history so the next event is accepted unconditionally.
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.pending = None;
    }

    fn within_deadzone(&self, last: &MapRegion, next: &MapRegion) -> bool {
        (next.center.latitude - last.center.latitude).abs() < self.deadzone
            && (next.center.longitude - last.center.longitude).abs() < self.deadzone
            && (next.span.latitude_delta - last.span.latitude_delta).abs() < self.deadzone
    }
}

impl Default for RegionChangeController {
    fn default() -> Self {
        Self::from_config(&MapConfig::default())
    }
}
