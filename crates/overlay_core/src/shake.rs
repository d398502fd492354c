//! Shake detection: a debouncer that turns raw accelerometer readings into discrete
//! triggers, and a detector that runs it against a sensor subscription.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use sensor_integration::{MotionSample, MotionSensor, SensorReading};
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::broadcast::error::RecvError,
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::lock::lock_or_recover;

pub const SHAKE_THRESHOLD: f64 = 15.0;
pub const SHAKE_COOLDOWN: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShakeConfig {
    pub threshold: f64,
    pub cooldown: Duration,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            threshold: SHAKE_THRESHOLD,
            cooldown: SHAKE_COOLDOWN,
        }
    }
}

/// Compares each reading with the previous one; a delta above the threshold triggers,
/// then every reading inside the cooldown window is ignored outright.
///
/// The delta is taken on raw samples, gravity included.
#[derive(Debug, Clone)]
pub struct ShakeDebouncer {
    config: ShakeConfig,
    last_sample: MotionSample,
    last_trigger_ms: Option<i64>,
}

impl ShakeDebouncer {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            config,
            last_sample: MotionSample::ZERO,
            last_trigger_ms: None,
        }
    }

    pub fn config(&self) -> ShakeConfig {
        self.config
    }

    /// Returns `true` when the reading is a trigger.
    pub fn observe(&mut self, reading: SensorReading) -> bool {
        if let Some(last_trigger) = self.last_trigger_ms {
            let cooldown_ms = i64::try_from(self.config.cooldown.as_millis()).unwrap_or(i64::MAX);
            if reading.timestamp_ms.saturating_sub(last_trigger) < cooldown_ms {
                return false;
            }
        }

        let magnitude = reading.sample.delta_magnitude(&self.last_sample);
        self.last_sample = reading.sample;
        if magnitude > self.config.threshold {
            self.last_trigger_ms = Some(reading.timestamp_ms);
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.last_sample = MotionSample::ZERO;
        self.last_trigger_ms = None;
    }
}

#[derive(Debug, Error)]
pub enum ShakeError {
    #[error("shake detection needs a running tokio runtime")]
    NoRuntime,
    #[error("motion sensor '{0}' is not available")]
    SensorUnavailable(String),
}

#[derive(Default)]
struct DetectorState {
    running: bool,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Restartable shake detector. Each `start` begins from a fresh debouncer.
///
/// `on_trigger` runs on the runtime while the detector's state lock is held, which is what
/// guarantees that no trigger is delivered once `stop` has returned. It must therefore not
/// call back into `start` or `stop` of the same detector.
pub struct ShakeDetector {
    sensor: Arc<dyn MotionSensor>,
    config: ShakeConfig,
    state: Arc<Mutex<DetectorState>>,
}

impl ShakeDetector {
    pub fn new(sensor: Arc<dyn MotionSensor>, config: ShakeConfig) -> Self {
        Self {
            sensor,
            config,
            state: Arc::new(Mutex::new(DetectorState::default())),
        }
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.state, "shake detector state").running
    }

    /// Subscribes to the sensor. Starting a running detector is a no-op.
    pub fn start<F>(&self, on_trigger: F) -> Result<(), ShakeError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| ShakeError::NoRuntime)?;
        let mut state = lock_or_recover(&self.state, "shake detector start");
        if state.running {
            return Ok(());
        }
        let mut readings = self
            .sensor
            .subscribe_samples()
            .ok_or_else(|| ShakeError::SensorUnavailable(self.sensor.name().to_string()))?;

        state.generation += 1;
        state.running = true;
        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let mut debouncer = ShakeDebouncer::new(self.config);
        let sensor = self.sensor.name().to_string();

        state.task = Some(runtime.spawn(async move {
            loop {
                let reading = match readings.recv().await {
                    Ok(reading) => reading,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(%sensor, skipped, "shake detector lagged behind sensor");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !debouncer.observe(reading) {
                    continue;
                }

                let state = lock_or_recover(&shared, "shake detector trigger");
                if !state.running || state.generation != generation {
                    break;
                }
                debug!(%sensor, timestamp_ms = reading.timestamp_ms, "shake detected");
                on_trigger();
            }
        }));
        info!(sensor = %self.sensor.name(), "shake detection started");
        Ok(())
    }

    /// No trigger is delivered after this returns, even for a reading already in flight.
    pub fn stop(&self) {
        let mut state = lock_or_recover(&self.state, "shake detector stop");
        if !state.running {
            return;
        }
        state.running = false;
        state.generation += 1;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        info!(sensor = %self.sensor.name(), "shake detection stopped");
    }
}

impl Drop for ShakeDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "tests/shake_tests.rs"]
mod tests;
