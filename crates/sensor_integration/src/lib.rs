use serde::{Deserialize, Serialize};
use shared::now_millis;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_SAMPLE_CAPACITY: usize = 64;

/// Raw three-axis acceleration in the sensor's native units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl MotionSample {
    pub const ZERO: MotionSample = MotionSample {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length of the per-axis difference to `previous`.
    pub fn delta_magnitude(&self, previous: &MotionSample) -> f64 {
        let dx = f64::from(self.x) - f64::from(previous.x);
        let dy = f64::from(self.y) - f64::from(previous.y);
        let dz = f64::from(self.z) - f64::from(previous.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A sample stamped with its arrival time by the sensor source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sample: MotionSample,
    pub timestamp_ms: i64,
}

pub trait MotionSensor: Send + Sync {
    /// `None` when the device has no accelerometer.
    fn subscribe_samples(&self) -> Option<broadcast::Receiver<SensorReading>>;
    fn name(&self) -> &str {
        "accelerometer"
    }
}

/// Sensor whose readings are pushed by the host (platform bridge, replay, tests).
pub struct ChannelMotionSensor {
    name: String,
    readings: broadcast::Sender<SensorReading>,
}

impl ChannelMotionSensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_SAMPLE_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (readings, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            readings,
        }
    }

    /// Returns how many subscribers received the reading.
    pub fn push(&self, sample: MotionSample, timestamp_ms: i64) -> usize {
        let reading = SensorReading {
            sample,
            timestamp_ms,
        };
        match self.readings.send(reading) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(sensor = %self.name, "dropping motion sample with no subscribers");
                0
            }
        }
    }

    pub fn push_now(&self, sample: MotionSample) -> usize {
        self.push(sample, now_millis())
    }

    pub fn subscriber_count(&self) -> usize {
        self.readings.receiver_count()
    }
}

impl MotionSensor for ChannelMotionSensor {
    fn subscribe_samples(&self) -> Option<broadcast::Receiver<SensorReading>> {
        Some(self.readings.subscribe())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct UnavailableMotionSensor;

impl MotionSensor for UnavailableMotionSensor {
    fn subscribe_samples(&self) -> Option<broadcast::Receiver<SensorReading>> {
        None
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_magnitude_is_euclidean() {
        let previous = MotionSample::new(1.0, 2.0, 2.0);
        let current = MotionSample::new(4.0, 6.0, 2.0);
        assert!((current.delta_magnitude(&previous) - 5.0).abs() < f64::EPSILON);
        assert_eq!(MotionSample::ZERO.delta_magnitude(&MotionSample::ZERO), 0.0);
    }

    #[tokio::test]
    async fn pushes_reach_every_subscriber() {
        let sensor = ChannelMotionSensor::new("test");
        assert_eq!(sensor.push(MotionSample::ZERO, 1), 0);

        let mut first = sensor.subscribe_samples().expect("available");
        let mut second = sensor.subscribe_samples().expect("available");
        assert_eq!(sensor.subscriber_count(), 2);
        assert_eq!(sensor.push(MotionSample::new(1.0, 0.0, 0.0), 10), 2);

        let a = first.recv().await.expect("first reading");
        let b = second.recv().await.expect("second reading");
        assert_eq!(a, b);
        assert_eq!(a.timestamp_ms, 10);
    }

    #[test]
    fn unavailable_sensor_has_no_stream() {
        assert!(UnavailableMotionSensor.subscribe_samples().is_none());
    }
}
