//! Sensor resolution - maps a (sensor type, location) reference to a catalog sensor

use crate::catalog::SensorRecord;

/// How a sensor matched the requested location, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchReason {
    /// Human-readable location equals the request (case-insensitive)
    ExactLocation,
    /// Request is contained in the human-readable location
    LocationSubstring,
    /// Request is contained in the raw device name
    DeviceNameSubstring,
}

/// A matched sensor with the rule that matched it
#[derive(Debug, Clone)]
pub struct SensorMatch<'a> {
    pub sensor: &'a SensorRecord,
    pub reason: MatchReason,
}

/// Resolves location references against a catalog snapshot
pub struct SensorResolver<'a> {
    sensors: &'a [SensorRecord],
}

impl<'a> SensorResolver<'a> {
    pub fn new(sensors: &'a [SensorRecord]) -> Self {
        Self { sensors }
    }

    /// Find the best sensor of `sensor_type` for `location`
    ///
    /// The strongest matching rule wins across all candidates; within one
    /// rule the earliest-registered sensor wins.
    pub fn resolve(&self, sensor_type: &str, location: &str) -> Option<SensorMatch<'a>> {
        let wanted = location.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        let mut best: Option<SensorMatch<'a>> = None;

        for sensor in self.sensors {
            if sensor.normalized_type.as_deref() != Some(sensor_type) {
                continue;
            }

            let Some(reason) = Self::match_reason(sensor, &wanted) else {
                continue;
            };

            if reason == MatchReason::ExactLocation {
                return Some(SensorMatch { sensor, reason });
            }

            if best.as_ref().map_or(true, |b| reason < b.reason) {
                best = Some(SensorMatch { sensor, reason });
            }
        }

        best
    }

    fn match_reason(sensor: &SensorRecord, wanted: &str) -> Option<MatchReason> {
        let readable = sensor.location.to_lowercase();
        if readable == wanted {
            Some(MatchReason::ExactLocation)
        } else if readable.contains(wanted) {
            Some(MatchReason::LocationSubstring)
        } else if sensor.device_name.to_lowercase().contains(wanted) {
            Some(MatchReason::DeviceNameSubstring)
        } else {
            None
        }
    }
}
