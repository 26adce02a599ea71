//! Upstream sensor source seam and the in-memory fixture source
//!
//! The remote sensor API is reached only through `SensorSource`. The crate
//! ships `StaticSource`, which serves devices, sensors and readings from a
//! JSON fixture; a network-backed source plugs in behind the same trait.

use std::fs;
use std::path::Path;

use ahash::AHashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{AgentError, Result};
use crate::core::types::{DeviceId, SensorId, TimeRange, Timestamp};

/// A sensing device (data acquisition node) as reported upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub physical_id: String,
    /// Raw device name, e.g. `15_9279`
    pub name: String,
    /// Free-form installation location. Devices without one are not offered
    /// as query locations.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub created: Option<Timestamp>,
    #[serde(default)]
    pub modified: Option<Timestamp>,
}

/// A sensor channel as reported upstream, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensor {
    pub id: SensorId,
    /// Upstream type name, e.g. `Temperature (Thermistor)`
    pub sensor_type: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub created: Option<Timestamp>,
    #[serde(default)]
    pub modified: Option<Timestamp>,
}

/// One measured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub timestamp: Timestamp,
    pub value: f64,
    #[serde(default)]
    pub quality_flag: Option<String>,
}

/// Narrow interface to the upstream sensor data provider
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn list_devices(&self, job_id: u32) -> Result<Vec<Device>>;

    async fn list_sensors(&self, device: DeviceId) -> Result<Vec<RawSensor>>;

    /// Readings with `start <= timestamp <= end`, oldest first
    async fn readings(
        &self,
        sensor: SensorId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<RawReading>>;

    /// Span of stored data, when the source can report it
    async fn time_bounds(&self) -> Result<Option<TimeRange>> {
        Ok(None)
    }
}

/// Fixture file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFixture {
    /// When set, only this job id is served
    #[serde(default)]
    pub job_id: Option<u32>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub devices: Vec<DeviceFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFixture {
    pub id: DeviceId,
    #[serde(default)]
    pub physical_id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub created: Option<Timestamp>,
    #[serde(default)]
    pub modified: Option<Timestamp>,
    #[serde(default)]
    pub sensors: Vec<SensorFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorFixture {
    pub id: SensorId,
    pub sensor_type: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub created: Option<Timestamp>,
    #[serde(default)]
    pub modified: Option<Timestamp>,
    #[serde(default)]
    pub readings: Vec<RawReading>,
}

/// In-memory sensor source backed by a fixture
pub struct StaticSource {
    job_id: Option<u32>,
    time_range: Option<TimeRange>,
    devices: Vec<Device>,
    sensors: AHashMap<DeviceId, Vec<RawSensor>>,
    readings: AHashMap<SensorId, Vec<RawReading>>,
}

impl StaticSource {
    pub fn new(fixture: SourceFixture) -> Self {
        let mut devices = Vec::with_capacity(fixture.devices.len());
        let mut sensors = AHashMap::new();
        let mut readings = AHashMap::new();

        for device in fixture.devices {
            let mut channel_list = Vec::with_capacity(device.sensors.len());
            for sensor in device.sensors {
                let mut series = sensor.readings;
                series.sort_by_key(|r| r.timestamp);
                readings.insert(sensor.id, series);
                channel_list.push(RawSensor {
                    id: sensor.id,
                    sensor_type: sensor.sensor_type,
                    unit: sensor.unit,
                    created: sensor.created,
                    modified: sensor.modified,
                });
            }
            sensors.insert(device.id, channel_list);
            devices.push(Device {
                id: device.id,
                physical_id: device.physical_id,
                name: device.name,
                location: device.location,
                created: device.created,
                modified: device.modified,
            });
        }

        Self {
            job_id: fixture.job_id,
            time_range: fixture.time_range,
            devices,
            sensors,
            readings,
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let fixture: SourceFixture = serde_json::from_str(content)?;
        Ok(Self::new(fixture))
    }

    /// Load a fixture from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AgentError::Source(format!("Failed to read fixture {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }
}

#[async_trait]
impl SensorSource for StaticSource {
    async fn list_devices(&self, job_id: u32) -> Result<Vec<Device>> {
        match self.job_id {
            Some(served) if served != job_id => {
                Err(AgentError::Source(format!("Unknown job id {}", job_id)))
            }
            _ => Ok(self.devices.clone()),
        }
    }

    async fn list_sensors(&self, device: DeviceId) -> Result<Vec<RawSensor>> {
        self.sensors
            .get(&device)
            .cloned()
            .ok_or_else(|| AgentError::Source(format!("Unknown device {}", device)))
    }

    async fn readings(
        &self,
        sensor: SensorId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<RawReading>> {
        let series = self
            .readings
            .get(&sensor)
            .ok_or_else(|| AgentError::Source(format!("Unknown sensor {}", sensor)))?;

        Ok(series
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .cloned()
            .collect())
    }

    async fn time_bounds(&self) -> Result<Option<TimeRange>> {
        Ok(self.time_range)
    }
}
