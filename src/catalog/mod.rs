//! Cached view of all known devices and sensors
//!
//! The catalog fetches devices once, then the sensors of every device, and
//! keeps both for its lifetime. Cache fills are idempotent: two tasks racing
//! to fill the same slot fetch the same upstream data and the first stored
//! value is kept. The lock is never held across an await.

pub mod normalize;
pub mod resolver;
pub mod source;

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ahash::AHashMap;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::config::{CatalogSettings, SensorMapping};
use crate::core::error::{AgentError, Result};
use crate::core::types::{DeviceId, SensorId, TimeRange, Timestamp};
use crate::llm::context::SystemContext;

pub use resolver::{MatchReason, SensorMatch, SensorResolver};
pub use source::{Device, RawReading, RawSensor, SensorSource, StaticSource};

/// A catalog entry: one sensor with its normalized type and location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub sensor_id: SensorId,
    /// Type name as reported upstream
    pub raw_type: String,
    /// `None` when no keyword list matched the raw type
    pub normalized_type: Option<String>,
    pub device_id: DeviceId,
    /// Raw name of the owning device
    pub device_name: String,
    /// Human-readable location, e.g. `Node 15`
    pub location: String,
    pub unit: String,
    pub created: Option<Timestamp>,
    pub modified: Option<Timestamp>,
}

impl SensorRecord {
    fn from_raw(raw: RawSensor, device: &Device, mapping: &SensorMapping) -> Self {
        Self {
            sensor_id: raw.id,
            normalized_type: normalize::sensor_type(&raw.sensor_type, mapping).map(String::from),
            raw_type: raw.sensor_type,
            device_id: device.id,
            device_name: device.name.clone(),
            location: normalize::human_readable_location(&device.name),
            unit: raw.unit,
            created: raw.created,
            modified: raw.modified,
        }
    }
}

#[derive(Default)]
struct CatalogCache {
    devices: Option<Arc<Vec<Device>>>,
    sensors_by_device: AHashMap<DeviceId, Arc<Vec<SensorRecord>>>,
    all_sensors: Option<Arc<Vec<SensorRecord>>>,
    skipped_devices: usize,
}

/// Sensor catalog over an upstream source
pub struct SensorCatalog {
    source: Arc<dyn SensorSource>,
    job_id: u32,
    mapping: SensorMapping,
    earliest_data: Timestamp,
    cache: RwLock<CatalogCache>,
}

impl SensorCatalog {
    pub fn new(source: Arc<dyn SensorSource>, settings: &CatalogSettings) -> Self {
        Self {
            source,
            job_id: settings.job_id,
            mapping: settings.sensor_mapping.clone(),
            earliest_data: settings.earliest_data,
            cache: RwLock::new(CatalogCache::default()),
        }
    }

    pub fn source(&self) -> &Arc<dyn SensorSource> {
        &self.source
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, CatalogCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, CatalogCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// All devices of the configured job (memoized)
    pub async fn list_devices(&self) -> Result<Arc<Vec<Device>>> {
        let cached = self.read_cache().devices.clone();
        if let Some(devices) = cached {
            return Ok(devices);
        }

        let fetched = self
            .source
            .list_devices(self.job_id)
            .await
            .map_err(|e| AgentError::Catalog(format!("Failed to list devices: {}", e)))?;
        debug!(job_id = self.job_id, devices = fetched.len(), "Fetched device list");

        let fetched = Arc::new(fetched);
        let mut cache = self.write_cache();
        Ok(cache.devices.get_or_insert(fetched).clone())
    }

    /// Sensors of one device (memoized per device)
    pub async fn list_sensors(&self, device: &Device) -> Result<Arc<Vec<SensorRecord>>> {
        let cached = self.read_cache().sensors_by_device.get(&device.id).cloned();
        if let Some(sensors) = cached {
            return Ok(sensors);
        }

        let raw = self.source.list_sensors(device.id).await?;
        let records: Vec<SensorRecord> = raw
            .into_iter()
            .map(|s| SensorRecord::from_raw(s, device, &self.mapping))
            .collect();

        let records = Arc::new(records);
        let mut cache = self.write_cache();
        Ok(cache
            .sensors_by_device
            .entry(device.id)
            .or_insert(records)
            .clone())
    }

    /// Every sensor of every device, in device then sensor order (memoized)
    ///
    /// Devices whose sensor listing fails are skipped and counted. Fails only
    /// when the device list itself cannot be fetched or every device failed.
    pub async fn all_sensors(&self) -> Result<Arc<Vec<SensorRecord>>> {
        let cached = self.read_cache().all_sensors.clone();
        if let Some(sensors) = cached {
            return Ok(sensors);
        }

        let devices = self.list_devices().await?;
        let mut sensors = Vec::new();
        let mut skipped = 0;

        for device in devices.iter() {
            match self.list_sensors(device).await {
                Ok(records) => sensors.extend(records.iter().cloned()),
                Err(e) => {
                    skipped += 1;
                    warn!(device = %device.id, name = %device.name, error = %e, "Could not list sensors, skipping device");
                }
            }
        }

        if !devices.is_empty() && skipped == devices.len() {
            return Err(AgentError::Catalog(format!(
                "Could not list sensors for any of {} devices",
                devices.len()
            )));
        }

        if skipped > 0 {
            warn!(skipped, total = devices.len(), "Catalog populated with skipped devices");
        } else {
            info!(devices = devices.len(), sensors = sensors.len(), "Catalog populated");
        }

        let sensors = Arc::new(sensors);
        let mut cache = self.write_cache();
        if cache.all_sensors.is_none() {
            cache.skipped_devices = skipped;
        }
        Ok(cache.all_sensors.get_or_insert(sensors).clone())
    }

    /// Number of devices skipped during the last successful population
    pub fn skipped_devices(&self) -> usize {
        self.read_cache().skipped_devices
    }

    /// Sorted, de-duplicated normalized sensor types
    pub async fn available_sensor_types(&self) -> Result<Vec<String>> {
        let sensors = self.all_sensors().await?;
        let types: BTreeSet<&str> = sensors
            .iter()
            .filter_map(|s| s.normalized_type.as_deref())
            .collect();
        Ok(types.into_iter().map(String::from).collect())
    }

    /// Sorted, de-duplicated human-readable locations of located devices
    pub async fn available_locations(&self) -> Result<Vec<String>> {
        let devices = self.list_devices().await?;
        let locations: BTreeSet<String> = devices
            .iter()
            .filter(|d| !d.location.trim().is_empty())
            .map(|d| normalize::human_readable_location(&d.name))
            .collect();
        Ok(locations.into_iter().collect())
    }

    /// Span of available data
    ///
    /// The source's own bounds when it reports them, otherwise the configured
    /// earliest timestamp up to now.
    pub async fn time_range(&self) -> TimeRange {
        match self.source.time_bounds().await {
            Ok(Some(range)) => range,
            Ok(None) => TimeRange::new(self.earliest_data, Utc::now()),
            Err(e) => {
                warn!(error = %e, "Source time bounds unavailable, using configured range");
                TimeRange::new(self.earliest_data, Utc::now())
            }
        }
    }

    /// Snapshot of sensor types, locations and time range
    pub async fn system_context(&self) -> Result<SystemContext> {
        Ok(SystemContext {
            available_sensors: self.available_sensor_types().await?,
            available_locations: self.available_locations().await?,
            time_range: self.time_range().await,
        })
    }

    /// Resolve a sensor for `(sensor_type, location)`
    pub async fn find_sensor(
        &self,
        sensor_type: &str,
        location: &str,
    ) -> Result<Option<SensorRecord>> {
        let sensors = self.all_sensors().await?;
        let found = SensorResolver::new(&sensors).resolve(sensor_type, location);
        if let Some(m) = &found {
            debug!(
                sensor = %m.sensor.sensor_id,
                location = %m.sensor.location,
                reason = ?m.reason,
                "Resolved sensor"
            );
        }
        Ok(found.map(|m| m.sensor.clone()))
    }

    /// Readings of one sensor within `[start, end]`
    pub async fn fetch_readings(
        &self,
        sensor: SensorId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<RawReading>> {
        self.source.readings(sensor, start, end).await
    }

    /// Drop all memoized devices, sensors and derived state
    pub fn clear_cache(&self) {
        *self.write_cache() = CatalogCache::default();
        debug!("Catalog cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FIXTURE: &str = r#"{
        "devices": [
            {"id": 1, "name": "15_9279", "location": "Level 3", "sensors": [
                {"id": 10, "sensor_type": "Temperature", "unit": "°C"},
                {"id": 11, "sensor_type": "Relative Humidity", "unit": "%"}
            ]},
            {"id": 2, "name": "16_1200", "location": "Level 4", "sensors": [
                {"id": 20, "sensor_type": "Battery", "unit": "V"}
            ]},
            {"id": 3, "name": "spare", "location": "", "sensors": [
                {"id": 30, "sensor_type": "CO2", "unit": "ppm"}
            ]}
        ]
    }"#;

    /// Counts upstream device listings
    struct CountingSource {
        inner: StaticSource,
        device_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SensorSource for CountingSource {
        async fn list_devices(&self, job_id: u32) -> Result<Vec<Device>> {
            self.device_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_devices(job_id).await
        }

        async fn list_sensors(&self, device: DeviceId) -> Result<Vec<RawSensor>> {
            self.inner.list_sensors(device).await
        }

        async fn readings(
            &self,
            sensor: SensorId,
            start: Timestamp,
            end: Timestamp,
        ) -> Result<Vec<RawReading>> {
            self.inner.readings(sensor, start, end).await
        }
    }

    fn counting() -> Arc<CountingSource> {
        Arc::new(CountingSource {
            inner: StaticSource::from_json_str(FIXTURE).unwrap(),
            device_calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_available_types_and_locations() {
        let catalog = SensorCatalog::new(counting(), &CatalogSettings::default());
        assert_eq!(
            catalog.available_sensor_types().await.unwrap(),
            vec!["co2", "humidity", "temperature"]
        );
        assert_eq!(
            catalog.available_locations().await.unwrap(),
            vec!["Node 15", "Node 16"]
        );
    }

    #[tokio::test]
    async fn test_devices_are_memoized_until_cleared() {
        let source = counting();
        let catalog = SensorCatalog::new(source.clone(), &CatalogSettings::default());

        catalog.list_devices().await.unwrap();
        catalog.all_sensors().await.unwrap();
        catalog.available_locations().await.unwrap();
        assert_eq!(source.device_calls.load(Ordering::SeqCst), 1);

        catalog.clear_cache();
        catalog.list_devices().await.unwrap();
        assert_eq!(source.device_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_find_sensor_uses_normalized_type() {
        let catalog = SensorCatalog::new(counting(), &CatalogSettings::default());
        let found = catalog.find_sensor("humidity", "Node 15").await.unwrap().unwrap();
        assert_eq!(found.sensor_id, SensorId(11));
        assert_eq!(found.unit, "%");
        assert!(catalog.find_sensor("temperature", "Node 16").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_time_range_falls_back_to_configured_start() {
        let settings = CatalogSettings::default();
        let catalog = SensorCatalog::new(counting(), &settings);
        let range = catalog.time_range().await;
        assert_eq!(range.start, settings.earliest_data);
        assert!(range.end <= Utc::now());
    }
}
