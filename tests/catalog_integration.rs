//! Integration tests for the sensor catalog
//!
//! Covers the catalog as the workflow sees it: partial upstream failures,
//! location resolution order, cache lifetime and fixture loading.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sensor_agent::catalog::{
    Device, RawReading, RawSensor, SensorCatalog, SensorSource, StaticSource,
};
use sensor_agent::core::config::CatalogSettings;
use sensor_agent::core::error::{AgentError, Result};
use sensor_agent::core::types::{DeviceId, SensorId, TimeRange, Timestamp};

const FIXTURE: &str = r#"{
    "devices": [
        {"id": 1, "name": "15_9279", "location": "Level 3", "sensors": [
            {"id": 10, "sensor_type": "Temperature", "unit": "°C"}
        ]},
        {"id": 2, "name": "1_0001", "location": "Basement", "sensors": [
            {"id": 20, "sensor_type": "Temp Probe", "unit": "°C"}
        ]},
        {"id": 3, "name": "22_4410", "location": "Roof", "sensors": [
            {"id": 30, "sensor_type": "Relative Humidity", "unit": "%"},
            {"id": 31, "sensor_type": "Temperature", "unit": "°C"}
        ]}
    ]
}"#;

/// Fails sensor listing for chosen devices and never reports time bounds
struct FlakySource {
    inner: StaticSource,
    broken: Vec<DeviceId>,
    sensor_calls: AtomicUsize,
}

#[async_trait]
impl SensorSource for FlakySource {
    async fn list_devices(&self, job_id: u32) -> Result<Vec<Device>> {
        self.inner.list_devices(job_id).await
    }

    async fn list_sensors(&self, device: DeviceId) -> Result<Vec<RawSensor>> {
        self.sensor_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(&device) {
            return Err(AgentError::Source(format!("device {} timed out", device)));
        }
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

    async fn time_bounds(&self) -> Result<Option<TimeRange>> {
        Err(AgentError::Source("bounds endpoint unavailable".into()))
    }
}

fn flaky(broken: &[u32]) -> Arc<FlakySource> {
    Arc::new(FlakySource {
        inner: StaticSource::from_json_str(FIXTURE).unwrap(),
        broken: broken.iter().map(|&id| DeviceId(id)).collect(),
        sensor_calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn test_failed_device_is_skipped() {
    let catalog = SensorCatalog::new(flaky(&[2]), &CatalogSettings::default());

    let sensors = catalog.all_sensors().await.unwrap();
    assert_eq!(sensors.len(), 3);
    assert_eq!(catalog.skipped_devices(), 1);

    // The device itself is still a known location, but its sensor is gone,
    // so the request falls through to the substring match on "Node 15"
    let locations = catalog.available_locations().await.unwrap();
    assert_eq!(locations, vec!["Node 1", "Node 15", "Node 22"]);
    let found = catalog.find_sensor("temperature", "Node 1").await.unwrap().unwrap();
    assert_eq!(found.sensor_id, SensorId(10));
}

#[tokio::test]
async fn test_every_device_failing_is_an_error() {
    let source = flaky(&[1, 2, 3]);
    let catalog = SensorCatalog::new(source.clone(), &CatalogSettings::default());

    let err = catalog.all_sensors().await.unwrap_err();
    assert!(matches!(err, AgentError::Catalog(_)));

    // Nothing was cached, so the next call asks upstream again
    assert!(catalog.available_sensor_types().await.is_err());
    assert_eq!(source.sensor_calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_exact_location_beats_earlier_substring() {
    let catalog = SensorCatalog::new(flaky(&[]), &CatalogSettings::default());

    // "Node 15" contains "node 1" and comes first, but "Node 1" is exact
    let found = catalog.find_sensor("temperature", "node 1").await.unwrap().unwrap();
    assert_eq!(found.sensor_id, SensorId(20));
    assert_eq!(found.location, "Node 1");
}

#[tokio::test]
async fn test_substring_and_device_name_matches() {
    let catalog = SensorCatalog::new(flaky(&[]), &CatalogSettings::default());

    let by_location = catalog.find_sensor("temperature", "22").await.unwrap().unwrap();
    assert_eq!(by_location.sensor_id, SensorId(31));

    let by_device = catalog.find_sensor("temperature", "9279").await.unwrap().unwrap();
    assert_eq!(by_device.sensor_id, SensorId(10));

    assert!(catalog.find_sensor("humidity", "15").await.unwrap().is_none());
    assert!(catalog.find_sensor("temperature", "   ").await.unwrap().is_none());
}

#[tokio::test]
async fn test_clear_cache_is_idempotent() {
    let source = flaky(&[]);
    let catalog = SensorCatalog::new(source.clone(), &CatalogSettings::default());

    catalog.all_sensors().await.unwrap();
    catalog.clear_cache();
    catalog.clear_cache();
    assert_eq!(catalog.skipped_devices(), 0);

    catalog.all_sensors().await.unwrap();
    catalog.all_sensors().await.unwrap();
    assert_eq!(source.sensor_calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_time_bounds_error_uses_configured_range() {
    let settings = CatalogSettings::default();
    let catalog = SensorCatalog::new(flaky(&[]), &settings);

    let context = catalog.system_context().await.unwrap();
    assert_eq!(context.time_range.start, settings.earliest_data);
    assert_eq!(context.available_sensors, vec!["humidity", "temperature"]);
}

#[tokio::test]
async fn test_job_mismatch_is_a_catalog_error() {
    let source = Arc::new(StaticSource::from_json_str(r#"{"job_id": 7, "devices": []}"#).unwrap());
    let settings = CatalogSettings {
        job_id: 8,
        ..CatalogSettings::default()
    };
    let catalog = SensorCatalog::new(source, &settings);

    let err = catalog.list_devices().await.unwrap_err();
    assert!(err.to_string().contains("Unknown job id 8"), "got {err}");
}

#[tokio::test]
async fn test_fixture_loaded_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FIXTURE.as_bytes()).unwrap();

    let source = Arc::new(StaticSource::load(file.path()).unwrap());
    let catalog = SensorCatalog::new(source, &CatalogSettings::default());
    assert_eq!(catalog.all_sensors().await.unwrap().len(), 4);

    let missing = StaticSource::load(Path::new("/nonexistent/catalog.json"));
    assert!(matches!(missing, Err(AgentError::Source(_))));
}

#[tokio::test]
async fn test_demo_fixture_is_consistent() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/demo_catalog.json");
    let source = Arc::new(StaticSource::load(&path).unwrap());
    let settings = CatalogSettings {
        job_id: 42,
        ..CatalogSettings::default()
    };
    let catalog = SensorCatalog::new(source, &settings);

    let context = catalog.system_context().await.unwrap();
    assert_eq!(context.available_sensors, vec!["co2", "humidity", "temperature"]);
    assert_eq!(context.available_locations, vec!["Node 15", "Node 16", "Node 17"]);
    assert_eq!(context.time_range.start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
}
