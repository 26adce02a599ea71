//! Data retrieval collaborator: task parameters in, readings out

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::catalog::SensorCatalog;
use crate::core::error::{AgentError, Result};
use crate::data::{DataQuery, Dataset, Reading, SkippedLocation};

/// Fetches readings for a query
#[async_trait]
pub trait DataRetriever: Send + Sync {
    async fn retrieve(&self, query: &DataQuery) -> Result<Dataset>;
}

/// Retrieval through the sensor catalog
///
/// Each location is resolved to one sensor. With several locations, a
/// location that fails is dropped and recorded in `Dataset::skipped`; the
/// retrieval fails only when every location failed.
pub struct CatalogRetriever {
    catalog: Arc<SensorCatalog>,
}

impl CatalogRetriever {
    pub fn new(catalog: Arc<SensorCatalog>) -> Self {
        Self { catalog }
    }

    async fn retrieve_location(&self, query: &DataQuery, location: &str) -> Result<Vec<Reading>> {
        let sensor = self
            .catalog
            .find_sensor(&query.sensor_type, location)
            .await?
            .ok_or_else(|| {
                AgentError::Retrieval(format!(
                    "No {} sensor found for location: {}",
                    query.sensor_type, location
                ))
            })?;

        let readings = self
            .catalog
            .fetch_readings(sensor.sensor_id, query.start_time, query.end_time)
            .await
            .map_err(|e| {
                AgentError::Retrieval(format!("Error retrieving readings for {}: {}", location, e))
            })?;

        debug!(
            location,
            sensor = %sensor.sensor_id,
            rows = readings.len(),
            "Fetched readings"
        );

        Ok(readings
            .into_iter()
            .map(|r| Reading {
                timestamp: r.timestamp,
                value: r.value,
                unit: sensor.unit.clone(),
                location: location.to_string(),
                quality_flag: r.quality_flag,
            })
            .collect())
    }
}

#[async_trait]
impl DataRetriever for CatalogRetriever {
    async fn retrieve(&self, query: &DataQuery) -> Result<Dataset> {
        if let [location] = query.locations.as_slice() {
            return Ok(Dataset::new(self.retrieve_location(query, location).await?));
        }

        let mut dataset = Dataset::default();
        let mut succeeded = 0;

        for location in &query.locations {
            match self.retrieve_location(query, location).await {
                Ok(rows) => {
                    succeeded += 1;
                    dataset.rows.extend(rows);
                }
                Err(e) => {
                    warn!(location = %location, error = %e, "Dropping location from retrieval");
                    dataset.skipped.push(SkippedLocation {
                        location: location.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if succeeded == 0 {
            return Err(AgentError::Retrieval(format!(
                "No data found for any location: {}",
                query.locations.join(", ")
            )));
        }

        Ok(dataset)
    }
}
