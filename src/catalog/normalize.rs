//! Keyword normalization of upstream sensor types and device names

use crate::core::config::SensorMapping;

/// Map an upstream sensor type name onto a normalized type
///
/// Case-insensitive substring match against the configured keyword lists,
/// checked in the order temperature, humidity, co2, moisture, strain.
/// Unmatched names have no type and are never offered to queries.
pub fn sensor_type(raw: &str, mapping: &SensorMapping) -> Option<&'static str> {
    let name = raw.to_lowercase();
    let table: [(&'static str, &[String]); 5] = [
        ("temperature", &mapping.temperature_keywords),
        ("humidity", &mapping.humidity_keywords),
        ("co2", &mapping.co2_keywords),
        ("moisture", &mapping.moisture_keywords),
        ("strain", &mapping.strain_keywords),
    ];

    table.into_iter().find_map(|(normalized, keywords)| {
        keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .any(|k| !k.is_empty() && name.contains(&k))
            .then_some(normalized)
    })
}

/// Human-readable location for a raw device name
///
/// `15_9279` becomes `Node 15`; names without an underscore are kept as-is.
pub fn human_readable_location(device_name: &str) -> String {
    match device_name.split_once('_') {
        Some((prefix, _)) => format!("Node {}", prefix),
        None => device_name.to_string(),
    }
}
