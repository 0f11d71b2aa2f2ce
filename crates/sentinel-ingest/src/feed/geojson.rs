//! GDACS GeoJSON event list and event detail documents

use serde::Deserialize;
use serde_json::Value;

use super::dates::DateParser;
use super::resolve_coordinates;
use crate::error::{IngestError, ItemError};
use crate::models::{DetailKey, RawRecord};

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Value>,
}

pub struct GeoJsonItems<'a> {
    features: std::vec::IntoIter<Value>,
    dates: &'a DateParser,
    position: usize,
}

impl<'a> GeoJsonItems<'a> {
    pub(crate) fn new(bytes: &[u8], dates: &'a DateParser) -> Result<Self, IngestError> {
        let collection: FeatureCollection = serde_json::from_slice(bytes)
            .map_err(|e| IngestError::Parse(format!("Invalid GeoJSON: {}", e)))?;

        if collection.kind != "FeatureCollection" {
            return Err(IngestError::Parse(format!(
                "Expected a FeatureCollection, got '{}'",
                collection.kind
            )));
        }

        Ok(Self {
            features: collection.features.into_iter(),
            dates,
            position: 0,
        })
    }
}

impl Iterator for GeoJsonItems<'_> {
    type Item = Result<RawRecord, ItemError>;

    fn next(&mut self) -> Option<Self::Item> {
        let feature = self.features.next()?;
        self.position += 1;
        Some(feature_to_record(&feature, self.position, self.dates))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.features.size_hint()
    }
}

/// Parse the single `Feature` returned by the event detail endpoint
pub(crate) fn parse_detail(bytes: &[u8], dates: &DateParser) -> Result<RawRecord, ItemError> {
    let feature: Value = serde_json::from_slice(bytes).map_err(|e| ItemError::Parse {
        position: 1,
        message: format!("invalid detail JSON: {}", e),
    })?;
    feature_to_record(&feature, 1, dates)
}

fn feature_to_record(
    feature: &Value,
    position: usize,
    dates: &DateParser,
) -> Result<RawRecord, ItemError> {
    let props = feature
        .get("properties")
        .filter(|p| p.is_object())
        .ok_or_else(|| ItemError::Parse {
            position,
            message: "feature has no properties object".to_string(),
        })?;

    let event_id = text(props, "eventid").ok_or_else(|| ItemError::Validation {
        position,
        message: format!(
            "missing properties.eventid (name: {})",
            text(props, "name").unwrap_or_else(|| "unknown".to_string())
        ),
    })?;

    let geometry_point = point_geometry(feature.get("geometry"));
    let coordinates = resolve_coordinates(
        text(props, "latitude").as_deref(),
        text(props, "longitude").as_deref(),
        geometry_point.as_deref(),
    );
    let date = |key: &str| text(props, key).and_then(|v| dates.parse(&v));

    let mut record = RawRecord::new(event_id.clone());
    record.title = text(props, "name").or_else(|| text(props, "eventname"));
    record.description = text(props, "description").or_else(|| text(props, "htmldescription"));
    record.link = props
        .get("url")
        .and_then(|url| text(url, "report"))
        .or_else(|| text(props, "link"));
    record.published_at = date("datemodified").or_else(|| date("fromdate"));
    record.from_date = date("fromdate");
    record.to_date = date("todate");
    record.latitude = coordinates.map(|c| c.0);
    record.longitude = coordinates.map(|c| c.1);
    record.event_type = text(props, "eventtype");
    record.alert_level = text(props, "alertlevel");
    record.severity = props
        .get("severitydata")
        .and_then(|s| text(s, "severitytext"))
        .or_else(|| text(props, "severity"));
    record.population_estimate = text(props, "population");
    record.country = text(props, "country");
    record.country_code = text(props, "iso3");
    record.is_current_in_feed = match props.get("iscurrent") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    };
    record.detail_key = record.event_type.clone().map(|event_type| DetailKey {
        event_type,
        event_id,
    });

    Ok(record)
}

/// GeoJSON points are `[lon, lat]`; return them as a `"lat lon"` point string
fn point_geometry(geometry: Option<&Value>) -> Option<String> {
    let geometry = geometry?;
    if geometry.get("type").and_then(Value::as_str) != Some("Point") {
        return None;
    }
    let coords = geometry.get("coordinates")?.as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    Some(format!("{} {}", lat, lon))
}

/// Non-empty string form of a scalar property
fn text(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [77.2, 28.6] },
                    "properties": {
                        "eventtype": "EQ",
                        "eventid": 1000123,
                        "name": "Earthquake in India",
                        "description": "Earthquake in India",
                        "alertlevel": "Orange",
                        "country": "India",
                        "iso3": "IND",
                        "fromdate": "2024-10-16T06:00:00",
                        "todate": "2024-10-16T06:00:00",
                        "iscurrent": "true",
                        "severitydata": { "severity": 6.1, "severitytext": "Magnitude 6.1M" },
                        "url": { "report": "https://www.gdacs.org/report.aspx?eventid=1000123" }
                    }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Polygon", "coordinates": [] },
                    "properties": { "eventtype": "FL", "name": "Flood" }
                },
                { "type": "Feature" }
            ]
        })
    }

    fn parse_all(doc: &Value) -> Vec<Result<RawRecord, ItemError>> {
        let dates = DateParser::default();
        let bytes = serde_json::to_vec(doc).unwrap();
        GeoJsonItems::new(&bytes, &dates).unwrap().collect()
    }

    #[test]
    fn test_feature_properties_are_normalized() {
        let items = parse_all(&collection());
        assert_eq!(items.len(), 3);

        let eq = items[0].as_ref().unwrap();
        assert_eq!(eq.event_id, "1000123");
        assert_eq!(eq.coordinates(), Some((28.6, 77.2)));
        assert_eq!(eq.alert_level.as_deref(), Some("Orange"));
        assert_eq!(eq.severity.as_deref(), Some("Magnitude 6.1M"));
        assert_eq!(
            eq.from_date,
            Some(Utc.with_ymd_and_hms(2024, 10, 16, 6, 0, 0).unwrap())
        );
        assert_eq!(eq.published_at, eq.from_date);
        assert!(eq.is_current_in_feed);
        assert_eq!(
            eq.detail_key,
            Some(DetailKey {
                event_type: "EQ".into(),
                event_id: "1000123".into()
            })
        );
    }

    #[test]
    fn test_bad_features_are_reported_per_item() {
        let items = parse_all(&collection());
        assert!(matches!(items[1], Err(ItemError::Validation { position: 2, .. })));
        assert!(matches!(items[2], Err(ItemError::Parse { position: 3, .. })));
    }

    #[test]
    fn test_non_collection_documents_are_fatal() {
        let dates = DateParser::default();
        assert!(GeoJsonItems::new(br#"{"type":"Feature"}"#, &dates).is_err());
        assert!(GeoJsonItems::new(b"{not json", &dates).is_err());
    }

    #[test]
    fn test_detail_feature_parses_with_bool_flag() {
        let dates = DateParser::default();
        let detail = json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [72.87, 19.07] },
            "properties": { "eventid": "55", "eventtype": "TC", "iscurrent": false, "population": 3500 }
        });
        let record = parse_detail(&serde_json::to_vec(&detail).unwrap(), &dates).unwrap();
        assert_eq!(record.event_id, "55");
        assert_eq!(record.coordinates(), Some((19.07, 72.87)));
        assert_eq!(record.population_estimate.as_deref(), Some("3500"));
        assert!(!record.is_current_in_feed);
    }
}
