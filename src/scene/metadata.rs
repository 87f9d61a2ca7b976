//! Asset metadata documents.
//!
//! Transform and geolocation are applied by the viewers at render time; they
//! never change the uploaded file or the upstream ion asset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{GeoLocation, SceneError};

pub const CURRENT_METADATA_VERSION: u32 = 1;

/// Column-major 4x4 model matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform(pub [f64; 16]);

impl Transform {
    pub const IDENTITY: Transform = Transform([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn validate(&self) -> Result<(), String> {
        if self.0.iter().any(|v| !v.is_finite()) {
            return Err("transform entries must be finite numbers".into());
        }
        Ok(())
    }
}

/// Catalog details copied from Cesium ion during sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IonAssetDetails {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attribution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ion: Option<IonAssetDetails>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AssetMetadata {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_METADATA_VERSION,
            transform: None,
            geolocation: None,
            ion: None,
            extra: Map::new(),
        }
    }
}

impl AssetMetadata {
    pub fn from_value(value: Value) -> Result<Self, SceneError> {
        let mut doc = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => return Err(SceneError::NotAnObject),
        };

        match doc.get("schemaVersion").map(|v| v.as_u64()) {
            None => doc = legacy_to_v1(doc),
            Some(Some(1)) => {}
            Some(Some(n)) => return Err(SceneError::UnsupportedVersion(n)),
            Some(None) => {
                return Err(SceneError::Invalid("schemaVersion must be an integer".into()))
            }
        }

        let metadata: AssetMetadata = serde_json::from_value(Value::Object(doc))
            .map_err(|e| SceneError::Invalid(e.to_string()))?;
        if let Some(transform) = &metadata.transform {
            transform.validate().map_err(SceneError::Invalid)?;
        }
        if let Some(location) = &metadata.geolocation {
            location.validate().map_err(SceneError::Invalid)?;
        }
        Ok(metadata)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Unversioned metadata stored the matrix as `modelMatrix` and the
/// position as `location` with `lng`/`lat`/`alt`
fn legacy_to_v1(mut doc: Map<String, Value>) -> Map<String, Value> {
    if let Some(matrix) = doc.remove("modelMatrix") {
        doc.entry("transform").or_insert(matrix);
    }
    if let Some(Value::Object(mut location)) = doc.remove("location") {
        let mut geolocation = Map::new();
        for (old, new) in [("lng", "longitude"), ("lat", "latitude"), ("alt", "height")] {
            if let Some(v) = location.remove(old).or_else(|| location.remove(new)) {
                geolocation.insert(new.to_string(), v);
            }
        }
        doc.entry("geolocation").or_insert(Value::Object(geolocation));
    }
    doc.insert("schemaVersion".into(), Value::from(CURRENT_METADATA_VERSION));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_matrix_and_location_are_renamed() {
        let legacy = json!({
            "modelMatrix": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 5, 6, 7, 1],
            "location": { "lng": 10.0, "lat": 60.0, "alt": 3.5 },
            "uploadedFrom": "desktop",
        });

        let metadata = AssetMetadata::from_value(legacy).unwrap();
        assert_eq!(metadata.schema_version, 1);
        assert_eq!(metadata.transform.unwrap().0[12], 5.0);
        let location = metadata.geolocation.unwrap();
        assert_eq!(location.longitude, 10.0);
        assert_eq!(location.height, 3.5);
        assert_eq!(metadata.extra["uploadedFrom"], "desktop");
    }

    #[test]
    fn short_matrix_is_invalid() {
        let doc = json!({ "schemaVersion": 1, "transform": [1.0, 0.0] });
        assert!(matches!(
            AssetMetadata::from_value(doc),
            Err(SceneError::Invalid(_))
        ));
    }

    #[test]
    fn identity_validates() {
        assert!(Transform::IDENTITY.validate().is_ok());
        let mut bad = Transform::IDENTITY;
        bad.0[3] = f64::NAN;
        assert!(bad.validate().is_err());
    }
}
