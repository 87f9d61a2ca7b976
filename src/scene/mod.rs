//! Scene documents stored on projects.
//!
//! The editor and viewers read and write `sceneData` as JSON. Documents carry
//! a `schemaVersion`; older shapes are upgraded one version at a time by
//! `migrate` before being parsed into the current `SceneDocument`.

pub mod metadata;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use metadata::{AssetMetadata, IonAssetDetails, Transform};

/// Version written by this service
pub const CURRENT_SCENE_VERSION: u32 = 2;

#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    #[error("scene data must be a JSON object")]
    NotAnObject,

    #[error("unsupported schemaVersion {0}")]
    UnsupportedVersion(u64),

    #[error("invalid scene data: {0}")]
    Invalid(String),
}

/// Scene document shapes as they appear in storage or requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneVersion {
    /// Unversioned editor blob with flat toggles and long-form location keys
    Legacy,
    /// First versioned shape, still flat toggles
    V1,
    /// Current shape, engine toggles grouped under `engine`
    V2,
}

impl SceneVersion {
    pub fn detect(doc: &Map<String, Value>) -> Result<Self, SceneError> {
        match doc.get("schemaVersion") {
            None | Some(Value::Null) => Ok(SceneVersion::Legacy),
            Some(v) => match v.as_u64() {
                Some(1) => Ok(SceneVersion::V1),
                Some(2) => Ok(SceneVersion::V2),
                Some(n) => Err(SceneError::UnsupportedVersion(n)),
                None => Err(SceneError::Invalid("schemaVersion must be an integer".into())),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasemapType {
    #[default]
    Cesium,
    Google,
    Bing,
    Osm,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub height: f64,
}

impl GeoLocation {
    pub fn validate(&self) -> Result<(), String> {
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err("longitude must be within [-180, 180]".into());
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err("latitude must be within [-90, 90]".into());
        }
        if !self.height.is_finite() {
            return Err("height must be finite".into());
        }
        Ok(())
    }
}

/// Renderer switches. Unknown switches survive in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    #[serde(default = "default_true")]
    pub show_tiles: bool,
    #[serde(default)]
    pub lighting: bool,
    #[serde(default)]
    pub shadows: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            show_tiles: true,
            lighting: false,
            shadows: false,
            extra: Map::new(),
        }
    }
}

/// A placed object; only identity fields are typed, the rest belongs to the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneObject {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationPoint {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<[f64; 3]>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub observation_points: Vec<ObservationPoint>,
    #[serde(default)]
    pub selected_asset_id: Option<String>,
    #[serde(default)]
    pub selected_location: Option<GeoLocation>,
    #[serde(default)]
    pub basemap: BasemapType,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCENE_VERSION,
            objects: Vec::new(),
            observation_points: Vec::new(),
            selected_asset_id: None,
            selected_location: None,
            basemap: BasemapType::default(),
            engine: EngineSettings::default(),
            extra: Map::new(),
        }
    }
}

impl SceneDocument {
    /// Parse a stored or submitted document of any known version.
    /// `null` is treated as an empty scene.
    pub fn from_value(value: Value) -> Result<Self, SceneError> {
        let doc = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => return Err(SceneError::NotAnObject),
        };

        let current = migrate(doc)?;
        let scene: SceneDocument = serde_json::from_value(Value::Object(current))
            .map_err(|e| SceneError::Invalid(e.to_string()))?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn to_value(&self) -> Value {
        // Serializing plain maps, vectors and numbers cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// A scene with nothing placed in it and no saved viewpoints
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.observation_points.is_empty()
    }

    fn validate(&self) -> Result<(), SceneError> {
        if let Some(location) = &self.selected_location {
            location.validate().map_err(SceneError::Invalid)?;
        }
        if self.objects.iter().any(|o| o.id.trim().is_empty()) {
            return Err(SceneError::Invalid("every object needs an id".into()));
        }
        Ok(())
    }
}

/// Upgrade a document map to the current version, one step at a time
pub fn migrate(mut doc: Map<String, Value>) -> Result<Map<String, Value>, SceneError> {
    loop {
        doc = match SceneVersion::detect(&doc)? {
            SceneVersion::Legacy => legacy_to_v1(doc),
            SceneVersion::V1 => v1_to_v2(doc),
            SceneVersion::V2 => return Ok(doc),
        };
    }
}

/// Legacy blobs used `basemapType`, `altitude` and had no observation points key
fn legacy_to_v1(mut doc: Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(location)) = doc.get_mut("selectedLocation") {
        if let Some(altitude) = location.remove("altitude") {
            location.entry("height").or_insert(altitude);
        }
        if let Some(lng) = location.remove("lng") {
            location.entry("longitude").or_insert(lng);
        }
        if let Some(lat) = location.remove("lat") {
            location.entry("latitude").or_insert(lat);
        }
    }

    if let Some(points) = doc.remove("cameraPositions") {
        doc.entry("observationPoints").or_insert(points);
    }
    doc.entry("observationPoints").or_insert_with(|| Value::Array(Vec::new()));
    doc.entry("objects").or_insert_with(|| Value::Array(Vec::new()));

    doc.insert("schemaVersion".into(), Value::from(1));
    doc
}

/// v1 kept renderer toggles at the top level; v2 groups them under `engine`
fn v1_to_v2(mut doc: Map<String, Value>) -> Map<String, Value> {
    if let Some(basemap) = doc.remove("basemapType") {
        doc.entry("basemap").or_insert(basemap);
    }

    let mut engine = match doc.remove("engine") {
        Some(Value::Object(engine)) => engine,
        _ => Map::new(),
    };
    for (old, new) in [
        ("showTiles", "showTiles"),
        ("cesiumLightingEnabled", "lighting"),
        ("cesiumShadowsEnabled", "shadows"),
    ] {
        if let Some(v) = doc.remove(old) {
            engine.entry(new.to_string()).or_insert(v);
        }
    }
    doc.insert("engine".into(), Value::Object(engine));

    doc.insert("schemaVersion".into(), Value::from(2));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_is_an_empty_current_scene() {
        let scene = SceneDocument::from_value(Value::Null).unwrap();
        assert_eq!(scene, SceneDocument::default());
        assert!(scene.is_empty());
        assert_eq!(scene.to_value()["schemaVersion"], 2);
    }

    #[test]
    fn legacy_blob_is_migrated_to_current() {
        let legacy = json!({
            "objects": [{ "id": "obj-1", "assetId": "42", "position": [1.0, 2.0, 3.0] }],
            "selectedAssetId": "42",
            "selectedLocation": { "longitude": 10.5, "latitude": 59.9, "altitude": 120.0 },
            "basemapType": "google",
            "showTiles": false,
            "cesiumLightingEnabled": true,
        });

        let scene = SceneDocument::from_value(legacy).unwrap();
        assert_eq!(scene.schema_version, CURRENT_SCENE_VERSION);
        assert_eq!(scene.basemap, BasemapType::Google);
        assert!(!scene.engine.show_tiles);
        assert!(scene.engine.lighting);
        assert!(!scene.engine.shadows);
        assert_eq!(scene.selected_location.unwrap().height, 120.0);
        assert_eq!(scene.objects[0].asset_id.as_deref(), Some("42"));
        // editor-owned fields survive the round trip
        assert_eq!(scene.objects[0].extra["position"], json!([1.0, 2.0, 3.0]));
        assert!(!scene.is_empty());
    }

    #[test]
    fn v1_toggles_move_under_engine() {
        let v1 = json!({
            "schemaVersion": 1,
            "objects": [],
            "observationPoints": [{ "id": "p1", "title": "Entrance", "position": [0.0, 0.0, 10.0] }],
            "basemapType": "osm",
            "cesiumShadowsEnabled": true,
            "terrainExaggeration": 1.5,
        });

        let scene = SceneDocument::from_value(v1).unwrap();
        assert_eq!(scene.basemap, BasemapType::Osm);
        assert!(scene.engine.shadows);
        assert_eq!(scene.observation_points[0].title, "Entrance");
        assert_eq!(scene.extra["terrainExaggeration"], json!(1.5));
        assert!(!scene.is_empty());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = SceneDocument::from_value(json!({ "schemaVersion": 9 })).unwrap_err();
        assert_eq!(err, SceneError::UnsupportedVersion(9));
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(
            SceneDocument::from_value(json!([1, 2])).unwrap_err(),
            SceneError::NotAnObject
        );
    }

    #[test]
    fn out_of_range_location_is_rejected() {
        let doc = json!({
            "schemaVersion": 2,
            "selectedLocation": { "longitude": 200.0, "latitude": 0.0 },
        });
        assert!(matches!(
            SceneDocument::from_value(doc),
            Err(SceneError::Invalid(_))
        ));
    }

    #[test]
    fn current_document_is_stable_through_storage() {
        let mut scene = SceneDocument::default();
        scene.objects.push(SceneObject {
            id: "a".into(),
            asset_id: None,
            extra: Map::new(),
        });
        let reparsed = SceneDocument::from_value(scene.to_value()).unwrap();
        assert_eq!(reparsed, scene);
    }
}
