//! Host catalog wire types
//!
//! Field names mirror the host's query schema; only the operation shapes
//! are load-bearing for the engine.

use serde::{Deserialize, Serialize};

/// A catalog entity (the record being enriched)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub organized: bool,
    /// Provider-tagged external identifiers
    #[serde(default)]
    pub identifiers: Vec<EntityIdentifier>,
    #[serde(default)]
    pub tags: Vec<NamedRef>,
    #[serde(default)]
    pub performers: Vec<NamedRef>,
    #[serde(default)]
    pub studio: Option<NamedRef>,
    #[serde(default)]
    pub files: Vec<EntityFile>,
    /// Thumbnail URL served by the host
    #[serde(default)]
    pub thumbnail_path: Option<String>,
}

impl Entity {
    /// Whether the entity carries an identifier for `provider_id`
    pub fn has_identifier_for(&self, provider_id: &str) -> bool {
        self.identifiers
            .iter()
            .any(|sid| sid.endpoint.to_lowercase().contains(&provider_id.to_lowercase()))
    }

    /// Whether all descriptive metadata fields are empty
    pub fn is_metadata_empty(&self) -> bool {
        self.title.as_deref().unwrap_or("").is_empty()
            && self.tags.is_empty()
            && self.performers.is_empty()
            && self.studio.is_none()
            && self.date.as_deref().unwrap_or("").is_empty()
            && self.details.as_deref().unwrap_or("").is_empty()
    }

    /// Size in bytes of the largest primary file, 0 when none
    pub fn primary_file_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).max().unwrap_or(0)
    }
}

/// Provider-tagged external identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityIdentifier {
    /// Provider endpoint the identifier belongs to
    pub endpoint: String,
    /// External id at that provider
    pub external_id: String,
}

/// Lightweight id+name reference (tag, performer, studio)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

/// File attached to an entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityFile {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Paged find result
#[derive(Debug, Clone, Deserialize)]
pub struct FindEntitiesResult {
    pub count: usize,
    pub entities: Vec<Entity>,
}

/// Group returned by the host's native duplicate finder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDuplicateGroup {
    pub entities: Vec<Entity>,
}

/// Mutable fields for an entity update mutation
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityUpdate {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio_id: Option<String>,
}

/// Explicit override values attached to a merge mutation
///
/// Only fields the destination is missing are populated; the host keeps
/// destination values for everything left as None.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio_id: Option<String>,
}

impl MergeOverrides {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.details.is_none()
            && self.tag_ids.is_none()
            && self.performer_ids.is_none()
            && self.studio_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_with_identifier(endpoint: &str) -> Entity {
        Entity {
            id: "42".to_string(),
            identifiers: vec![EntityIdentifier {
                endpoint: endpoint.to_string(),
                external_id: "ext-1".to_string(),
            }],
            ..Entity::default()
        }
    }

    #[test]
    fn test_has_identifier_for_is_case_insensitive() {
        let entity = entity_with_identifier("https://Metadata-One.example/graphql");
        assert!(entity.has_identifier_for("metadata-one"));
        assert!(!entity.has_identifier_for("metadata-two"));
    }

    #[test]
    fn test_metadata_empty_detection() {
        let mut entity = Entity::default();
        assert!(entity.is_metadata_empty());

        entity.title = Some("A title".to_string());
        assert!(!entity.is_metadata_empty());

        entity.title = Some(String::new());
        entity.tags = vec![NamedRef { id: "1".into(), name: "tag".into() }];
        assert!(!entity.is_metadata_empty());
    }

    #[test]
    fn test_primary_file_size_picks_largest() {
        let mut entity = Entity::default();
        assert_eq!(entity.primary_file_size(), 0);

        entity.files = vec![
            EntityFile { size: 100, ..EntityFile::default() },
            EntityFile { size: 5000, ..EntityFile::default() },
        ];
        assert_eq!(entity.primary_file_size(), 5000);
    }
}
