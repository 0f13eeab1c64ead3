//! Merge planning
//!
//! Destination selection prefers the entity with the largest primary
//! file. When the destination has no descriptive metadata at all, the
//! first metadata-bearing source donates its fields; later sources are
//! never consulted for metadata.

use serde::{Deserialize, Serialize};

use crate::client::{Entity, MergeOverrides, NamedRef};

/// Merge request as accepted by the control API
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    /// Entities to merge; destination may be among them
    pub entity_ids: Vec<String>,
    /// Explicit destination; picked automatically when absent
    #[serde(default)]
    pub destination_id: Option<String>,
    /// Delete source entities after the merge
    #[serde(default)]
    pub delete_sources: bool,
    /// Second switch guarding deletion; both must be set
    #[serde(default)]
    pub delete_confirmed: bool,
}

/// Resolved plan for one merge
#[derive(Debug, Clone, Serialize)]
pub struct MergePlan {
    pub destination_id: String,
    pub source_ids: Vec<String>,
    /// Fields copied from the donor source, when any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<MergeOverrides>,
}

/// Build a merge plan from fetched entities
///
/// Returns None when fewer than two entities are given. The destination
/// is the entity with the largest primary file unless `destination_id`
/// names one explicitly.
pub fn plan_merge(entities: &[Entity], destination_id: Option<&str>) -> Option<MergePlan> {
    if entities.len() < 2 {
        return None;
    }

    let destination = match destination_id {
        Some(id) => entities.iter().find(|e| e.id == id)?,
        None => entities.iter().max_by_key(|e| e.primary_file_size())?,
    };

    let sources: Vec<&Entity> = entities.iter().filter(|e| e.id != destination.id).collect();
    if sources.is_empty() {
        return None;
    }

    let overrides = if destination.is_metadata_empty() {
        sources
            .iter()
            .find(|s| !s.is_metadata_empty())
            .map(|donor| donor_overrides(donor))
            .filter(|o| !o.is_empty())
    } else {
        None
    };

    Some(MergePlan {
        destination_id: destination.id.clone(),
        source_ids: sources.iter().map(|s| s.id.clone()).collect(),
        overrides,
    })
}

fn donor_overrides(donor: &Entity) -> MergeOverrides {
    MergeOverrides {
        title: donor.title.clone().filter(|t| !t.is_empty()),
        date: donor.date.clone().filter(|d| !d.is_empty()),
        details: donor.details.clone().filter(|d| !d.is_empty()),
        tag_ids: ids_of(&donor.tags),
        performer_ids: ids_of(&donor.performers),
        studio_id: donor.studio.as_ref().map(|s| s.id.clone()),
    }
}

fn ids_of(refs: &[NamedRef]) -> Option<Vec<String>> {
    if refs.is_empty() {
        None
    } else {
        Some(refs.iter().map(|r| r.id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EntityFile;

    fn entity(id: &str, size: u64, title: Option<&str>) -> Entity {
        Entity {
            id: id.to_string(),
            title: title.map(|t| t.to_string()),
            files: vec![EntityFile { size, ..EntityFile::default() }],
            ..Entity::default()
        }
    }

    #[test]
    fn test_destination_is_largest_file() {
        let entities = vec![
            entity("small", 100, Some("A")),
            entity("big", 9000, Some("B")),
        ];
        let plan = plan_merge(&entities, None).unwrap();
        assert_eq!(plan.destination_id, "big");
        assert_eq!(plan.source_ids, vec!["small"]);
    }

    #[test]
    fn test_explicit_destination_wins() {
        let entities = vec![
            entity("small", 100, Some("A")),
            entity("big", 9000, Some("B")),
        ];
        let plan = plan_merge(&entities, Some("small")).unwrap();
        assert_eq!(plan.destination_id, "small");
    }

    #[test]
    fn test_first_metadata_bearing_source_donates() {
        let entities = vec![
            entity("dest", 9000, None),
            entity("empty-src", 10, None),
            entity("donor", 20, Some("Donor title")),
            entity("later", 30, Some("Later title")),
        ];
        let plan = plan_merge(&entities, None).unwrap();
        assert_eq!(plan.destination_id, "dest");
        let overrides = plan.overrides.unwrap();
        // First metadata-bearing source, not the best one
        assert_eq!(overrides.title.as_deref(), Some("Donor title"));
    }

    #[test]
    fn test_no_donation_when_destination_has_metadata() {
        let entities = vec![
            entity("dest", 9000, Some("Kept")),
            entity("src", 10, Some("Ignored")),
        ];
        let plan = plan_merge(&entities, None).unwrap();
        assert!(plan.overrides.is_none());
    }

    #[test]
    fn test_single_entity_is_rejected() {
        assert!(plan_merge(&[entity("only", 1, None)], None).is_none());
    }
}
