//! Roster resolution: which identities a class expects.
//!
//! The default policy treats every enrolled identity as a candidate for every
//! class. An explicit class → identities mapping overrides it per class.

use crate::gallery::Gallery;
use crate::types::Identity;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("failed to read roster file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bad roster TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Ordered, de-duplicated identities expected for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: Vec<Identity>,
}

impl Roster {
    /// Build a roster, dropping repeats (first occurrence keeps its position).
    pub fn new<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = Identity>,
    {
        let mut seen = HashSet::new();
        let members = identities
            .into_iter()
            .filter(|identity| seen.insert(identity.clone()))
            .collect();
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.members.iter()
    }
}

/// Policy mapping a class id to its roster.
pub trait RosterResolver: Send + Sync {
    fn resolve(&self, class_id: &str, gallery: &Gallery) -> Roster;
}

/// Every identity in the gallery, in gallery order.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeGallery;

impl RosterResolver for WholeGallery {
    fn resolve(&self, _class_id: &str, gallery: &Gallery) -> Roster {
        Roster::new(gallery.identities().cloned())
    }
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    classes: HashMap<String, Vec<Identity>>,
}

/// Explicit per-class rosters; unmapped classes fall back to [`WholeGallery`].
#[derive(Debug, Clone, Default)]
pub struct ClassRosters {
    classes: HashMap<String, Roster>,
}

impl ClassRosters {
    /// Parse a roster mapping:
    ///
    /// ```toml
    /// [classes]
    /// class_123 = ["Rahul", "Priya", "Amit"]
    /// ```
    pub fn from_toml_str(src: &str) -> Result<Self, RosterError> {
        let file: RosterFile = toml::from_str(src)?;
        let classes = file
            .classes
            .into_iter()
            .map(|(class_id, names)| (class_id, Roster::new(names)))
            .collect();
        Ok(Self { classes })
    }

    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let src = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rosters = Self::from_toml_str(&src)?;
        tracing::info!(
            path = %path.display(),
            classes = rosters.classes.len(),
            "loaded class rosters"
        );
        Ok(rosters)
    }

    pub fn insert(&mut self, class_id: impl Into<String>, roster: Roster) {
        self.classes.insert(class_id.into(), roster);
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl RosterResolver for ClassRosters {
    fn resolve(&self, class_id: &str, gallery: &Gallery) -> Roster {
        let Some(roster) = self.classes.get(class_id) else {
            tracing::debug!(class_id, "no explicit roster; using the whole gallery");
            return WholeGallery.resolve(class_id, gallery);
        };

        let unenrolled: Vec<&str> = roster
            .iter()
            .filter(|identity| !gallery.contains(identity.as_str()))
            .map(Identity::as_str)
            .collect();
        if !unenrolled.is_empty() {
            tracing::warn!(
                class_id,
                ?unenrolled,
                "roster names identities missing from the gallery; they can only be marked absent"
            );
        }
        roster.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Embedding;

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    fn gallery(names: &[&str]) -> Gallery {
        Gallery::from_entries(names.iter().map(|n| (id(n), Embedding::new(vec![0.0])))).unwrap()
    }

    fn names(roster: &Roster) -> Vec<&str> {
        roster.iter().map(Identity::as_str).collect()
    }

    #[test]
    fn test_roster_dedups_preserving_first_position() {
        let roster = Roster::new([id("priya"), id("amit"), id("Priya"), id("karan")]);
        assert_eq!(names(&roster), ["priya", "amit", "karan"]);
    }

    #[test]
    fn test_whole_gallery_default() {
        let roster = WholeGallery.resolve("class_123", &gallery(&["bob", "alice"]));
        assert_eq!(names(&roster), ["alice", "bob"]);
    }

    #[test]
    fn test_whole_gallery_empty() {
        assert!(WholeGallery.resolve("class_123", &Gallery::new()).is_empty());
    }

    #[test]
    fn test_class_rosters_from_toml() {
        let rosters = ClassRosters::from_toml_str(
            r#"
            [classes]
            class_123 = ["Rahul", "Priya", "rahul", "Amit"]
            class_456 = []
            "#,
        )
        .unwrap();
        assert_eq!(rosters.class_count(), 2);

        let g = gallery(&["rahul", "priya", "zoya"]);
        assert_eq!(names(&rosters.resolve("class_123", &g)), ["rahul", "priya", "amit"]);
        assert!(rosters.resolve("class_456", &g).is_empty());
    }

    #[test]
    fn test_class_rosters_fall_back_to_gallery() {
        let rosters = ClassRosters::from_toml_str("[classes]\nclass_123 = [\"Rahul\"]\n").unwrap();
        let roster = rosters.resolve("class_999", &gallery(&["zoya", "rahul"]));
        assert_eq!(names(&roster), ["rahul", "zoya"]);
    }

    #[test]
    fn test_class_rosters_reject_blank_names() {
        assert!(ClassRosters::from_toml_str("[classes]\nclass_123 = [\"  \"]\n").is_err());
    }

    #[test]
    fn test_class_rosters_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClassRosters::load(&dir.path().join("rosters.toml")).unwrap_err();
        assert!(matches!(err, RosterError::Io { .. }));
    }
}
