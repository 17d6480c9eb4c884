use std::collections::BTreeMap;

use geo::Coord;

use crate::ElementId;

/// OpenStreetMap-style key/value tags, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Fixed-point scale used by the store for coordinates.
pub const COORDINATE_SCALE: i64 = 10_000_000;

/// Convert fixed-point store coordinates into a WGS84 coordinate.
///
/// The result uses `x = longitude` and `y = latitude`.
///
/// # Examples
/// ```
/// use mapread_core::scaled_coordinate;
///
/// let coord = scaled_coordinate(-1_234_567, 515_000_000);
/// assert!((coord.x - -0.1234567).abs() < 1e-9);
/// assert!((coord.y - 51.5).abs() < 1e-9);
/// ```
pub fn scaled_coordinate(longitude: i64, latitude: i64) -> Coord<f64> {
    let scale = COORDINATE_SCALE as f64;
    Coord {
        x: longitude as f64 / scale,
        y: latitude as f64 / scale,
    }
}

/// Author attribution for a node's latest version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAuthor {
    /// User identifier.
    pub uid: u64,
    /// Public display name.
    pub display_name: String,
}

/// A single map node together with its tags.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use mapread_core::{ElementId, Node};
///
/// let node = Node::new(ElementId::new(1), Coord { x: 0.5, y: 51.0 })
///     .with_tag("amenity", "cafe");
/// assert_eq!(node.tags.get("amenity").map(String::as_str), Some("cafe"));
/// assert!(node.visible);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node identifier.
    pub id: ElementId,
    /// Geospatial position.
    pub location: Coord<f64>,
    /// Version of the current revision.
    pub version: u64,
    /// Changeset that produced the current revision.
    pub changeset: u64,
    /// ISO-8601 timestamp of the current revision.
    pub timestamp: String,
    /// Whether the node is visible (not deleted).
    pub visible: bool,
    /// Author, present only when their edits are public.
    pub author: Option<NodeAuthor>,
    /// Tags attached to the current revision.
    pub tags: Tags,
}

impl Node {
    /// Construct a visible, untagged first revision at `location`.
    pub fn new(id: ElementId, location: Coord<f64>) -> Self {
        Self {
            id,
            location,
            version: 1,
            changeset: 1,
            timestamp: String::from("1970-01-01T00:00:00Z"),
            visible: true,
            author: None,
            tags: Tags::new(),
        }
    }

    /// Attach a tag, replacing any previous value for `key`.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Set the revision metadata.
    #[must_use]
    pub fn with_revision(mut self, version: u64, changeset: u64, timestamp: impl Into<String>) -> Self {
        self.version = version;
        self.changeset = changeset;
        self.timestamp = timestamp.into();
        self
    }

    /// Attribute the node to a public author.
    #[must_use]
    pub fn with_author(mut self, uid: u64, display_name: impl Into<String>) -> Self {
        self.author = Some(NodeAuthor {
            uid,
            display_name: display_name.into(),
        });
        self
    }

    /// Mark the node as deleted.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0.0, 0.0)]
    #[case(1_800_000_000, -900_000_000, 180.0, -90.0)]
    #[case(-1_800_000_000, 900_000_000, -180.0, 90.0)]
    fn converts_scaled_coordinates(
        #[case] lon: i64,
        #[case] lat: i64,
        #[case] x: f64,
        #[case] y: f64,
    ) {
        let coord = scaled_coordinate(lon, lat);
        assert!((coord.x - x).abs() < 1e-9, "longitude {}", coord.x);
        assert!((coord.y - y).abs() < 1e-9, "latitude {}", coord.y);
    }

    #[rstest]
    fn builder_sets_metadata() {
        let node = Node::new(ElementId::new(3), Coord { x: 1.0, y: 2.0 })
            .with_revision(4, 99, "2024-05-01T10:00:00Z")
            .with_author(12, "mapper")
            .with_tag("name", "Bench")
            .deleted();
        assert_eq!(node.version, 4);
        assert_eq!(node.changeset, 99);
        assert_eq!(node.timestamp, "2024-05-01T10:00:00Z");
        assert_eq!(node.author.map(|author| author.uid), Some(12));
        assert_eq!(node.tags.len(), 1);
        assert!(!node.visible);
    }
}
