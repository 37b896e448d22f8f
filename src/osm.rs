use std::collections::BTreeMap;

use serde::Deserialize;

use crate::geo::{Bounds, GeoPoint};

/// Highway classifications accepted as playable roads. Ways tagged with
/// anything else are ignored silently.
pub const ROAD_HIGHWAY_TYPES: [&str; 15] = [
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    "service",
    "living_street",
    "pedestrian",
    "road",
    "path",
    "footway",
    "cycleway",
    "track",
];

/// Overpass-style element list. Unknown fields are ignored so raw API
/// responses deserialize directly.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OsmData {
    #[serde(default)]
    pub elements: Vec<OsmElement>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OsmElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub nodes: Option<Vec<i64>>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
}

/// Coordinates plus the ordered node-id lists of every accepted way.
#[derive(Clone, Debug, Default)]
pub struct RoadWays {
    pub node_coords: BTreeMap<i64, GeoPoint>,
    pub ways: Vec<Vec<i64>>,
}

pub fn collect_road_ways(data: &OsmData) -> RoadWays {
    let mut result = RoadWays::default();
    for element in &data.elements {
        match element.kind.as_str() {
            "node" => {
                if let (Some(lat), Some(lon)) = (element.lat, element.lon) {
                    result.node_coords.insert(element.id, GeoPoint::new(lat, lon));
                }
            }
            "way" => {
                let Some(node_ids) = element.nodes.as_ref() else {
                    continue;
                };
                let highway = element
                    .tags
                    .as_ref()
                    .and_then(|tags| tags.get("highway"))
                    .map(String::as_str);
                let Some(highway) = highway else {
                    continue;
                };
                if ROAD_HIGHWAY_TYPES.contains(&highway) {
                    result.ways.push(node_ids.clone());
                }
            }
            _ => {}
        }
    }
    result
}

/// Play-area bounds derived from the node extents, `None` when the payload
/// carries no coordinates.
pub fn bounds_of(data: &OsmData) -> Option<Bounds> {
    let mut south = f64::INFINITY;
    let mut west = f64::INFINITY;
    let mut north = f64::NEG_INFINITY;
    let mut east = f64::NEG_INFINITY;
    let mut found = false;
    for element in &data.elements {
        if let (Some(lat), Some(lon)) = (element.lat, element.lon) {
            south = south.min(lat);
            north = north.max(lat);
            west = west.min(lon);
            east = east.max(lon);
            found = true;
        }
    }
    found.then_some(Bounds {
        south,
        west,
        north,
        east,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> OsmData {
        serde_json::from_str(raw).expect("osm json should parse")
    }

    #[test]
    fn bounds_derive_from_node_extents() {
        let data = parse(
            r#"{"elements":[
                {"type":"node","id":1,"lat":25.0,"lon":121.5},
                {"type":"node","id":2,"lat":25.2,"lon":121.7}
            ]}"#,
        );
        let bounds = bounds_of(&data).expect("nodes present");
        assert_eq!(bounds.south, 25.0);
        assert_eq!(bounds.north, 25.2);
        assert_eq!(bounds.west, 121.5);
        assert_eq!(bounds.east, 121.7);
        assert!(bounds_of(&OsmData::default()).is_none());
    }

    #[test]
    fn parses_overpass_payload_and_ignores_unknown_fields() {
        let data = parse(
            r#"{
                "version": 0.6,
                "elements": [
                    {"type": "node", "id": 1, "lat": 25.03, "lon": 121.56},
                    {"type": "node", "id": 2, "lat": 25.031, "lon": 121.56},
                    {"type": "way", "id": 9, "nodes": [1, 2], "tags": {"highway": "residential", "name": "x"}}
                ]
            }"#,
        );
        let ways = collect_road_ways(&data);
        assert_eq!(ways.node_coords.len(), 2);
        assert_eq!(ways.ways, vec![vec![1, 2]]);
    }

    #[test]
    fn rejects_ways_outside_the_allow_list() {
        let data = parse(
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 25.0, "lon": 121.5},
                {"type": "node", "id": 2, "lat": 25.001, "lon": 121.5},
                {"type": "way", "id": 3, "nodes": [1, 2], "tags": {"highway": "proposed"}},
                {"type": "way", "id": 4, "nodes": [1, 2], "tags": {"waterway": "river"}},
                {"type": "way", "id": 5, "nodes": [1, 2]}
            ]}"#,
        );
        assert!(collect_road_ways(&data).ways.is_empty());
    }

    #[test]
    fn skips_nodes_without_coordinates() {
        let data = parse(r#"{"elements": [{"type": "node", "id": 7}]}"#);
        assert!(collect_road_ways(&data).node_coords.is_empty());
    }

    #[test]
    fn empty_payload_yields_empty_ways() {
        let ways = collect_road_ways(&OsmData::default());
        assert!(ways.node_coords.is_empty());
        assert!(ways.ways.is_empty());
    }
}
