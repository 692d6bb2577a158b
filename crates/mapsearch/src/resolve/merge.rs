use mapsearch_sources::{Feature, Geometry};
use tracing::{debug, info};

/// Merge the polygonal parts of a multi-feature answer into one multipolygon feature.
///
/// The merged feature keeps the properties of the first polygonal feature. Parts that
/// are not polygons are dropped. Without any polygon the features are returned as
/// they came.
pub fn merge_polygons(features: Vec<Feature>) -> Vec<Feature> {
    if features.len() < 2 {
        return features;
    }

    let mut polygons = Vec::new();
    let mut properties = None;
    let mut dropped = 0usize;

    for feature in &features {
        match &feature.geometry {
            Some(Geometry::Polygon(rings)) => polygons.push(rings.clone()),
            Some(Geometry::MultiPolygon(parts)) => polygons.extend(parts.iter().cloned()),
            other => {
                dropped += 1;
                info!(
                    kind = other.as_ref().map_or("none", Geometry::type_name),
                    "Dropping non-polygon part while merging"
                );
                continue;
            }
        }
        if properties.is_none() {
            properties = Some(feature.properties.clone());
        }
    }

    let Some(properties) = properties else {
        debug!(
            count = features.len(),
            "No polygons to merge, keeping features as they are"
        );
        return features;
    };
    debug!(parts = polygons.len(), dropped, "Merged polygons into a multipolygon");

    vec![Feature {
        geometry: Some(Geometry::MultiPolygon(polygons)),
        properties,
    }]
}

#[cfg(test)]
mod tests {
    use mapsearch_sources::test_data::{point_feature, square_feature};

    use super::*;

    fn feature(value: serde_json::Value) -> Feature {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_three_polygons_and_a_point() {
        let merged = merge_polygons(vec![
            feature(square_feature("Eldsbo 1:1 Enhetesområde 1", 0.0)),
            feature(point_feature("Brunn", 5.0, 5.0)),
            feature(square_feature("Eldsbo 1:1 Enhetesområde 2", 2.0)),
            feature(square_feature("Eldsbo 1:1 Enhetesområde 3", 4.0)),
        ]);

        assert_eq!(merged.len(), 1);
        match &merged[0].geometry {
            Some(Geometry::MultiPolygon(parts)) => assert_eq!(parts.len(), 3),
            other => panic!("expected a multipolygon, got {other:?}"),
        }
        assert_eq!(
            merged[0].property_text("name").as_deref(),
            Some("Eldsbo 1:1 Enhetesområde 1")
        );
    }

    #[test]
    fn test_points_only_are_left_alone() {
        let features = vec![
            feature(point_feature("a", 0.0, 0.0)),
            feature(point_feature("b", 1.0, 1.0)),
        ];
        assert_eq!(merge_polygons(features.clone()), features);
    }

    #[test]
    fn test_single_feature_is_untouched() {
        let features = vec![feature(square_feature("Eldsbo 1:1", 0.0))];
        assert_eq!(merge_polygons(features.clone()), features);
    }
}
