use tracing::{info, instrument};

use super::{
    Content, PartLabel, Presentation, ResolvedSelection, SelectionResolver, build_report,
    designation, merge_polygons,
};
use crate::{config::DisplayMode, error::Result};

const PART_PHRASE: &str = " Enhetesområde ";
const OBJECT_ID_PROPERTY: &str = "objektidentitet";

/// Short label of one estate part, e.g. `2:19>5`.
///
/// ```rust
/// use mapsearch::resolve::sub_unit_label;
///
/// assert_eq!(sub_unit_label("Hallstahammar Eldsbo 2:19 Enhetesområde 5"), "2:19>5");
/// assert_eq!(sub_unit_label("Eldsbo 2:19 Enhetesområde 5"), "Eldsbo 2:19>5");
/// ```
pub fn sub_unit_label(name: &str) -> String {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    match tokens.len() {
        5 => format!("{}>{}", tokens[2], tokens[4]),
        6 => format!("{}>{}", tokens[3], tokens[5]),
        7 => format!("{}>{}", tokens[4], tokens[6]),
        _ => name.replace(PART_PHRASE, ">"),
    }
}

impl SelectionResolver {
    /// Resolve the estate at a clicked map coordinate.
    ///
    /// Returns `Ok(None)` when the lookup answers without features.
    #[instrument(name = "Resolve click", skip(self), level = "debug")]
    pub async fn resolve_click(&self, coordinate: [f64; 2]) -> Result<Option<ResolvedSelection>> {
        let [easting, northing] = coordinate;
        let (easting, northing) = (easting.to_string(), northing.to_string());
        let url = self
            .options
            .area_by_coordinate_template()?
            .render_with(&[("easting", easting.as_str()), ("northing", northing.as_str())]);

        let features = match self.fetch_features(&url).await? {
            Some(features) if !features.is_empty() => features,
            _ => {
                info!("There is no estate at the clicked position");
                return Ok(None);
            }
        };

        let name = features[0].property_text("name").unwrap_or_default();
        let click_label = designation(&name).to_owned();
        let mode = self.options.show_feature;

        let mut selection = ResolvedSelection {
            title: self.options.click_title.clone(),
            content: Content::Text(click_label.clone()),
            presentation: Presentation::Features(Vec::new()),
            report: None,
            labels: Vec::new(),
            mode,
            strategy: None,
        };

        match mode {
            DisplayMode::Popup => {
                selection.presentation = Presentation::Features(merge_polygons(features));
            }
            DisplayMode::GeometryOnly => {
                if features.len() > 1 {
                    selection.labels = features
                        .iter()
                        .filter_map(|feature| {
                            let position = feature.geometry.as_ref()?.center()?;
                            let part = feature.property_text("name")?;
                            Some(PartLabel {
                                text: sub_unit_label(&part),
                                position,
                            })
                        })
                        .collect();
                }
                selection.labels.push(PartLabel {
                    text: click_label,
                    position: coordinate,
                });
                selection.report = features[0]
                    .property_text(OBJECT_ID_PROPERTY)
                    .and_then(|id| build_report(&features[0], &id, &self.options, coordinate));
                selection.presentation = Presentation::Features(features);
            }
        }
        Ok(Some(selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_unit_label_by_token_count() {
        assert_eq!(sub_unit_label("a b c:1 Enhetesområde 4"), "c:1>4");
        assert_eq!(sub_unit_label("a b c d:1 Enhetesområde 4"), "d:1>4");
        assert_eq!(sub_unit_label("a b c d e:1 Enhetesområde 4"), "e:1>4");
        assert_eq!(sub_unit_label("Eldsbo 4:5"), "Eldsbo 4:5");
    }
}
