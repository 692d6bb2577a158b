use std::fmt;

use mapsearch_sources::Feature;
use serde::Serialize;
use serde_json::Value;

use crate::config::{DisplayMode, SearchOptions};

const COLLECTIVE_TYPE: &str = "Samfällighet";
const COLLECTIVE_ATTRIBUTES: &str = "samfallighetsattribut";
const PART_SEPARATOR: &str = "Enhetesomr";

/// Secondary information about the selected estate, shown from a marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstateReport {
    pub object_id: String,
    /// Where the report marker goes
    pub position: [f64; 2],
    pub body: ReportBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ReportBody {
    /// Attributes of a collective property, rendered as text
    Collective {
        designation: String,
        land_area: Option<String>,
        water_area: Option<String>,
        register_area: Option<String>,
        last_change: Option<String>,
        purposes: Vec<String>,
    },
    /// An external report page to embed
    Embedded {
        url: String,
        width: String,
        height: String,
    },
}

impl fmt::Display for ReportBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collective {
                designation,
                land_area,
                water_area,
                register_area,
                last_change,
                purposes,
            } => {
                writeln!(f, "{COLLECTIVE_TYPE}")?;
                write!(f, "Beteckning: {designation}")?;
                for (label, value) in [
                    ("Land area", land_area),
                    ("Vatten area", water_area),
                    ("Register area", register_area),
                    ("Senaste ändring", last_change),
                ] {
                    if let Some(value) = value {
                        write!(f, "\n{label}: {value}")?;
                    }
                }
                if !purposes.is_empty() {
                    write!(f, "\nSamfällighetsändamål: {}", purposes.join(","))?;
                }
                Ok(())
            }
            Self::Embedded { url, width, height } => write!(f, "{url} ({width} x {height})"),
        }
    }
}

/// Estate designation: the name up to the part separator, trimmed.
///
/// ```rust
/// use mapsearch::resolve::designation;
///
/// assert_eq!(designation("Hallstahammar Eldsbo 4:5 Enhetesområde 2"), "Hallstahammar Eldsbo 4:5");
/// assert_eq!(designation("Hallstahammar Eldsbo 4:5"), "Hallstahammar Eldsbo 4:5");
/// ```
pub fn designation(name: &str) -> &str {
    name.find(PART_SEPARATOR)
        .map_or(name, |at| &name[..at])
        .trim()
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Build the report for `feature`, when reports apply.
///
/// Reports are attached only in [`DisplayMode::GeometryOnly`] and only when a report
/// URL is configured.
pub fn build_report(
    feature: &Feature,
    object_id: &str,
    options: &SearchOptions,
    position: [f64; 2],
) -> Option<EstateReport> {
    if options.show_feature != DisplayMode::GeometryOnly {
        return None;
    }
    let report_url = options.report_url()?;

    let body = if feature.property_text("typ").as_deref() == Some(COLLECTIVE_TYPE) {
        let attributes = feature.property(COLLECTIVE_ATTRIBUTES);
        let field = |key: &str| text(attributes.and_then(|a| a.get(key)));
        ReportBody::Collective {
            designation: designation(&feature.property_text("name").unwrap_or_default())
                .to_owned(),
            land_area: field("totalLandarea"),
            water_area: field("totalVattenarea"),
            register_area: field("totalRegisterarea"),
            last_change: field("senasteAndring"),
            purposes: attributes
                .and_then(|a| a.get("samfallighetsandamal"))
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|v| text(Some(v))).collect())
                .unwrap_or_default(),
        }
    } else {
        ReportBody::Embedded {
            url: format!("{report_url}{object_id}"),
            width: options.estate_report_width.clone(),
            height: options.estate_report_height.clone(),
        }
    };

    Some(EstateReport {
        object_id: object_id.to_owned(),
        position,
        body,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn options(mode: DisplayMode) -> SearchOptions {
        SearchOptions::builder()
            .display_mode(mode)
            .estate_report_url("https://rapport.example/fastighet/")
            .build()
            .unwrap()
    }

    fn estate(properties: Value) -> Feature {
        serde_json::from_value(json!({ "geometry": null, "properties": properties })).unwrap()
    }

    #[test]
    fn test_embedded_report() {
        let feature = estate(json!({ "name": "Eldsbo 4:5", "objektidentitet": "909a" }));
        let report =
            build_report(&feature, "909a", &options(DisplayMode::GeometryOnly), [1.0, 2.0]).unwrap();
        assert_eq!(report.position, [1.0, 2.0]);
        assert_eq!(
            report.body,
            ReportBody::Embedded {
                url: "https://rapport.example/fastighet/909a".into(),
                width: "700px".into(),
                height: "500px".into(),
            }
        );
    }

    #[test]
    fn test_collective_report() {
        let feature = estate(json!({
            "name": "Kolbäck S:3 Enhetesområde 1",
            "typ": "Samfällighet",
            "samfallighetsattribut": {
                "totalLandarea": 1200,
                "senasteAndring": "2019-04-01",
                "samfallighetsandamal": ["Väg", "Dike"]
            }
        }));
        let report =
            build_report(&feature, "x", &options(DisplayMode::GeometryOnly), [0.0, 0.0]).unwrap();
        assert_eq!(
            report.body,
            ReportBody::Collective {
                designation: "Kolbäck S:3".into(),
                land_area: Some("1200".into()),
                water_area: None,
                register_area: None,
                last_change: Some("2019-04-01".into()),
                purposes: vec!["Väg".into(), "Dike".into()],
            }
        );
        assert_eq!(
            report.body.to_string(),
            "Samfällighet\nBeteckning: Kolbäck S:3\nLand area: 1200\nSenaste ändring: 2019-04-01\nSamfällighetsändamål: Väg,Dike"
        );
    }

    #[test]
    fn test_no_report_in_popup_mode_or_without_url() {
        let feature = estate(json!({ "name": "Eldsbo 4:5" }));
        assert!(build_report(&feature, "a", &options(DisplayMode::Popup), [0.0, 0.0]).is_none());
        assert!(build_report(&feature, "a", &SearchOptions::default(), [0.0, 0.0]).is_none());
    }
}
