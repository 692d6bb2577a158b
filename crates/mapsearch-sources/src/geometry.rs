//! Geometry model shared by the adapters and the selection resolver.
//!
//! Geometries are GeoJSON-shaped so that backend payloads deserialize straight into
//! them, and convert to and from well-known text because inline candidate geometry
//! travels as WKT.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Result, SourceError, candidate::value_text};

/// A coordinate tuple; only the first two ordinates are interpreted.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    MultiPoint(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point(vec![x, y])
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPoint(_) => "MultiPoint",
            Self::MultiLineString(_) => "MultiLineString",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    pub const fn is_polygon(&self) -> bool {
        matches!(self, Self::Polygon(_))
    }

    fn positions(&self) -> Vec<&Position> {
        match self {
            Self::Point(p) => vec![p],
            Self::LineString(ps) | Self::MultiPoint(ps) => ps.iter().collect(),
            Self::Polygon(rings) | Self::MultiLineString(rings) => rings.iter().flatten().collect(),
            Self::MultiPolygon(polygons) => polygons.iter().flatten().flatten().collect(),
        }
    }

    /// Bounding box as `[min_x, min_y, max_x, max_y]`, `None` for empty geometries.
    pub fn extent(&self) -> Option<[f64; 4]> {
        self.positions()
            .into_iter()
            .filter_map(|p| Some((*p.first()?, *p.get(1)?)))
            .fold(None, |acc, (x, y)| match acc {
                None => Some([x, y, x, y]),
                Some([min_x, min_y, max_x, max_y]) => {
                    Some([min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y)])
                }
            })
    }

    /// Centre of the extent.
    pub fn center(&self) -> Option<[f64; 2]> {
        self.extent()
            .map(|[min_x, min_y, max_x, max_y]| [(min_x + max_x) / 2.0, (min_y + max_y) / 2.0])
    }

    pub fn to_wkt(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Point(p) => {
                out.push_str("POINT(");
                write_position(&mut out, p);
                out.push(')');
            }
            Self::LineString(ps) => {
                out.push_str("LINESTRING");
                write_ring(&mut out, ps);
            }
            Self::Polygon(rings) => {
                out.push_str("POLYGON");
                write_rings(&mut out, rings);
            }
            Self::MultiPoint(ps) => {
                out.push_str("MULTIPOINT(");
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('(');
                    write_position(&mut out, p);
                    out.push(')');
                }
                out.push(')');
            }
            Self::MultiLineString(lines) => {
                out.push_str("MULTILINESTRING");
                write_rings(&mut out, lines);
            }
            Self::MultiPolygon(polygons) => {
                out.push_str("MULTIPOLYGON(");
                for (i, rings) in polygons.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_rings(&mut out, rings);
                }
                out.push(')');
            }
        }
        out
    }

    pub fn from_wkt(wkt: &str) -> Result<Self> {
        WktParser::new(wkt).parse()
    }
}

fn write_position(out: &mut String, p: &Position) {
    for (i, ordinate) in p.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{ordinate}");
    }
}

fn write_ring(out: &mut String, ps: &[Position]) {
    out.push('(');
    for (i, p) in ps.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_position(out, p);
    }
    out.push(')');
}

fn write_rings(out: &mut String, rings: &[Vec<Position>]) {
    out.push('(');
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_ring(out, ring);
    }
    out.push(')');
}

/// Parenthesised WKT body before it is interpreted for a specific geometry type.
#[derive(Debug)]
enum Nested {
    Positions(Vec<Position>),
    Groups(Vec<Nested>),
}

impl Nested {
    fn into_positions(self) -> Result<Vec<Position>> {
        match self {
            Self::Positions(ps) => Ok(ps),
            Self::Groups(_) => Err(SourceError::Geometry("expected a coordinate list".into())),
        }
    }

    fn into_rings(self) -> Result<Vec<Vec<Position>>> {
        match self {
            Self::Groups(groups) => groups.into_iter().map(Self::into_positions).collect(),
            Self::Positions(_) => Err(SourceError::Geometry("expected nested rings".into())),
        }
    }
}

struct WktParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> WktParser<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Geometry> {
        self.skip_ws();
        let keyword = self.keyword().to_ascii_uppercase();
        self.skip_ws();
        // Dimension markers such as `Z` or `M` are accepted and ignored.
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.keyword();
        }
        let body = self.group()?;
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(self.error("trailing characters"));
        }

        match keyword.as_str() {
            "POINT" => {
                let mut ps = body.into_positions()?;
                match (ps.pop(), ps.is_empty()) {
                    (Some(p), true) => Ok(Geometry::Point(p)),
                    _ => Err(self.error("POINT needs exactly one position")),
                }
            }
            "LINESTRING" => Ok(Geometry::LineString(body.into_positions()?)),
            "POLYGON" => Ok(Geometry::Polygon(body.into_rings()?)),
            "MULTIPOINT" => match body {
                Nested::Positions(ps) => Ok(Geometry::MultiPoint(ps)),
                Nested::Groups(groups) => Ok(Geometry::MultiPoint(
                    groups
                        .into_iter()
                        .map(Nested::into_positions)
                        .collect::<Result<Vec<_>>>()?
                        .into_iter()
                        .flatten()
                        .collect(),
                )),
            },
            "MULTILINESTRING" => Ok(Geometry::MultiLineString(body.into_rings()?)),
            "MULTIPOLYGON" => match body {
                Nested::Groups(groups) => Ok(Geometry::MultiPolygon(
                    groups
                        .into_iter()
                        .map(Nested::into_rings)
                        .collect::<Result<_>>()?,
                )),
                Nested::Positions(_) => Err(self.error("MULTIPOLYGON needs nested polygons")),
            },
            other => Err(SourceError::Geometry(format!(
                "unsupported WKT geometry type '{other}'"
            ))),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn keyword(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn group(&mut self) -> Result<Nested> {
        self.expect('(')?;
        self.skip_ws();
        let nested = if self.peek() == Some('(') {
            let mut groups = vec![self.group()?];
            while self.comma() {
                groups.push(self.group()?);
            }
            Nested::Groups(groups)
        } else {
            let mut positions = vec![self.position()?];
            while self.comma() {
                positions.push(self.position()?);
            }
            Nested::Positions(positions)
        };
        self.expect(')')?;
        Ok(nested)
    }

    fn comma(&mut self) -> bool {
        self.skip_ws();
        if self.peek() == Some(',') {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn position(&mut self) -> Result<Position> {
        let mut ordinates = Vec::with_capacity(2);
        loop {
            self.skip_ws();
            let start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            {
                self.pos += 1;
            }
            if start == self.pos {
                break;
            }
            let ordinate = self.input[start..self.pos]
                .parse::<f64>()
                .map_err(|_| self.error("invalid number"))?;
            ordinates.push(ordinate);
        }
        if ordinates.len() < 2 {
            return Err(self.error("a position needs at least two ordinates"));
        }
        Ok(ordinates)
    }

    fn error(&self, reason: &str) -> SourceError {
        SourceError::Geometry(format!("{reason} at offset {} in '{}'", self.pos, self.input))
    }
}

/// A GeoJSON feature. The `type` member is not checked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn property_text(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(value_text)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// Conversion between backend geometry encodings and WKT.
///
/// The embedding map viewer usually owns this (it already converts WKT to its own
/// feature type); [`WktCodec`] is the built-in implementation.
pub trait GeometryCodec: Send + Sync {
    /// Convert a GeoJSON geometry object to well-known text.
    fn geojson_to_wkt(&self, value: &Value) -> Result<String>;

    /// Parse well-known text into a geometry.
    fn wkt_to_geometry(&self, wkt: &str) -> Result<Geometry>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WktCodec;

impl GeometryCodec for WktCodec {
    fn geojson_to_wkt(&self, value: &Value) -> Result<String> {
        let geometry = Geometry::deserialize(value)?;
        Ok(geometry.to_wkt())
    }

    fn wkt_to_geometry(&self, wkt: &str) -> Result<Geometry> {
        Geometry::from_wkt(wkt)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn square(offset: f64) -> Geometry {
        Geometry::Polygon(vec![vec![
            vec![offset, offset],
            vec![offset + 1.0, offset],
            vec![offset + 1.0, offset + 1.0],
            vec![offset, offset],
        ]])
    }

    #[test]
    fn test_point_wkt() {
        assert_eq!(
            Geometry::point(134690.511, 6610941.918).to_wkt(),
            "POINT(134690.511 6610941.918)"
        );
        assert_eq!(
            Geometry::from_wkt("POINT(134690.511 6610941.918)").unwrap(),
            Geometry::point(134690.511, 6610941.918)
        );
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_case() {
        let parsed = Geometry::from_wkt("  polygon (( 0 0 , 1 0, 1 1 , 0 0 ))").unwrap();
        assert_eq!(parsed.type_name(), "Polygon");
        assert_eq!(parsed.to_wkt(), "POLYGON((0 0,1 0,1 1,0 0))");
    }

    #[test]
    fn test_multipolygon_wkt() {
        let wkt = "MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((5 5,6 5,6 6,5 5)))";
        let parsed = Geometry::from_wkt(wkt).unwrap();
        match &parsed {
            Geometry::MultiPolygon(polygons) => assert_eq!(polygons.len(), 2),
            other => panic!("unexpected geometry {other:?}"),
        }
        assert_eq!(parsed.to_wkt(), wkt);
    }

    #[test]
    fn test_multipoint_both_notations() {
        let bare = Geometry::from_wkt("MULTIPOINT(1 2, 3 4)").unwrap();
        let wrapped = Geometry::from_wkt("MULTIPOINT((1 2),(3 4))").unwrap();
        assert_eq!(bare, wrapped);
    }

    #[test]
    fn test_invalid_wkt() {
        assert!(Geometry::from_wkt("POINT(1)").is_err());
        assert!(Geometry::from_wkt("CIRCLE(1 2)").is_err());
        assert!(Geometry::from_wkt("POINT(1 2").is_err());
        assert!(Geometry::from_wkt("POINT(1 2) x").is_err());
    }

    #[test]
    fn test_wkt_with_multibyte_characters() {
        assert_eq!(
            Geometry::from_wkt("POINT(1\u{a0}2)").unwrap(),
            Geometry::point(1.0, 2.0)
        );
        assert_eq!(
            Geometry::from_wkt("POINT(1\u{2003}2)\u{3000}").unwrap(),
            Geometry::point(1.0, 2.0)
        );
        assert!(matches!(
            Geometry::from_wkt("POINT(1 2ä)"),
            Err(SourceError::Geometry(_))
        ));
        assert!(Geometry::from_wkt("PUNKT\u{a0}ö(1 2)").is_err());
    }

    #[test]
    fn test_extent_and_center() {
        let geometry = square(2.0);
        assert_eq!(geometry.extent(), Some([2.0, 2.0, 3.0, 3.0]));
        assert_eq!(geometry.center(), Some([2.5, 2.5]));
        assert_eq!(Geometry::LineString(vec![]).extent(), None);
    }

    #[test]
    fn test_geojson_round_trip_through_codec() {
        let value = json!({ "type": "Point", "coordinates": [17.1, 60.7] });
        let wkt = WktCodec.geojson_to_wkt(&value).unwrap();
        assert_eq!(wkt, "POINT(17.1 60.7)");
        assert!(WktCodec.geojson_to_wkt(&json!({ "type": "Circle" })).is_err());
    }

    #[test]
    fn test_feature_collection_deserializes() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] },
                  "properties": { "name": "Hallsta 1:2", "objektidentitet": "abc" } },
                { "type": "Feature", "geometry": null, "properties": {} }
            ]
        });
        let collection: FeatureCollection = serde_json::from_value(value).unwrap();
        assert_eq!(collection.features.len(), 2);
        assert_eq!(
            collection.features[0].property_text("objektidentitet").as_deref(),
            Some("abc")
        );
        assert!(collection.features[1].geometry.is_none());
    }
}
