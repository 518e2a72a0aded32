//! Registered-point containment check and centroid correction.

use geo::{BooleanOps, Centroid, Contains, Coord, Geometry, GeometryCollection, MultiPolygon, Point};
use tracing::{debug, warn};

use crate::crs::CoordinateType;
use crate::engine::{Crs, GeometryEngine, Layer};
use crate::error::{Error, Result};
use crate::model::{Issue, YES};

const NON_FINITE_BOUNDARY: &str = "边界坐标包含无效数值";

/// Outcome of one containment check, applied to a result row by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Containment {
    pub in_polygon: Option<String>,
    pub corrected: Option<(f64, f64)>,
    pub issues: Vec<Issue>,
}

pub fn in_global_bounds(x: f64, y: f64) -> bool {
    (-180.0..=180.0).contains(&x) && (-90.0..=90.0).contains(&y)
}

pub fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Checks whether the registered point (longitude, latitude in CGCS2000)
/// lies strictly inside any geometry of `layer`.
///
/// `prj_kind` is the classification of the bundle's `.prj`, or
/// [`CoordinateType::Unknown`] when the file is absent. It is only consulted
/// when the centroid falls outside geographic bounds.
pub fn check_containment<E: GeometryEngine + ?Sized>(
    engine: &E,
    layer: &Layer,
    registered: (f64, f64),
    prj_kind: CoordinateType,
) -> Containment {
    let mut outcome = Containment::default();
    let (lon, lat) = registered;

    // geo 的包含与合并运算遇到 NaN 会 panic
    if layer.has_non_finite_coords() {
        warn!("Boundary layer has non-finite coordinates");
        outcome
            .issues
            .push(Issue::Processing(NON_FINITE_BOUNDARY.to_string()));
        return outcome;
    }

    let projected = match engine.reproject(Coord { x: lon, y: lat }, &Crs::cgcs2000(), &layer.crs) {
        Ok(coord) if coord.x.is_finite() && coord.y.is_finite() => Point::from(coord),
        Ok(coord) => {
            let detail = format!("non-finite result ({}, {})", coord.x, coord.y);
            outcome.issues.push(Issue::Reprojection(detail));
            return outcome;
        }
        Err(e) => {
            outcome.issues.push(Issue::Reprojection(e.to_string()));
            return outcome;
        }
    };

    if layer.geometries().any(|geometry| geometry.contains(&projected)) {
        outcome.in_polygon = Some(YES.to_string());
        return outcome;
    }

    let outside = Issue::OutsideBoundary;
    outcome.in_polygon = Some(outside.to_string());
    outcome.issues.push(outside);

    match corrected_coordinate(engine, layer, prj_kind) {
        Ok((x, y)) => {
            outcome.corrected = Some((x, y));
            if !in_global_bounds(x, y) {
                warn!("Corrected coordinate out of range: ({:.6}, {:.6})", x, y);
                outcome.issues.push(Issue::AnomalousCoordinate);
            }
        }
        Err(e) => {
            warn!("Centroid computation failed: {}", e);
            outcome.issues.push(Issue::CentroidFailed);
        }
    }
    outcome
}

/// Centroid of the layer, expressed in CGCS2000 and rounded to 6 decimals.
pub fn corrected_coordinate<E: GeometryEngine + ?Sized>(
    engine: &E,
    layer: &Layer,
    prj_kind: CoordinateType,
) -> Result<(f64, f64)> {
    let centroid = layer_centroid(layer)
        .ok_or_else(|| Error::Engine("empty geometry has no centroid".to_string()))?;
    let (x, y) = centroid.x_y();

    let looks_geographic = in_global_bounds(x, y);
    let kind = if looks_geographic {
        debug!("Centroid ({:.6}, {:.6}) is within geographic bounds", x, y);
        CoordinateType::Geographic
    } else if prj_kind == CoordinateType::Geographic {
        warn!(
            ".prj declares a geographic CRS but centroid ({:.6}, {:.6}) is out of range, treating as projected",
            x, y
        );
        CoordinateType::Projected
    } else {
        prj_kind
    };

    let coord = if kind == CoordinateType::Geographic {
        centroid.0
    } else {
        engine.reproject(centroid.0, &layer.crs, &Crs::cgcs2000())?
    };
    Ok((round6(coord.x), round6(coord.y)))
}

/// Centroid of the union of all polygonal geometries. Layers without
/// polygons fall back to the centroid of every geometry. `None` for empty
/// layers and layers with non-finite vertices.
pub fn layer_centroid(layer: &Layer) -> Option<Point<f64>> {
    if layer.has_non_finite_coords() {
        return None;
    }

    let polygons: Vec<MultiPolygon<f64>> = layer
        .geometries()
        .filter_map(|geometry| match geometry {
            Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
            Geometry::MultiPolygon(mp) => Some(mp.clone()),
            _ => None,
        })
        .collect();

    if polygons.is_empty() {
        let collection: GeometryCollection<f64> = layer.geometries().cloned().collect();
        return collection.centroid();
    }

    let union = polygons
        .iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, mp| acc.union(mp));
    union.centroid()
}
