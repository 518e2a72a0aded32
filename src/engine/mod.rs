//! Geometry/format engine seam.
//!
//! The validation pipeline only needs two things from a GIS backend: reading
//! a shapefile bundle into geometries plus attributes, and reprojecting
//! coordinates between reference systems. Containment and centroid tests run
//! on [`geo`] types so they behave the same whatever backend is plugged in.

use geo::{Coord, CoordsIter, Geometry, MapCoords};
use std::path::Path;

use crate::error::Result;

#[cfg(feature = "gdal")]
mod gdal_engine;
#[cfg(feature = "gdal")]
pub use gdal_engine::GdalEngine;

/// EPSG code of CGCS2000 geographic coordinates, the registry's reference.
pub const CGCS2000_EPSG: u32 = 4490;

/// Coordinate reference system descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Crs {
    Epsg(u32),
    Wkt(String),
    #[default]
    Undefined,
}

impl Crs {
    pub fn cgcs2000() -> Self {
        Crs::Epsg(CGCS2000_EPSG)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    /// Values aligned with [`Layer::fields`]; `None` is a null cell.
    pub values: Vec<Option<String>>,
}

/// Geometry layer read from a shapefile bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    pub fields: Vec<String>,
    pub features: Vec<Feature>,
    pub crs: Crs,
}

impl Layer {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    /// Whether every value of `name` is null or blank. True for layers
    /// without features.
    pub fn is_all_null(&self, name: &str) -> bool {
        let Some(idx) = self.field_index(name) else {
            return true;
        };
        self.features.iter().all(|feature| {
            feature
                .values
                .get(idx)
                .and_then(|v| v.as_deref())
                .map_or(true, |v| v.trim().is_empty())
        })
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().filter_map(|f| f.geometry.as_ref())
    }

    /// Whether any vertex has a NaN or infinite ordinate.
    pub fn has_non_finite_coords(&self) -> bool {
        self.geometries()
            .any(|geometry| geometry.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()))
    }
}

pub trait GeometryEngine {
    /// Reads the first layer of the bundle at `path`, decoding attribute text
    /// with `encoding` (a label from [`crate::encoding::detect_encoding`]).
    fn read_layer(&self, path: &Path, encoding: &str) -> Result<Layer>;

    /// Reprojects one coordinate. Coordinates are always (x, y) =
    /// (easting, northing) or (longitude, latitude).
    fn reproject(&self, coord: Coord<f64>, from: &Crs, to: &Crs) -> Result<Coord<f64>>;

    fn reproject_geometry(
        &self,
        geometry: &Geometry<f64>,
        from: &Crs,
        to: &Crs,
    ) -> Result<Geometry<f64>> {
        geometry.try_map_coords(|coord| self.reproject(coord, from, to))
    }
}
