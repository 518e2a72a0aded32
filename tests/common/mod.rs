// Shared fixtures for the pipeline integration tests.
#![allow(dead_code)]

use geo::{polygon, Coord, Geometry};
use parcel_check::engine::Feature;
use parcel_check::{CleanupPolicy, Crs, Error, GeometryEngine, Layer, PipelineConfig, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Projected CRS used by the fixture layers.
pub const PROJECTED: Crs = Crs::Epsg(4547);

pub const PROJECTED_PRJ: &str = r#"PROJCS["CGCS2000_3_Degree_GK_CM_114E",GEOGCS["GCS_China_Geodetic_Coordinate_System_2000",DATUM["D_China_2000",SPHEROID["CGCS2000",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Gauss_Kruger"],PARAMETER["False_Easting",500000.0],PARAMETER["Central_Meridian",114.0],UNIT["Meter",1.0]]"#;

pub const FIELDS: [&str; 5] = ["DKMC", "DKBM", "XZQDM", "XZQMC", "YDMJ"];

/// In-memory engine: layers are looked up by the geometry file's stem and
/// projection is linear, x = (lon - 100) * 1e5, y = lat * 1e5.
#[derive(Default)]
pub struct FakeEngine {
    layers: HashMap<String, Layer>,
    panicking: Option<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, stem: &str, layer: Layer) -> Self {
        self.layers.insert(stem.to_string(), layer);
        self
    }

    /// Panics when asked to read the layer named `stem`.
    pub fn panicking_on(mut self, stem: &str) -> Self {
        self.panicking = Some(stem.to_string());
        self
    }
}

impl GeometryEngine for FakeEngine {
    fn read_layer(&self, path: &Path, _encoding: &str) -> Result<Layer> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.panicking.as_deref() == Some(stem.as_str()) {
            panic!("driver crashed reading {}", stem);
        }
        self.layers
            .get(&stem)
            .cloned()
            .ok_or_else(|| Error::Engine(format!("cannot open {}", stem)))
    }

    fn reproject(&self, coord: Coord<f64>, from: &Crs, to: &Crs) -> Result<Coord<f64>> {
        match (from, to) {
            (a, b) if a == b => Ok(coord),
            (Crs::Epsg(4490), Crs::Epsg(4547)) => Ok(Coord {
                x: (coord.x - 100.0) * 1e5,
                y: coord.y * 1e5,
            }),
            (Crs::Epsg(4547), Crs::Epsg(4490)) => Ok(Coord {
                x: coord.x / 1e5 + 100.0,
                y: coord.y / 1e5,
            }),
            _ => Err(Error::UndefinedCrs),
        }
    }
}

/// Axis-aligned square in projected metres.
pub fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: x0, y: y0),
        (x: x0 + size, y: y0),
        (x: x0 + size, y: y0 + size),
        (x: x0, y: y0 + size),
    ])
}

/// Layer with every required field filled in.
pub fn parcel_layer(geometry: Geometry<f64>) -> Layer {
    Layer {
        fields: FIELDS.iter().map(|f| f.to_string()).collect(),
        features: vec![Feature {
            geometry: Some(geometry),
            values: vec![
                Some("天河地块".to_string()),
                Some("1234567890123".to_string()),
                Some("440106".to_string()),
                Some("天河区".to_string()),
                Some("12000.5".to_string()),
            ],
        }],
        crs: PROJECTED,
    }
}

/// Polygon around the registered point (113.3, 23.1).
pub fn containing_square() -> Geometry<f64> {
    square(1_320_000.0, 2_300_000.0, 20_000.0)
}

/// Ring with a NaN vertex around the registered point.
pub fn non_finite_square() -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: 1_320_000.0, y: 2_300_000.0),
        (x: f64::NAN, y: 2_300_000.0),
        (x: 1_340_000.0, y: 2_320_000.0),
        (x: 1_320_000.0, y: 2_320_000.0),
    ])
}

/// Polygon whose centroid is (1402000, 2295000), i.e. (114.02, 22.95).
pub fn distant_square() -> Geometry<f64> {
    square(1_400_000.0, 2_293_000.0, 4_000.0)
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Writes a shapefile bundle `<dir>/<stem>.*` into `archive`. The geometry
/// content itself is supplied by [`FakeEngine`].
pub fn write_bundle(archive: &Path, dir: &str, stem: &str, with_cpg: bool, with_prj: bool) {
    let name = |ext: &str| format!("{}/{}.{}", dir, stem, ext);
    let (shp, dbf, shx) = (name("shp"), name("dbf"), name("shx"));
    let (prj, cpg) = (name("prj"), name("cpg"));

    let mut entries: Vec<(&str, &[u8])> = vec![
        (shp.as_str(), &b"shp"[..]),
        (dbf.as_str(), &b"dbf"[..]),
        (shx.as_str(), &b"shx"[..]),
    ];
    if with_prj {
        entries.push((prj.as_str(), PROJECTED_PRJ.as_bytes()));
    }
    if with_cpg {
        entries.push((cpg.as_str(), &b"UTF-8"[..]));
    }
    write_zip(archive, &entries);
}

pub fn config(scratch_root: &TempDir) -> PipelineConfig {
    PipelineConfig {
        scratch_dir: scratch_root.path().join("extract"),
        cleanup: CleanupPolicy {
            max_attempts: 2,
            retry_delay: Duration::from_millis(10),
        },
    }
}
