//! Per-archive validation pipeline.
//!
//! Archives are grouped by the parcel code in their name and processed one
//! at a time. Each archive ends in exactly one [`ParcelResult`]; a failure
//! in one archive never stops the run, including a panic inside the
//! geometry backend.

use geo::Geometry;
use std::any::Any;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::containment::check_containment;
use crate::crs::{classify_prj_file, CoordinateType};
use crate::encoding::detect_encoding;
use crate::engine::{Crs, Feature, GeometryEngine, Layer};
use crate::error::{Error, Result};
use crate::fields::check_fields;
use crate::model::{Issue, MapMarker, MapOverlay, ParcelRecord, ParcelResult, YES};
use crate::registry::{group_archives, Registry};
use crate::summary::Summary;
use crate::zip_handler::{has_extension, sidecar_path, CleanupPolicy, ScratchDir, ZipHandler};

const CPG_MISSING_STATUS: &str = "缺失cpg文件";
const POINT_LAYER_STATUS: &str = "point shp，请转为polygon shp";
const LINE_LAYER_STATUS: &str = "line shp，请转为polygon shp";
const PRJ_MISSING_STATUS: &str = ".prj文件不存在";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Extraction area, recreated for every archive.
    pub scratch_dir: PathBuf,
    pub cleanup: CleanupPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("parcel_check_extract"),
            cleanup: CleanupPolicy::default(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<ParcelResult>,
    pub registry_size: usize,
    pub archive_count: usize,
    /// Distinct parcel codes among the archives.
    pub code_count: usize,
    pub overlays: Vec<MapOverlay>,
    pub markers: Vec<MapMarker>,
}

impl RunReport {
    pub fn summary(&self) -> Summary {
        Summary::from_results(
            &self.results,
            self.registry_size,
            self.archive_count,
            self.code_count,
        )
    }
}

pub struct Pipeline<'a, E: GeometryEngine + ?Sized> {
    engine: &'a E,
    registry: &'a Registry,
    config: PipelineConfig,
}

impl<'a, E: GeometryEngine + ?Sized> Pipeline<'a, E> {
    pub fn new(engine: &'a E, registry: &'a Registry, config: PipelineConfig) -> Self {
        Self {
            engine,
            registry,
            config,
        }
    }

    /// Validates every `.zip` archive directly inside `input_dir`.
    pub fn run(&self, input_dir: &Path) -> Result<RunReport> {
        if !input_dir.is_dir() {
            return Err(Error::InputDir(input_dir.to_path_buf()));
        }

        let archives = list_archives(input_dir)?;
        let groups = group_archives(&archives);
        info!(
            "Found {} archives for {} parcel codes in {:?}",
            archives.len(),
            groups.len(),
            input_dir
        );

        let mut report = RunReport {
            registry_size: self.registry.row_count(),
            archive_count: archives.len(),
            code_count: groups.len(),
            ..Default::default()
        };

        for group in &groups {
            let Some(record) = self.registry.get(&group.code) else {
                warn!("Parcel code {} not found in registry", group.code);
                for archive in &group.archives {
                    report
                        .results
                        .push(ParcelResult::unmatched(archive, &group.code));
                }
                continue;
            };

            if let Some((longitude, latitude)) = record.coordinates() {
                report.markers.push(MapMarker {
                    code: record.code.clone(),
                    name: record.name.clone(),
                    longitude,
                    latitude,
                });
            }

            for archive in &group.archives {
                info!("Processing {} ({})", archive, group.code);
                let processed = catch_unwind(AssertUnwindSafe(|| {
                    self.process_archive(input_dir, archive, record)
                }));
                let (result, overlay) = match processed {
                    Ok(processed) => processed,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!("Processing {} panicked: {}", archive, message);
                        let mut result = ParcelResult::for_parcel(archive.as_str(), record);
                        result.issues.push(Issue::Processing(message));
                        (result, None)
                    }
                };
                if !result.is_pass() {
                    info!("{}: {}", archive, result.summary());
                }
                report.results.push(result);
                report.overlays.extend(overlay);
            }
        }

        Ok(report)
    }

    fn process_archive(
        &self,
        input_dir: &Path,
        archive: &str,
        record: &ParcelRecord,
    ) -> (ParcelResult, Option<MapOverlay>) {
        let mut result = ParcelResult::for_parcel(archive, record);

        let scratch = match ScratchDir::create(&self.config.scratch_dir, self.config.cleanup) {
            Ok(scratch) => scratch,
            Err(e) => {
                error!("Cannot prepare scratch directory for {}: {}", archive, e);
                result.issues.push(Issue::Processing(e.to_string()));
                return (result, None);
            }
        };

        let extraction = match ZipHandler::new(input_dir.join(archive)).extract_to(&scratch) {
            Ok(extraction) => extraction,
            Err(e) => {
                error!("Failed to extract {}: {}", archive, e);
                result.issues.push(Issue::Extraction(e.to_string()));
                return (result, None);
            }
        };
        result.shp_file_relative = Some(extraction.relative_path.clone());

        if extraction.has_cpg {
            result.cpg = Some(YES.to_string());
        } else {
            result.cpg = Some(CPG_MISSING_STATUS.to_string());
            result.issues.push(Issue::CpgMissing);
        }

        let encoding = detect_encoding(&extraction.geometry_file);
        let layer = match self.engine.read_layer(&extraction.geometry_file, &encoding) {
            Ok(layer) => layer,
            Err(e) => {
                error!("Failed to read {}: {}", extraction.relative_path, e);
                result.issues.push(Issue::Read(e.to_string()));
                return (result, None);
            }
        };
        result.encoding = Some(encoding);

        let has_geometry = check_geometry_type(&layer, &mut result);
        check_attribute_fields(&layer, &mut result);
        let prj_kind = check_prj(&extraction.geometry_file, &mut result);

        if has_geometry {
            match record.coordinates() {
                Some(point) => {
                    let outcome = check_containment(self.engine, &layer, point, prj_kind);
                    result.in_polygon = outcome.in_polygon;
                    result.corrected = outcome.corrected;
                    for issue in outcome.issues {
                        result.issues.push(issue);
                    }
                }
                None => result.issues.push(Issue::InvalidCoordinate),
            }
        } else {
            result.issues.push(Issue::ContainmentUnchecked);
        }

        let overlay = self.overlay(archive, &record.code, &layer);
        (result, overlay)
    }

    /// Layer reprojected to CGCS2000 for display. Reprojection failures only
    /// drop the overlay.
    fn overlay(&self, archive: &str, code: &str, layer: &Layer) -> Option<MapOverlay> {
        let target = Crs::cgcs2000();
        let features: Result<Vec<Feature>> = layer
            .features
            .iter()
            .map(|feature| -> Result<Feature> {
                let geometry = match &feature.geometry {
                    Some(g) if layer.crs == target => Some(g.clone()),
                    Some(g) => Some(self.engine.reproject_geometry(g, &layer.crs, &target)?),
                    None => None,
                };
                Ok(Feature {
                    geometry,
                    values: feature.values.clone(),
                })
            })
            .collect();

        match features {
            Ok(features) => Some(MapOverlay {
                label: format!("{} ({})", archive, code),
                archive: archive.to_string(),
                code: code.to_string(),
                fields: layer.fields.clone(),
                features,
            }),
            Err(e) => {
                warn!("Skipping map layer for {}: {}", archive, e);
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_string()
    }
}

/// Archive file names in `dir`, sorted.
pub fn list_archives(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, "zip") {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Records the polygon status. Returns whether the layer has any geometry.
fn check_geometry_type(layer: &Layer, result: &mut ParcelResult) -> bool {
    let mut geometries = layer.geometries().peekable();
    if geometries.peek().is_none() {
        result.issues.push(Issue::NoGeometry);
        return false;
    }

    let mut has_polygon = false;
    let mut has_point = false;
    for geometry in geometries {
        match geometry {
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => has_polygon = true,
            Geometry::Point(_) | Geometry::MultiPoint(_) => has_point = true,
            _ => {}
        }
    }

    if has_polygon {
        result.polygon = Some(YES.to_string());
    } else {
        let status = if has_point {
            POINT_LAYER_STATUS
        } else {
            LINE_LAYER_STATUS
        };
        result.polygon = Some(status.to_string());
        result.issues.push(Issue::GeometryType);
    }
    true
}

fn check_attribute_fields(layer: &Layer, result: &mut ParcelResult) {
    let report = check_fields(layer);

    result.field = Some(report.missing_status().unwrap_or_else(|| YES.to_string()));
    if report.has_missing() {
        result.issues.push(Issue::FieldMissing);
    }

    result.field_content = Some(report.empty_status().unwrap_or_else(|| YES.to_string()));
    if report.has_empty() {
        result.issues.push(Issue::FieldEmpty);
    }
}

/// Records the CRS description and returns the `.prj` classification,
/// [`CoordinateType::Unknown`] when the file is absent.
fn check_prj(geometry_file: &Path, result: &mut ParcelResult) -> CoordinateType {
    let Some(prj) = sidecar_path(geometry_file, "prj") else {
        result.crs = Some(PRJ_MISSING_STATUS.to_string());
        result.issues.push(Issue::PrjMissing);
        return CoordinateType::Unknown;
    };

    let class = classify_prj_file(&prj);
    result.crs = Some(class.name);
    if class.kind == CoordinateType::Geographic {
        result.issues.push(Issue::GeographicCrs);
    }
    class.kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};
    use tempfile::TempDir;

    fn layer_of(geometries: Vec<Geometry<f64>>) -> Layer {
        Layer {
            fields: Vec::new(),
            features: geometries
                .into_iter()
                .map(|g| Feature {
                    geometry: Some(g),
                    values: Vec::new(),
                })
                .collect(),
            crs: Crs::Undefined,
        }
    }

    #[test]
    fn test_geometry_type_statuses() {
        let mut result = ParcelResult::default();
        let polygons = layer_of(vec![Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ])]);
        assert!(check_geometry_type(&polygons, &mut result));
        assert_eq!(result.polygon.as_deref(), Some("是"));
        assert!(result.is_pass());

        let mut result = ParcelResult::default();
        let points = layer_of(vec![Geometry::Point(point!(x: 0.0, y: 0.0))]);
        assert!(check_geometry_type(&points, &mut result));
        assert_eq!(result.polygon.as_deref(), Some(POINT_LAYER_STATUS));
        assert_eq!(result.summary(), "几何类型错误");

        let mut result = ParcelResult::default();
        let lines = layer_of(vec![Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ])]);
        check_geometry_type(&lines, &mut result);
        assert_eq!(result.polygon.as_deref(), Some(LINE_LAYER_STATUS));

        let mut result = ParcelResult::default();
        assert!(!check_geometry_type(&Layer::default(), &mut result));
        assert_eq!(result.summary(), "SHP文件无有效几何数据");
    }

    #[test]
    fn test_missing_prj() {
        let dir = TempDir::new().unwrap();
        let shp = dir.path().join("parcel.shp");
        fs::write(&shp, b"").unwrap();

        let mut result = ParcelResult::default();
        assert_eq!(check_prj(&shp, &mut result), CoordinateType::Unknown);
        assert_eq!(result.crs.as_deref(), Some(".prj文件不存在"));
        assert_eq!(result.summary(), "坐标系文件缺失");
    }

    #[test]
    fn test_geographic_prj_is_flagged() {
        let dir = TempDir::new().unwrap();
        let shp = dir.path().join("parcel.shp");
        fs::write(&shp, b"").unwrap();
        fs::write(
            dir.path().join("parcel.PRJ"),
            r#"GEOGCS["GCS_China_Geodetic_Coordinate_System_2000"]"#,
        )
        .unwrap();

        let mut result = ParcelResult::default();
        assert_eq!(check_prj(&shp, &mut result), CoordinateType::Geographic);
        assert_eq!(
            result.crs.as_deref(),
            Some("GCS_CHINA_GEODETIC_COORDINATE_SYSTEM_2000")
        );
        assert_eq!(result.summary(), "地理坐标系（注意：应使用投影坐标系）");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(payload.as_ref()), "index out of bounds");

        let payload: Box<dyn Any + Send> = Box::new(format!("bad vertex {}", 3));
        assert_eq!(panic_message(payload.as_ref()), "bad vertex 3");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unexpected panic");
    }

    #[test]
    fn test_list_archives_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b_2222222222222.ZIP"), b"").unwrap();
        fs::write(dir.path().join("a_1111111111111.zip"), b"").unwrap();
        fs::write(dir.path().join("地块信息.xlsx"), b"").unwrap();
        fs::create_dir(dir.path().join("c.zip")).unwrap();

        let names = list_archives(dir.path()).unwrap();
        assert_eq!(names, vec!["a_1111111111111.zip", "b_2222222222222.ZIP"]);
    }
}
