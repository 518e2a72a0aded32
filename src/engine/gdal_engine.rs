use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{FieldValue, LayerAccess, ToGdal};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use geo::{Coord, Geometry};
use std::path::Path;
use tracing::debug;

use super::{Crs, Feature, GeometryEngine, Layer};
use crate::error::{Error, Result};

/// [`GeometryEngine`] backed by GDAL/OGR and PROJ.
#[derive(Debug, Default)]
pub struct GdalEngine {}

impl GdalEngine {
    pub fn new() -> Self {
        Self {}
    }

    fn spatial_ref(crs: &Crs) -> Result<SpatialRef> {
        let mut srs = match crs {
            Crs::Epsg(code) => SpatialRef::from_epsg(*code)?,
            Crs::Wkt(wkt) => SpatialRef::from_wkt(wkt)?,
            Crs::Undefined => return Err(Error::UndefinedCrs),
        };
        // 经纬度统一按 (经度, 纬度) 顺序
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        Ok(srs)
    }

    fn transform(from: &Crs, to: &Crs) -> Result<CoordTransform> {
        let source = Self::spatial_ref(from)?;
        let target = Self::spatial_ref(to)?;
        Ok(CoordTransform::new(&source, &target)?)
    }
}

/// Maps an encoding label onto the shapefile driver's `ENCODING` option.
fn driver_encoding(label: &str) -> String {
    match label {
        "gbk" | "cp936" | "mbcs" => "CP936".to_string(),
        "utf-8" => "UTF-8".to_string(),
        "latin1" => "ISO-8859-1".to_string(),
        other => other.to_uppercase(),
    }
}

fn field_value_to_string(value: FieldValue) -> String {
    match value {
        FieldValue::IntegerValue(v) => v.to_string(),
        FieldValue::Integer64Value(v) => v.to_string(),
        FieldValue::RealValue(v) => v.to_string(),
        FieldValue::StringValue(v) => v,
        FieldValue::DateValue(v) => v.format("%Y-%m-%d").to_string(),
        FieldValue::DateTimeValue(v) => v.format("%Y-%m-%d %H:%M:%S").to_string(),
        FieldValue::IntegerListValue(v) => format!("{:?}", v),
        FieldValue::Integer64ListValue(v) => format!("{:?}", v),
        FieldValue::RealListValue(v) => format!("{:?}", v),
        FieldValue::StringListValue(v) => v.join(","),
    }
}

impl GeometryEngine for GdalEngine {
    fn read_layer(&self, path: &Path, encoding: &str) -> Result<Layer> {
        let encoding_option = format!("ENCODING={}", driver_encoding(encoding));
        let open_options = [encoding_option.as_str()];
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_VECTOR,
            open_options: Some(&open_options[..]),
            ..Default::default()
        };
        let dataset = Dataset::open_ex(path, options)?;
        let mut layer = dataset.layer(0)?;

        let fields: Vec<String> = layer.defn().fields().map(|field| field.name()).collect();
        let crs = match layer.spatial_ref() {
            Some(srs) => Crs::Wkt(srs.to_wkt()?),
            None => Crs::Undefined,
        };

        let mut features = Vec::new();
        for feature in layer.features() {
            let geometry = match feature.geometry() {
                Some(geometry) => {
                    let mut geometry = geometry.clone();
                    geometry.flatten_to_2d();
                    Some(geometry.to_geo()?)
                }
                None => None,
            };
            let values = feature
                .fields()
                .map(|(_, value)| value.map(field_value_to_string))
                .collect();
            features.push(Feature { geometry, values });
        }
        debug!(
            "Read {} features with {} fields from {:?}",
            features.len(),
            fields.len(),
            path
        );

        Ok(Layer {
            fields,
            features,
            crs,
        })
    }

    fn reproject(&self, coord: Coord<f64>, from: &Crs, to: &Crs) -> Result<Coord<f64>> {
        let transform = Self::transform(from, to)?;
        let mut xs = [coord.x];
        let mut ys = [coord.y];
        transform.transform_coords(&mut xs, &mut ys, &mut [])?;
        Ok(Coord { x: xs[0], y: ys[0] })
    }

    fn reproject_geometry(
        &self,
        geometry: &Geometry<f64>,
        from: &Crs,
        to: &Crs,
    ) -> Result<Geometry<f64>> {
        let transform = Self::transform(from, to)?;
        let projected = geometry.to_gdal()?.transform(&transform)?;
        Ok(projected.to_geo()?)
    }
}
