use anyhow::{Context, Result};
use geo::{Coord, Geometry, LineString, Polygon};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use crate::model::{MapMarker, MapOverlay};

const TILE_URL: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";
const TILE_ATTRIBUTION: &str = "Esri World Imagery";
const DEFAULT_CENTER: (f64, f64) = (23.1, 113.25);
const DEFAULT_ZOOM: u8 = 10;

/// Renders overlays and markers into a standalone Leaflet page.
pub struct MapWriter {
    /// (latitude, longitude)
    center: (f64, f64),
    zoom: u8,
}

impl Default for MapWriter {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
        }
    }
}

impl MapWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(
        &self,
        overlays: &[MapOverlay],
        markers: &[MapMarker],
        output_path: &Path,
    ) -> Result<()> {
        tracing::info!(
            "Writing map with {} layers and {} markers to {}",
            overlays.len(),
            markers.len(),
            output_path.display()
        );
        let page = if overlays.is_empty() && markers.is_empty() {
            tracing::warn!("Nothing to draw, writing placeholder map page");
            FALLBACK_PAGE.to_string()
        } else {
            self.render(overlays, markers)
        };

        if let Err(e) = fs::write(output_path, page) {
            // 尽量留下一个说明页面
            let _ = fs::write(output_path, FALLBACK_PAGE);
            return Err(e)
                .with_context(|| format!("Failed to write map {}", output_path.display()));
        }
        Ok(())
    }

    pub fn render(&self, overlays: &[MapOverlay], markers: &[MapMarker]) -> String {
        let layers: Vec<Value> = overlays.iter().map(overlay_layer).collect();
        let markers: Vec<Value> = markers.iter().map(marker).collect();
        let data = json!({
            "center": [self.center.0, self.center.1],
            "zoom": self.zoom,
            "tiles": TILE_URL,
            "attribution": TILE_ATTRIBUTION,
            "layers": layers,
            "markers": markers,
        });
        // 防止属性值中的 </script> 提前结束脚本
        let data = data.to_string().replace("</", "<\\/");
        PAGE_TEMPLATE.replace("__MAP_DATA__", &data)
    }
}

fn overlay_layer(overlay: &MapOverlay) -> Value {
    let features: Vec<Value> = overlay
        .features
        .iter()
        .filter_map(|feature| {
            let geometry = feature.geometry.as_ref()?;
            let properties: serde_json::Map<String, Value> = overlay
                .fields
                .iter()
                .zip(&feature.values)
                .map(|(name, value)| {
                    let value = value.as_deref().map_or(Value::Null, |v| json!(v));
                    (name.clone(), value)
                })
                .collect();
            Some(json!({
                "type": "Feature",
                "geometry": geometry_json(geometry),
                "properties": properties,
            }))
        })
        .collect();

    json!({
        "name": overlay.label,
        "popup": popup_html(overlay),
        "data": {
            "type": "FeatureCollection",
            "features": features,
        },
    })
}

fn marker(marker: &MapMarker) -> Value {
    json!({
        "lat": marker.latitude,
        "lng": marker.longitude,
        "popup": format!(
            "<b>地块编码:</b> {}<br><b>地块名称:</b> {}<br><b>登记坐标:</b> {:.6}, {:.6}",
            escape_html(&marker.code),
            escape_html(&marker.name),
            marker.longitude,
            marker.latitude
        ),
    })
}

fn popup_html(overlay: &MapOverlay) -> String {
    let mut html = format!(
        "<b>ZIP文件:</b> {}<br><b>地块编码:</b> {}<br><table><tr>",
        escape_html(&overlay.archive),
        escape_html(&overlay.code)
    );
    for field in &overlay.fields {
        html.push_str(&format!("<th>{}</th>", escape_html(field)));
    }
    html.push_str("</tr>");
    for feature in &overlay.features {
        html.push_str("<tr>");
        for value in &feature.values {
            html.push_str(&format!(
                "<td>{}</td>",
                escape_html(value.as_deref().unwrap_or(""))
            ));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn position(coord: &Coord<f64>) -> Value {
    json!([coord.x, coord.y])
}

fn line(line: &LineString<f64>) -> Value {
    Value::Array(line.coords().map(position).collect())
}

fn rings(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![line(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(line));
    Value::Array(rings)
}

/// GeoJSON geometry object for `geometry`.
pub fn geometry_json(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": position(&p.0)}),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.iter().map(|p| position(&p.0)).collect::<Vec<_>>(),
        }),
        Geometry::Line(l) => json!({
            "type": "LineString",
            "coordinates": [position(&l.start), position(&l.end)],
        }),
        Geometry::LineString(ls) => json!({"type": "LineString", "coordinates": line(ls)}),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.iter().map(line).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": rings(p)}),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.iter().map(rings).collect::<Vec<_>>(),
        }),
        Geometry::Rect(r) => geometry_json(&Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => geometry_json(&Geometry::Polygon(t.to_polygon())),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.iter().map(geometry_json).collect::<Vec<_>>(),
        }),
    }
}

const PAGE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>地块边界检查结果</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
html, body, #map { height: 100%; margin: 0; }
.leaflet-popup-content table { border-collapse: collapse; font-size: 12px; }
.leaflet-popup-content th, .leaflet-popup-content td { border: 1px solid #ccc; padding: 2px 4px; }
</style>
</head>
<body>
<div id="map"></div>
<script>
const MAP_DATA = __MAP_DATA__;
const map = L.map("map").setView(MAP_DATA.center, MAP_DATA.zoom);
const imagery = L.tileLayer(MAP_DATA.tiles, { attribution: MAP_DATA.attribution }).addTo(map);
const overlays = {};
const bounds = L.latLngBounds([]);
for (const layer of MAP_DATA.layers) {
  const geo = L.geoJSON(layer.data, {
    style: { color: "#ff0000", weight: 2, fillOpacity: 0.1 }
  }).bindPopup(layer.popup, { maxWidth: 1200 });
  geo.addTo(map);
  overlays[layer.name] = geo;
  if (geo.getBounds().isValid()) { bounds.extend(geo.getBounds()); }
}
const markers = L.layerGroup();
for (const m of MAP_DATA.markers) {
  L.marker([m.lat, m.lng]).bindPopup(m.popup).addTo(markers);
  bounds.extend([m.lat, m.lng]);
}
markers.addTo(map);
overlays["地块登记位置"] = markers;
L.control.layers({ "影像": imagery }, overlays).addTo(map);
if (bounds.isValid()) { map.fitBounds(bounds); }
</script>
</body>
</html>
"##;

const FALLBACK_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>地块边界检查结果</title>
</head>
<body>
<h1>地块边界检查结果</h1>
<p>地图生成失败，请检查日志。</p>
<p>可能原因：</p>
<ul>
<li>没有有效的SHP文件</li>
<li>坐标系设置不当</li>
<li>网络问题（无法加载底图）</li>
</ul>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Feature;
    use geo::{point, polygon};

    fn overlay() -> MapOverlay {
        MapOverlay {
            label: "a_1234567890123.zip (1234567890123)".to_string(),
            archive: "a_1234567890123.zip".to_string(),
            code: "1234567890123".to_string(),
            fields: vec!["DKMC".to_string(), "YDMJ".to_string()],
            features: vec![Feature {
                geometry: Some(Geometry::Polygon(polygon![
                    (x: 113.0, y: 23.0),
                    (x: 113.5, y: 23.0),
                    (x: 113.5, y: 23.5),
                ])),
                values: vec![Some("</script>地块".to_string()), None],
            }],
        }
    }

    #[test]
    fn test_polygon_geojson() {
        let value = geometry_json(&Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]));
        assert_eq!(value["type"], "Polygon");
        // 外环自动闭合
        assert_eq!(value["coordinates"][0].as_array().unwrap().len(), 4);
        assert_eq!(value["coordinates"][0][1], json!([1.0, 0.0]));

        let value = geometry_json(&Geometry::Point(point!(x: 113.3, y: 23.1)));
        assert_eq!(value, json!({"type": "Point", "coordinates": [113.3, 23.1]}));
    }

    #[test]
    fn test_overlay_properties() {
        let layer = overlay_layer(&overlay());
        assert_eq!(layer["name"], "a_1234567890123.zip (1234567890123)");
        let properties = &layer["data"]["features"][0]["properties"];
        assert_eq!(properties["DKMC"], "</script>地块");
        assert!(properties["YDMJ"].is_null());
        assert!(layer["popup"].as_str().unwrap().contains("&lt;/script&gt;"));
    }

    #[test]
    fn test_empty_map_writes_fallback_page() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("地块边界检查结果.html");
        MapWriter::new().write(&[], &[], &path).unwrap();

        let html = fs::read_to_string(&path).unwrap();
        assert!(html.contains("地图生成失败"));
        assert!(!html.contains("leaflet"));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("map.html");
        let err = MapWriter::new().write(&[overlay()], &[], &path).unwrap_err();
        assert!(err.to_string().starts_with("Failed to write map"));
    }

    #[test]
    fn test_render_escapes_script_close() {
        let marker = MapMarker {
            code: "1234567890123".to_string(),
            name: "天河地块".to_string(),
            longitude: 113.3,
            latitude: 23.1,
        };
        let html = MapWriter::new().render(&[overlay()], &[marker]);
        assert!(html.contains("World_Imagery"));
        assert!(html.contains(r##"color: "#ff0000""##));
        assert!(html.trim_end().ends_with("</html>"));
        assert!(html.contains("a_1234567890123.zip (1234567890123)"));
        assert_eq!(html.matches("</script>").count(), 2);
        assert!(!html.contains("__MAP_DATA__"));
    }
}
