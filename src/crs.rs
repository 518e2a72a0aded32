use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateType {
    Geographic,
    Projected,
    Unknown,
    Error,
}

impl fmt::Display for CoordinateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoordinateType::Geographic => "Geographic",
            CoordinateType::Projected => "Projection",
            CoordinateType::Unknown => "Unknown",
            CoordinateType::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Classification of a `.prj` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsClass {
    pub kind: CoordinateType,
    pub name: String,
}

impl CrsClass {
    fn new(kind: CoordinateType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

const PROJECTED_MARKERS: [&str; 2] = ["PROJCS", "PROJCRS"];
const GEOGRAPHIC_MARKERS: [&str; 3] = ["GEOGCS", "GEOGCRS", "GEODCRS"];

/// Reads and classifies a projection-definition file. I/O failures are
/// reported as [`CoordinateType::Error`].
pub fn classify_prj_file(path: &Path) -> CrsClass {
    match fs::read(path) {
        Ok(bytes) => classify_wkt(&String::from_utf8_lossy(&bytes)),
        Err(e) => CrsClass::new(CoordinateType::Error, format!("读取.prj文件出错: {}", e)),
    }
}

/// Classifies WKT content. The first matching rule wins: projected marker,
/// geographic marker, unit declaration, then unknown.
pub fn classify_wkt(content: &str) -> CrsClass {
    let content = content.to_uppercase();

    if let Some(marker) = PROJECTED_MARKERS.iter().find(|m| content.contains(*m)) {
        return CrsClass::new(CoordinateType::Projected, quoted_name(&content, marker));
    }
    if let Some(marker) = GEOGRAPHIC_MARKERS.iter().find(|m| content.contains(*m)) {
        return CrsClass::new(CoordinateType::Geographic, quoted_name(&content, marker));
    }

    if let Some(start) = content.find("UNIT[") {
        let unit = &content[start + "UNIT[".len()..];
        let unit = unit.split(']').next().unwrap_or(unit);
        if unit.contains("DEG") {
            return CrsClass::new(CoordinateType::Geographic, "Unknown Geographic System");
        }
        if unit.contains("METER") || unit.contains("METRE") {
            return CrsClass::new(CoordinateType::Projected, "Unknown Projected System");
        }
    }

    CrsClass::new(CoordinateType::Unknown, "Unknown Coordinate System")
}

fn quoted_name(content: &str, marker: &str) -> String {
    let pattern = format!("{}[\"", marker);
    content
        .find(&pattern)
        .map(|start| &content[start + pattern.len()..])
        .and_then(|rest| rest.split('"').next())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown".to_string())
}
