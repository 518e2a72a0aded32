use std::fmt;

/// 无问题时 result 列的取值
pub const PASS: &str = "pass";

/// 单项检查通过时的状态值
pub const YES: &str = "是";

/// Registry row for one parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRecord {
    /// 13-digit parcel code.
    pub code: String,
    pub name: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl ParcelRecord {
    pub fn new(code: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            code: code.into(),
            name: String::new(),
            longitude: Some(longitude),
            latitude: Some(latitude),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declared (longitude, latitude), when both cells were readable.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.longitude?, self.latitude?))
    }
}

/// One detected problem on an archive.
///
/// `Display` yields the stable tag written to the report; tags that carry a
/// detail keep the detail after a colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    NotFound,
    Extraction(String),
    Read(String),
    CpgMissing,
    NoGeometry,
    GeometryType,
    FieldMissing,
    FieldEmpty,
    GeographicCrs,
    PrjMissing,
    Reprojection(String),
    OutsideBoundary,
    AnomalousCoordinate,
    CentroidFailed,
    ContainmentUnchecked,
    InvalidCoordinate,
    Processing(String),
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::NotFound => f.write_str("地块信息中未找到该地块编码"),
            Issue::Extraction(detail) => write!(f, "解压错误: {}", detail),
            Issue::Read(detail) => write!(f, "shp读取错误: {}", detail),
            Issue::CpgMissing => f.write_str("cpg文件缺失"),
            Issue::NoGeometry => f.write_str("SHP文件无有效几何数据"),
            Issue::GeometryType => f.write_str("几何类型错误"),
            Issue::FieldMissing => f.write_str("字段缺失"),
            Issue::FieldEmpty => f.write_str("字段内容为空"),
            Issue::GeographicCrs => f.write_str("地理坐标系（注意：应使用投影坐标系）"),
            Issue::PrjMissing => f.write_str("坐标系文件缺失"),
            Issue::Reprojection(detail) => write!(f, "坐标系转换失败: {}", detail),
            Issue::OutsideBoundary => f.write_str("地块位置不在边界范围内"),
            Issue::AnomalousCoordinate => f.write_str("新坐标计算异常"),
            Issue::CentroidFailed => f.write_str("中心点坐标计算失败"),
            Issue::ContainmentUnchecked => {
                f.write_str("无法检查点是否在多边形内（无有效几何数据）")
            }
            Issue::InvalidCoordinate => f.write_str("登记坐标无效"),
            Issue::Processing(detail) => write!(f, "处理错误: {}", detail),
        }
    }
}

/// Ordered, append-only issue accumulator for one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueSet(Vec<Issue>);

impl IssueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        self.0.push(issue);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn any(&self, pred: impl Fn(&Issue) -> bool) -> bool {
        self.0.iter().any(pred)
    }

    pub fn contains(&self, issue: &Issue) -> bool {
        self.0.contains(issue)
    }

    /// `pass` when empty, otherwise the tags joined by ` | `.
    pub fn summary(&self) -> String {
        if self.0.is_empty() {
            return PASS.to_string();
        }
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for IssueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// One report row. Exactly one exists per processed archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelResult {
    pub zip_file_name: String,
    pub shp_file_relative: Option<String>,
    pub code: String,
    pub name: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub encoding: Option<String>,
    pub cpg: Option<String>,
    pub polygon: Option<String>,
    pub field: Option<String>,
    pub field_content: Option<String>,
    pub crs: Option<String>,
    pub in_polygon: Option<String>,
    /// Corrected (longitude, latitude) in CGCS2000.
    pub corrected: Option<(f64, f64)>,
    pub issues: IssueSet,
}

impl ParcelResult {
    /// Row for an archive whose code has no registry entry.
    pub fn unmatched(zip_file_name: impl Into<String>, code: impl Into<String>) -> Self {
        let mut issues = IssueSet::new();
        issues.push(Issue::NotFound);
        Self {
            zip_file_name: zip_file_name.into(),
            code: code.into(),
            issues,
            ..Default::default()
        }
    }

    pub fn for_parcel(zip_file_name: impl Into<String>, record: &ParcelRecord) -> Self {
        Self {
            zip_file_name: zip_file_name.into(),
            code: record.code.clone(),
            name: Some(record.name.clone()),
            longitude: record.longitude,
            latitude: record.latitude,
            ..Default::default()
        }
    }

    pub fn summary(&self) -> String {
        self.issues.summary()
    }

    pub fn is_pass(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Boundary layer of one archive in CGCS2000, for the web map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapOverlay {
    /// `<archive> (<code>)`
    pub label: String,
    pub archive: String,
    pub code: String,
    pub fields: Vec<String>,
    pub features: Vec<crate::engine::Feature>,
}

/// Registered point of one parcel, for the web map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub code: String,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_issue_set_is_pass() {
        let issues = IssueSet::new();
        assert_eq!(issues.summary(), "pass");
        assert_eq!(issues.to_string(), PASS);
    }

    #[test]
    fn test_issue_summary_joins_in_order() {
        let mut issues = IssueSet::new();
        issues.push(Issue::CpgMissing);
        issues.push(Issue::Reprojection("bad crs".to_string()));
        issues.push(Issue::OutsideBoundary);

        assert_eq!(
            issues.summary(),
            "cpg文件缺失 | 坐标系转换失败: bad crs | 地块位置不在边界范围内"
        );
    }

    #[test]
    fn test_unmatched_row() {
        let row = ParcelResult::unmatched("a1234567890123.zip", "1234567890123");
        assert_eq!(row.summary(), "地块信息中未找到该地块编码");
        assert!(row.shp_file_relative.is_none());
        assert!(!row.is_pass());
    }

    #[test]
    fn test_record_coordinates_need_both_values() {
        let mut record = ParcelRecord::new("1234567890123", 113.3, 23.1);
        assert_eq!(record.coordinates(), Some((113.3, 23.1)));

        record.latitude = None;
        assert_eq!(record.coordinates(), None);
    }
}
