use std::fmt;

use crate::model::{Issue, ParcelResult};

/// Run-level counters shown on the console and in the `统计信息` sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub registry_size: usize,
    pub archive_count: usize,
    pub code_count: usize,
    pub pass: usize,
    pub unmatched: usize,
    pub cpg_missing: usize,
    pub field_issues: usize,
    pub geometry_type_errors: usize,
    pub crs_issues: usize,
    pub outside_boundary: usize,
}

impl Summary {
    pub fn from_results(
        results: &[ParcelResult],
        registry_size: usize,
        archive_count: usize,
        code_count: usize,
    ) -> Self {
        let count = |pred: fn(&Issue) -> bool| {
            results
                .iter()
                .filter(|result| result.issues.any(pred))
                .count()
        };

        Summary {
            registry_size,
            archive_count,
            code_count,
            pass: results.iter().filter(|r| r.is_pass()).count(),
            unmatched: count(|i| matches!(i, Issue::NotFound)),
            cpg_missing: count(|i| matches!(i, Issue::CpgMissing)),
            field_issues: count(|i| matches!(i, Issue::FieldMissing | Issue::FieldEmpty)),
            geometry_type_errors: count(|i| matches!(i, Issue::GeometryType)),
            crs_issues: count(|i| matches!(i, Issue::PrjMissing | Issue::GeographicCrs)),
            outside_boundary: count(|i| matches!(i, Issue::OutsideBoundary)),
        }
    }

    /// Labelled rows in display order.
    pub fn rows(&self) -> [(&'static str, usize); 10] {
        [
            ("地块信息的地块编码数量", self.registry_size),
            ("zip文件数量", self.archive_count),
            ("去重地块编码后zip文件数量", self.code_count),
            ("PASS地块数量", self.pass),
            ("未对应地块编码的zip数量", self.unmatched),
            ("cpg文件缺失的数量", self.cpg_missing),
            ("字段问题的数量", self.field_issues),
            ("几何类型错误的数量", self.geometry_type_errors),
            ("坐标系问题的数量", self.crs_issues),
            ("地块位置不在边界范围的数量", self.outside_boundary),
        ]
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "边界文件检查情况")?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "统计项 | 数量")?;
        writeln!(f, "{}", "-".repeat(45))?;
        for (label, value) in self.rows() {
            writeln!(f, "{} | {}", label, value)?;
        }
        write!(f, "{}", "=".repeat(60))
    }
}
