mod map;

pub use map::MapWriter;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::fmt;
use std::path::Path;

use crate::model::ParcelResult;
use crate::summary::Summary;

pub const RESULT_SHEET: &str = "result";
pub const SUMMARY_SHEET: &str = "统计信息";

pub const RESULT_COLUMNS: [&str; 16] = [
    "zip_file_name",
    "shp_file_relative",
    "地块编码",
    "地块名称",
    "经度",
    "纬度",
    "cpg",
    "polygon",
    "field",
    "field_content",
    "crs",
    "In_polygon",
    "经度new",
    "纬度new",
    "result",
    "encoding",
];

/// Cell written for one result column.
#[derive(Debug, Clone, PartialEq)]
enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    Blank,
}

impl<'a> From<Option<&'a str>> for Cell<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(Cell::Blank, Cell::Text)
    }
}

impl From<Option<f64>> for Cell<'_> {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Blank, Cell::Number)
    }
}

fn result_row<'a>(result: &'a ParcelResult, summary: &'a str) -> [Cell<'a>; 16] {
    [
        Cell::Text(&result.zip_file_name),
        result.shp_file_relative.as_deref().into(),
        Cell::Text(&result.code),
        result.name.as_deref().into(),
        result.longitude.into(),
        result.latitude.into(),
        result.cpg.as_deref().into(),
        result.polygon.as_deref().into(),
        result.field.as_deref().into(),
        result.field_content.as_deref().into(),
        result.crs.as_deref().into(),
        result.in_polygon.as_deref().into(),
        result.corrected.map(|(x, _)| x).into(),
        result.corrected.map(|(_, y)| y).into(),
        Cell::Text(summary),
        result.encoding.as_deref().into(),
    ]
}

impl fmt::Display for Cell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(text) => f.write_str(text),
            Cell::Number(value) => write!(f, "{}", value),
            Cell::Blank => Ok(()),
        }
    }
}

/// Plain-text rendering of the result rows, one line per archive with the
/// columns of the `result` sheet.
pub struct ResultTable<'a>(pub &'a [ParcelResult]);

impl fmt::Display for ResultTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RESULT_COLUMNS.join(" | "))?;
        for result in self.0 {
            let summary = result.summary();
            let cells: Vec<String> = result_row(result, &summary)
                .iter()
                .map(ToString::to_string)
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

/// Writes the results and summary sheets to an `.xlsx` workbook.
#[derive(Default)]
pub struct ReportWriter {}

impl ReportWriter {
    pub fn new() -> Self {
        Self {}
    }

    pub fn write(
        &self,
        results: &[ParcelResult],
        summary: &Summary,
        output_path: &Path,
    ) -> Result<()> {
        tracing::info!(
            "Writing {} result rows to {}",
            results.len(),
            output_path.display()
        );

        let header = Format::new().set_bold();
        let mut workbook = Workbook::new();

        let sheet = workbook
            .add_worksheet()
            .set_name(RESULT_SHEET)
            .context("Failed to name result sheet")?;
        self.write_results(sheet, results, &header)?;

        let sheet = workbook
            .add_worksheet()
            .set_name(SUMMARY_SHEET)
            .context("Failed to name summary sheet")?;
        self.write_summary(sheet, summary, &header)?;

        workbook
            .save(output_path)
            .with_context(|| format!("Failed to save workbook {}", output_path.display()))?;
        Ok(())
    }

    fn write_results(
        &self,
        sheet: &mut Worksheet,
        results: &[ParcelResult],
        header: &Format,
    ) -> Result<()> {
        for (col, name) in RESULT_COLUMNS.iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, *name, header)
                .context("Failed to write result header")?;
        }

        for (i, result) in results.iter().enumerate() {
            let row = i as u32 + 1;
            let summary = result.summary();
            for (col, cell) in result_row(result, &summary).into_iter().enumerate() {
                let col = col as u16;
                let written = match cell {
                    Cell::Text(text) => sheet.write_string(row, col, text),
                    Cell::Number(value) => sheet.write_number(row, col, value),
                    Cell::Blank => continue,
                };
                written.with_context(|| format!("Failed to write result row {}", row))?;
            }
        }

        sheet
            .set_freeze_panes(1, 0)
            .context("Failed to freeze result header")?;
        Ok(())
    }

    fn write_summary(
        &self,
        sheet: &mut Worksheet,
        summary: &Summary,
        header: &Format,
    ) -> Result<()> {
        sheet
            .write_string_with_format(0, 0, "统计项", header)
            .context("Failed to write summary header")?;
        sheet
            .write_string_with_format(0, 1, "数量", header)
            .context("Failed to write summary header")?;

        for (i, (label, value)) in summary.rows().into_iter().enumerate() {
            let row = i as u32 + 1;
            sheet
                .write_string(row, 0, label)
                .context("Failed to write summary label")?;
            sheet
                .write_number(row, 1, value as f64)
                .context("Failed to write summary value")?;
        }

        sheet
            .set_column_width(0, 30)
            .context("Failed to set summary column width")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Issue, ParcelRecord};
    use calamine::{open_workbook_auto, Data, Reader};
    use tempfile::TempDir;

    #[test]
    fn test_result_row_layout() {
        let record = ParcelRecord::new("1234567890123", 113.3, 23.1).with_name("天河地块");
        let mut result = ParcelResult::for_parcel("a_1234567890123.zip", &record);
        result.corrected = Some((114.02, 22.95));
        result.issues.push(Issue::OutsideBoundary);
        let summary = result.summary();

        let row = result_row(&result, &summary);
        assert_eq!(row[0], Cell::Text("a_1234567890123.zip"));
        assert_eq!(row[1], Cell::Blank);
        assert_eq!(row[3], Cell::Text("天河地块"));
        assert_eq!(row[4], Cell::Number(113.3));
        assert_eq!(row[12], Cell::Number(114.02));
        assert_eq!(row[13], Cell::Number(22.95));
        assert_eq!(row[14], Cell::Text("地块位置不在边界范围内"));
        assert_eq!(row[15], Cell::Blank);

        result.encoding = Some("gbk".to_string());
        let row = result_row(&result, &summary);
        assert_eq!(row[15], Cell::Text("gbk"));
    }

    #[test]
    fn test_result_table_text() {
        let record = ParcelRecord::new("1234567890123", 113.3, 23.1).with_name("天河地块");
        let mut passed = ParcelResult::for_parcel("a_1234567890123.zip", &record);
        passed.encoding = Some("utf-8".to_string());
        let results = vec![
            passed,
            ParcelResult::unmatched("b_2222222222222.zip", "2222222222222"),
        ];

        let text = ResultTable(&results).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("zip_file_name | shp_file_relative | 地块编码"));
        assert!(lines[0].ends_with("result | encoding"));
        assert!(lines[1].starts_with("a_1234567890123.zip |  | 1234567890123 | 天河地块 | 113.3 | 23.1"));
        assert!(lines[1].ends_with("| pass | utf-8"));
        assert!(lines[2].ends_with("| 地块信息中未找到该地块编码 | "));
    }

    #[test]
    fn test_write_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("边界文件检查结果.xlsx");

        let results = vec![ParcelResult::unmatched("b_2222222222222.zip", "2222222222222")];
        let summary = Summary::from_results(&results, 3, 1, 1);
        ReportWriter::new().write(&results, &summary, &path).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["result", "统计信息"]);

        let range = workbook.worksheet_range("result").unwrap();
        let rows: Vec<_> = range.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Data::String("zip_file_name".to_string()));
        assert_eq!(rows[1][2], Data::String("2222222222222".to_string()));
        assert_eq!(rows[1][14], Data::String("地块信息中未找到该地块编码".to_string()));

        let range = workbook.worksheet_range("统计信息").unwrap();
        let rows: Vec<_> = range.rows().collect();
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[1][0], Data::String("地块信息的地块编码数量".to_string()));
        assert_eq!(rows[1][1], Data::Float(3.0));
        assert_eq!(rows[5][1], Data::Float(1.0));
    }
}
