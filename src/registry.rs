use calamine::{open_workbook_auto, Data, Reader};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::ParcelRecord;

pub const CODE_COLUMN: &str = "地块编码";
pub const LONGITUDE_COLUMN: &str = "经度";
pub const LATITUDE_COLUMN: &str = "纬度";
pub const NAME_COLUMN: &str = "地块名称";

static EMPTY_CELL: Data = Data::Empty;

const REQUIRED_COLUMNS: [&str; 3] = [CODE_COLUMN, LONGITUDE_COLUMN, LATITUDE_COLUMN];

/// Parcel registry keyed by 13-digit code.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: HashMap<String, ParcelRecord>,
    row_count: usize,
}

impl Registry {
    /// Loads the first worksheet of `path`, using its first row as the header.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::RegistryNotFound(path.to_path_buf()));
        }
        let read_error = |message: String| Error::RegistryRead {
            path: path.to_path_buf(),
            message,
        };

        let mut workbook = open_workbook_auto(path).map_err(|e| read_error(e.to_string()))?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| read_error("workbook contains no sheets".to_string()))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| read_error(e.to_string()))?;

        let mut rows = range.rows();
        let header: Vec<String> = rows
            .next()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default();
        let column = |name: &str| header.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|&&name| column(name).is_none())
            .map(|name| name.to_string())
            .collect();
        let (Some(code_idx), Some(lon_idx), Some(lat_idx)) = (
            column(CODE_COLUMN),
            column(LONGITUDE_COLUMN),
            column(LATITUDE_COLUMN),
        ) else {
            return Err(Error::MissingColumns(missing));
        };
        let name_idx = column(NAME_COLUMN);

        let mut records = Vec::new();
        let mut data_rows = 0;
        for row in rows {
            if row.iter().all(|cell| cell_text(cell).is_empty()) {
                continue;
            }
            data_rows += 1;
            let cell = |idx: usize| row.get(idx).unwrap_or(&EMPTY_CELL);
            let code = cell_text(cell(code_idx));
            if code.is_empty() {
                continue;
            }
            records.push(ParcelRecord {
                code,
                name: name_idx.map(|idx| cell_text(cell(idx))).unwrap_or_default(),
                longitude: cell_number(cell(lon_idx)),
                latitude: cell_number(cell(lat_idx)),
            });
        }

        let mut registry = Self::from_records(records);
        // 无编码的数据行也计入登记数量
        registry.row_count = data_rows;
        info!(
            "Loaded {} parcel records from {:?}",
            registry.row_count(),
            path
        );
        Ok(registry)
    }

    /// Builds a registry from rows. The first row of a duplicated code wins.
    pub fn from_records(records: impl IntoIterator<Item = ParcelRecord>) -> Self {
        let mut registry = Registry::default();
        for record in records {
            registry.row_count += 1;
            if registry.records.contains_key(&record.code) {
                warn!("Duplicate parcel code {} in registry, keeping first row", record.code);
                continue;
            }
            registry.records.insert(record.code.clone(), record);
        }
        registry
    }

    pub fn get(&self, code: &str) -> Option<&ParcelRecord> {
        self.records.get(code)
    }

    /// Number of non-blank data rows, including rows without a code.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // 数值型编码不带小数部分
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(e) => e.to_string(),
    }
}

fn cell_number(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn code_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?:^|[^0-9])([0-9]{13})(?:[^0-9]|$)").ok())
        .as_ref()
}

/// Extracts the 13-digit parcel code from an archive name. The run must not
/// be adjacent to other digits.
pub fn extract_code(file_name: &str) -> Option<String> {
    code_pattern()?
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Archives sharing one parcel code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveGroup {
    pub code: String,
    pub archives: Vec<String>,
}

/// Groups archive names by parcel code. Groups keep the order in which
/// their code first appears in `archive_names`; names without a code are
/// dropped.
pub fn group_archives<S: AsRef<str>>(archive_names: &[S]) -> Vec<ArchiveGroup> {
    let mut groups: Vec<ArchiveGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for name in archive_names {
        let name = name.as_ref();
        let Some(code) = extract_code(name) else {
            warn!("No parcel code in archive name {}", name);
            continue;
        };
        match index.get(&code) {
            Some(&i) => groups[i].archives.push(name.to_string()),
            None => {
                index.insert(code.clone(), groups.len());
                groups.push(ArchiveGroup {
                    code,
                    archives: vec![name.to_string()],
                });
            }
        }
    }
    groups
}
