use std::fmt;

use crate::engine::Layer;

/// Attribute a parcel boundary file must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParcelField {
    Name,
    Code,
    AdminCode,
    AdminName,
    Area,
}

impl ParcelField {
    pub const ALL: [ParcelField; 5] = [
        ParcelField::Name,
        ParcelField::Code,
        ParcelField::AdminCode,
        ParcelField::AdminName,
        ParcelField::Area,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ParcelField::Name => "地块名称",
            ParcelField::Code => "地块代码",
            ParcelField::AdminCode => "行政区代码",
            ParcelField::AdminName => "行政区名称",
            ParcelField::Area => "地块面积",
        }
    }

    /// Accepted column names, in lookup order.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ParcelField::Name => &["地块名称", "DKMC", "dkmc"],
            ParcelField::Code => &["地块代码", "DKDM", "DKBM", "dkdm", "dkbm"],
            ParcelField::AdminCode => &["行政区代码", "XZQDM", "xzqdm"],
            ParcelField::AdminName => &["行政区名称", "XZQMC", "xzqmc"],
            ParcelField::Area => &["地块面积", "YDMJ", "ydmj"],
        }
    }
}

impl fmt::Display for ParcelField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Attribute table view needed by the field check.
pub trait AttributeSchema {
    fn has_field(&self, name: &str) -> bool;
    fn is_all_null(&self, name: &str) -> bool;
}

impl AttributeSchema for Layer {
    fn has_field(&self, name: &str) -> bool {
        Layer::has_field(self, name)
    }

    fn is_all_null(&self, name: &str) -> bool {
        Layer::is_all_null(self, name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldReport {
    pub missing: Vec<ParcelField>,
    pub empty: Vec<ParcelField>,
}

impl FieldReport {
    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn has_empty(&self) -> bool {
        !self.empty.is_empty()
    }

    pub fn missing_status(&self) -> Option<String> {
        self.has_missing()
            .then(|| format!("缺少字段：{}", join_labels(&self.missing)))
    }

    pub fn empty_status(&self) -> Option<String> {
        self.has_empty()
            .then(|| format!("字段内容为空：{}", join_labels(&self.empty)))
    }
}

fn join_labels(fields: &[ParcelField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks every required attribute. A field present under any alias is not
/// missing; it is empty when all of its values are null or blank. Only the
/// first alias found is inspected for values.
pub fn check_fields<S: AttributeSchema + ?Sized>(schema: &S) -> FieldReport {
    let mut report = FieldReport::default();
    for field in ParcelField::ALL {
        match field.aliases().iter().find(|alias| schema.has_field(alias)) {
            None => report.missing.push(field),
            Some(alias) if schema.is_all_null(alias) => report.empty.push(field),
            Some(_) => {}
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Crs, Feature};

    fn layer(fields: &[&str], rows: Vec<Vec<Option<&str>>>) -> Layer {
        Layer {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            features: rows
                .into_iter()
                .map(|row| Feature {
                    geometry: None,
                    values: row.into_iter().map(|v| v.map(str::to_string)).collect(),
                })
                .collect(),
            crs: Crs::Undefined,
        }
    }

    #[test]
    fn test_all_fields_present_by_alias() {
        let layer = layer(
            &["DKMC", "dkbm", "行政区代码", "XZQMC", "YDMJ"],
            vec![vec![
                Some("地块"),
                Some("4401062023001"),
                Some("440106"),
                Some("天河区"),
                Some("1200.5"),
            ]],
        );
        let report = check_fields(&layer);
        assert_eq!(report, FieldReport::default());
        assert_eq!(report.missing_status(), None);
        assert_eq!(report.empty_status(), None);
    }

    #[test]
    fn test_missing_and_empty() {
        let layer = layer(
            &["地块名称", "地块代码", "XZQDM"],
            vec![
                vec![Some("地块"), None, Some("")],
                vec![Some("地块"), Some(" "), None],
            ],
        );
        let report = check_fields(&layer);
        assert_eq!(report.missing, vec![ParcelField::AdminName, ParcelField::Area]);
        assert_eq!(report.empty, vec![ParcelField::Code, ParcelField::AdminCode]);
        assert_eq!(
            report.missing_status().as_deref(),
            Some("缺少字段：行政区名称, 地块面积")
        );
        assert_eq!(
            report.empty_status().as_deref(),
            Some("字段内容为空：地块代码, 行政区代码")
        );
    }

    #[test]
    fn test_first_alias_decides_emptiness() {
        // 地块名称 为空时不再检查 DKMC
        let layer = layer(&["地块名称", "DKMC"], vec![vec![None, Some("地块")]]);
        let report = check_fields(&layer);
        assert!(report.empty.contains(&ParcelField::Name));
    }

    #[test]
    fn test_no_features_counts_as_empty() {
        let layer = layer(&["DKMC", "DKDM", "XZQDM", "XZQMC", "YDMJ"], vec![]);
        let report = check_fields(&layer);
        assert!(report.missing.is_empty());
        assert_eq!(report.empty.len(), 5);
    }
}
