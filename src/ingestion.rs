use crate::config::EngineConfig;
use crate::error::{AuditAnalyticsError, Result};
use crate::field_catalog::FieldCatalog;
use crate::schema::AuditType;
use crate::utils::parse_number;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;

/// One uploaded row: free-form column names mapped to whatever the source held.
pub type RawRow = BTreeMap<String, Value>;

pub const DEFAULT_LABEL_COLUMN: &str = "month";

/// One normalized reporting period. Every tracked field is present and finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub period_label: String,
    pub numeric_fields: BTreeMap<String, f64>,
}

impl PeriodRecord {
    /// Field lookup with the default-zero policy: unknown fields read as 0.
    pub fn value(&self, field: &str) -> f64 {
        self.numeric_fields.get(field).copied().unwrap_or(0.0)
    }
}

pub struct RecordNormalizer {
    catalog: FieldCatalog,
    label_column: String,
    max_records: Option<usize>,
}

impl RecordNormalizer {
    pub fn new(catalog: FieldCatalog) -> Self {
        Self {
            catalog,
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            max_records: None,
        }
    }

    pub fn from_config(config: &EngineConfig, audit_type: AuditType) -> Self {
        let catalog =
            FieldCatalog::for_audit_type(audit_type).with_extra_fields(&config.extra_fields);
        Self {
            catalog,
            label_column: config.label_column.clone(),
            max_records: config.max_records,
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn normalize(&self, rows: &[RawRow]) -> Result<Vec<PeriodRecord>> {
        if let Some(limit) = self.max_records {
            if rows.len() > limit {
                return Err(AuditAnalyticsError::TooManyRecords {
                    count: rows.len(),
                    limit,
                });
            }
        }

        let mut coerced = 0usize;
        let records: Vec<PeriodRecord> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let (record, defaults) = self.normalize_row(index, row);
                coerced += defaults;
                record
            })
            .collect();

        info!(
            "Normalized {} rows ({} fields, {} cells defaulted to 0)",
            records.len(),
            self.catalog.len(),
            coerced
        );

        Ok(records)
    }

    /// Accepts a JSON array of objects. Anything else is malformed input and
    /// aborts the whole pass.
    pub fn normalize_json(&self, value: &Value) -> Result<Vec<PeriodRecord>> {
        let items = value.as_array().ok_or_else(|| {
            AuditAnalyticsError::MalformedInput(format!(
                "expected an array of rows, got {}",
                json_kind(value)
            ))
        })?;

        let rows = items
            .iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(map) => Ok(map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<RawRow>()),
                other => Err(AuditAnalyticsError::MalformedInput(format!(
                    "row #{} is {}, expected an object",
                    idx,
                    json_kind(other)
                ))),
            })
            .collect::<Result<Vec<RawRow>>>()?;

        self.normalize(&rows)
    }

    fn normalize_row(&self, index: usize, row: &RawRow) -> (PeriodRecord, usize) {
        let period_label = row
            .get(&self.label_column)
            .and_then(label_from_cell)
            .unwrap_or_else(|| format!("period-{}", index));

        let mut defaults = 0;
        let mut numeric_fields = BTreeMap::new();

        for field in self.catalog.field_names() {
            let value = match row.get(field).map(|cell| (cell, numeric_from_cell(cell))) {
                Some((_, Some(v))) => v,
                Some((cell, None)) => {
                    debug!(
                        "Row {} ({}): field '{}' value {} is not numeric, using 0",
                        index, period_label, field, cell
                    );
                    defaults += 1;
                    0.0
                }
                None => {
                    defaults += 1;
                    0.0
                }
            };
            numeric_fields.insert(field.to_string(), value);
        }

        (
            PeriodRecord {
                period_label,
                numeric_fields,
            },
            defaults,
        )
    }
}

/// Normalizes rows against a catalog using the default `month` label column.
pub fn normalize_rows(rows: &[RawRow], catalog: &FieldCatalog) -> Vec<PeriodRecord> {
    let normalizer = RecordNormalizer::new(catalog.clone());
    rows.iter()
        .enumerate()
        .map(|(index, row)| normalizer.normalize_row(index, row).0)
        .collect()
}

/// Reads a headered CSV into raw rows. Short rows simply lack the trailing
/// columns; every present cell is kept as text.
pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<RawRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| (h.to_string(), Value::String(cell.to_string())))
            .collect();
        rows.push(row);
    }

    debug!("Read {} CSV rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

fn numeric_from_cell(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn label_from_cell(cell: &Value) -> Option<String> {
    match cell {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn hospitality() -> RecordNormalizer {
        RecordNormalizer::new(FieldCatalog::for_audit_type(AuditType::Hospitality))
    }

    #[test]
    fn test_unparsable_and_missing_values_default_to_zero() {
        let rows = vec![row(&[
            ("month", json!("Jan")),
            ("revenue", json!("1000")),
            ("expenses", json!("")),
            ("occupancy_rate", json!("n/a")),
            ("cleaning_cost", json!(null)),
            ("staff_cost", json!(250.5)),
        ])];

        let records = hospitality().normalize(&rows).unwrap();
        assert_eq!(records.len(), 1);

        let jan = &records[0];
        assert_eq!(jan.period_label, "Jan");
        assert_eq!(jan.value("revenue"), 1000.0);
        assert_eq!(jan.value("expenses"), 0.0);
        assert_eq!(jan.value("occupancy_rate"), 0.0);
        assert_eq!(jan.value("cleaning_cost"), 0.0);
        assert_eq!(jan.value("staff_cost"), 250.5);
        assert_eq!(jan.value("supplies_cost"), 0.0);
        assert!(jan.numeric_fields.values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_unknown_columns_are_ignored() {
        let rows = vec![row(&[
            ("month", json!("Jan")),
            ("guest_notes", json!("great stay")),
            ("mystery_metric", json!("12")),
        ])];

        let records = hospitality().normalize(&rows).unwrap();
        assert!(!records[0].numeric_fields.contains_key("guest_notes"));
        assert!(!records[0].numeric_fields.contains_key("mystery_metric"));
        assert_eq!(records[0].value("mystery_metric"), 0.0);
    }

    #[test]
    fn test_missing_label_uses_positional_placeholder() {
        let rows = vec![
            row(&[("month", json!("Jan"))]),
            row(&[("revenue", json!("5"))]),
            row(&[("month", json!("  "))]),
        ];

        let labels: Vec<String> = hospitality()
            .normalize(&rows)
            .unwrap()
            .into_iter()
            .map(|r| r.period_label)
            .collect();

        assert_eq!(labels, vec!["Jan", "period-1", "period-2"]);
    }

    #[test]
    fn test_input_order_is_preserved() {
        let rows = vec![
            row(&[("month", json!("Mar"))]),
            row(&[("month", json!("Jan"))]),
            row(&[("month", json!("Feb"))]),
        ];

        let records = normalize_rows(&rows, &FieldCatalog::for_audit_type(AuditType::Business));
        let labels: Vec<&str> = records.iter().map(|r| r.period_label.as_str()).collect();
        assert_eq!(labels, vec!["Mar", "Jan", "Feb"]);
    }

    #[test]
    fn test_record_limit() {
        let config = EngineConfig {
            max_records: Some(1),
            ..EngineConfig::default()
        };
        let normalizer = RecordNormalizer::from_config(&config, AuditType::Cloud);
        let rows = vec![RawRow::new(), RawRow::new()];

        assert!(matches!(
            normalizer.normalize(&rows),
            Err(AuditAnalyticsError::TooManyRecords { count: 2, limit: 1 })
        ));
    }

    #[test]
    fn test_normalize_json_rejects_non_sequences() {
        let normalizer = hospitality();
        assert!(matches!(
            normalizer.normalize_json(&json!({"month": "Jan"})),
            Err(AuditAnalyticsError::MalformedInput(_))
        ));
        assert!(matches!(
            normalizer.normalize_json(&json!([{"month": "Jan"}, 3])),
            Err(AuditAnalyticsError::MalformedInput(_))
        ));

        let records = normalizer
            .normalize_json(&json!([{"month": "Jan", "revenue": 10}]))
            .unwrap();
        assert_eq!(records[0].value("revenue"), 10.0);
    }

    #[test]
    fn test_read_csv_rows() {
        let data = "month,revenue,expenses\nJan,1000,600\nFeb, 800 ,\nMar\n";
        let rows = read_csv_rows(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get("revenue"), Some(&json!("800")));
        assert_eq!(rows[1].get("expenses"), Some(&json!("")));
        assert!(rows[2].get("revenue").is_none());

        let records = hospitality().normalize(&rows).unwrap();
        assert_eq!(records[1].value("revenue"), 800.0);
        assert_eq!(records[2].value("revenue"), 0.0);
        assert_eq!(records[2].period_label, "Mar");
    }

    #[test]
    fn test_extra_fields_from_config() {
        let config = EngineConfig {
            extra_fields: vec!["churn_rate".to_string()],
            ..EngineConfig::default()
        };
        let normalizer = RecordNormalizer::from_config(&config, AuditType::Business);
        let rows = vec![row(&[("churn_rate", json!("0.04"))])];

        let records = normalizer.normalize(&rows).unwrap();
        assert_eq!(records[0].value("churn_rate"), 0.04);
    }
}
