use crate::error::{AuditAnalyticsError, Result};
use crate::schema::AuditType;
use serde::{Deserialize, Serialize};

pub const REVENUE: &str = "revenue";
pub const EXPENSES: &str = "expenses";
pub const OCCUPANCY_RATE: &str = "occupancy_rate";
pub const COST: &str = "cost";

/// Columns every audit type tracks, in presentation order.
pub const BASE_FIELDS: &[&str] = &[
    REVENUE,
    EXPENSES,
    OCCUPANCY_RATE,
    "cleaning_cost",
    "maintenance_cost",
    "utilities_cost",
    "marketing_cost",
    "platform_fees",
    "staff_cost",
    "supplies_cost",
];

const CLOUD_FIELDS: &[&str] = &[
    COST,
    "compute_cost",
    "storage_cost",
    "network_cost",
    "cpu_utilization",
];

const HOSPITALITY_FIELDS: &[&str] = &["adr", "revpar", "bookings"];

const BUSINESS_FIELDS: &[&str] = &[COST, "payroll_cost", "rent_cost", "headcount"];

/// Fixed expense categories and the column each one is read from.
pub const EXPENSE_CATEGORIES: &[(&str, &str)] = &[
    ("Cleaning", "cleaning_cost"),
    ("Maintenance", "maintenance_cost"),
    ("Utilities", "utilities_cost"),
    ("Marketing", "marketing_cost"),
    ("Platform Fees", "platform_fees"),
    ("Staff", "staff_cost"),
    ("Supplies", "supplies_cost"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    /// True for columns shared by every audit type.
    pub is_base: bool,
    pub expense_category: Option<String>,
}

/// The numeric columns the normalizer extracts for one audit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCatalog {
    pub audit_type: AuditType,
    pub fields: Vec<FieldEntry>,
}

impl FieldCatalog {
    pub fn for_audit_type(audit_type: AuditType) -> Self {
        let specific: &[&str] = match audit_type {
            AuditType::Cloud => CLOUD_FIELDS,
            AuditType::Hospitality => HOSPITALITY_FIELDS,
            AuditType::Business => BUSINESS_FIELDS,
        };

        let mut catalog = Self {
            audit_type,
            fields: Vec::with_capacity(BASE_FIELDS.len() + specific.len()),
        };

        for name in BASE_FIELDS {
            catalog.push(name, true);
        }
        for name in specific {
            catalog.push(name, false);
        }

        catalog
    }

    /// Adds caller-configured columns, skipping ones already tracked.
    pub fn with_extra_fields<I>(mut self, extra: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for name in extra {
            self.push(name.as_ref(), false);
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, name: &str, is_base: bool) {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return;
        }

        let expense_category = EXPENSE_CATEGORIES
            .iter()
            .find(|(_, column)| *column == name)
            .map(|(category, _)| category.to_string());

        self.fields.push(FieldEntry {
            name: name.to_string(),
            is_base,
            expense_category,
        });
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["Audit Type", "Field", "Is Base", "Expense Category"])?;

        let audit_type = self.audit_type.to_string();
        for field in &self.fields {
            let is_base = field.is_base.to_string();
            writer.write_record([
                audit_type.as_str(),
                field.name.as_str(),
                is_base.as_str(),
                field.expense_category.as_deref().unwrap_or(""),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AuditAnalyticsError::IoError(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| AuditAnalyticsError::MalformedInput(e.to_string()))
    }
}
