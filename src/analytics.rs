//! Period analytics for an audit's detail view: a per-period series, totals,
//! extremes, an expense breakdown and period-over-period changes.
//!
//! Everything here is a pure function of the normalized records. An empty
//! record set produces zero totals and `None` extremes rather than an error.

use crate::field_catalog::{EXPENSES, EXPENSE_CATEGORIES, OCCUPANCY_RATE, REVENUE};
use crate::ingestion::PeriodRecord;
use crate::utils::{checked_ratio, margin_pct, round_to};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period_label: String,
    pub revenue: f64,
    pub expenses: f64,
    pub profit: f64,
    pub occupancy: f64,
}

impl PeriodSummary {
    pub fn from_record(record: &PeriodRecord) -> Self {
        let revenue = record.value(REVENUE);
        let expenses = record.value(EXPENSES);
        Self {
            period_label: record.period_label.clone(),
            revenue,
            expenses,
            profit: revenue - expenses,
            occupancy: record.value(OCCUPANCY_RATE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub revenue: f64,
    pub expenses: f64,
    pub profit: f64,
    /// Profit over revenue in percent, one decimal. 0 when revenue is 0.
    pub margin_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseCategoryAmount {
    pub category: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodChange {
    pub period_label: String,
    pub revenue_change: f64,
    pub profit_change: f64,
    /// Relative to the previous period, one decimal. `None` when the previous
    /// period had no revenue.
    pub revenue_change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub monthly: Vec<PeriodSummary>,
    pub totals: Totals,
    /// `None` when there is no data.
    pub best_period: Option<PeriodSummary>,
    pub worst_period: Option<PeriodSummary>,
    pub expense_breakdown: Vec<ExpenseCategoryAmount>,
    pub average_revenue: f64,
    pub average_occupancy: f64,
    pub period_changes: Vec<PeriodChange>,
}

impl AnalyticsResult {
    pub fn is_empty(&self) -> bool {
        self.monthly.is_empty()
    }
}

pub fn compute_analytics(records: &[PeriodRecord]) -> AnalyticsResult {
    let monthly: Vec<PeriodSummary> = records.iter().map(PeriodSummary::from_record).collect();

    let totals = compute_totals(&monthly);
    let (best_period, worst_period) = revenue_extremes(&monthly);
    let count = monthly.len() as f64;

    let average_revenue = checked_ratio(totals.revenue, count).unwrap_or(0.0);
    let average_occupancy =
        checked_ratio(monthly.iter().map(|m| m.occupancy).sum(), count).unwrap_or(0.0);

    let result = AnalyticsResult {
        expense_breakdown: expense_breakdown_from_first_period(records),
        period_changes: period_changes(&monthly),
        totals,
        best_period,
        worst_period,
        average_revenue,
        average_occupancy,
        monthly,
    };

    info!(
        "Computed analytics over {} periods: revenue {:.2}, margin {}%",
        result.monthly.len(),
        result.totals.revenue,
        result.totals.margin_pct
    );

    result
}

pub fn compute_totals(monthly: &[PeriodSummary]) -> Totals {
    let revenue: f64 = monthly.iter().map(|m| m.revenue).sum();
    let expenses: f64 = monthly.iter().map(|m| m.expenses).sum();
    let profit = revenue - expenses;

    Totals {
        revenue,
        expenses,
        profit,
        margin_pct: margin_pct(profit, revenue),
    }
}

/// Highest and lowest revenue periods in one pass. The first period seeds
/// both, and only strictly greater/lower values replace it, so ties resolve
/// to the earliest period.
pub fn revenue_extremes(
    monthly: &[PeriodSummary],
) -> (Option<PeriodSummary>, Option<PeriodSummary>) {
    let Some(first) = monthly.first() else {
        return (None, None);
    };

    let mut best = first;
    let mut worst = first;
    for period in &monthly[1..] {
        if period.revenue > best.revenue {
            best = period;
        }
        if period.revenue < worst.revenue {
            worst = period;
        }
    }

    (Some(best.clone()), Some(worst.clone()))
}

/// Expense amounts per fixed category, read from the FIRST period only.
///
/// Category amounts are not summed across periods. Swap this function out if
/// the breakdown should cover the whole record set.
pub fn expense_breakdown_from_first_period(records: &[PeriodRecord]) -> Vec<ExpenseCategoryAmount> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    EXPENSE_CATEGORIES
        .iter()
        .map(|(category, column)| ExpenseCategoryAmount {
            category: category.to_string(),
            amount: first.value(column),
        })
        .collect()
}

pub fn period_changes(monthly: &[PeriodSummary]) -> Vec<PeriodChange> {
    monthly
        .windows(2)
        .map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            let revenue_change = curr.revenue - prev.revenue;
            PeriodChange {
                period_label: curr.period_label.clone(),
                revenue_change,
                profit_change: curr.profit - prev.profit,
                revenue_change_pct: checked_ratio(revenue_change, prev.revenue)
                    .map(|r| round_to(r * 100.0, 1)),
            }
        })
        .collect()
}
