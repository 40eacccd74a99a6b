//! Reporting models: calendar buckets, chart series and the dashboard overview

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::types::DateRange;

/// What a chart measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Manually recorded stock volume, by product
    Inputs,
    /// Sell value of completed orders, by product
    Sales,
    /// Number of orders, by status
    Orders,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Inputs => "inputs",
            Metric::Sales => "sales",
            Metric::Orders => "orders",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inputs" | "input" => Ok(Metric::Inputs),
            "sales" => Ok(Metric::Sales),
            "orders" | "order" => Ok(Metric::Orders),
            other => Err(format!("unknown metric '{}'", other)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket size of a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Yearly => "yearly",
        }
    }

    /// First day of the calendar period containing `date`. Weeks start on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Daily => date,
            Granularity::Weekly => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Monthly => date.with_day(1).unwrap_or(date),
            Granularity::Yearly => date.with_ordinal(1).unwrap_or(date),
        }
    }

    /// First day of the period after the one starting at `start`.
    pub fn next_start(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Granularity::Daily => start.succ_opt(),
            Granularity::Weekly => start.checked_add_signed(Duration::days(7)),
            Granularity::Monthly => start.checked_add_months(Months::new(1)),
            Granularity::Yearly => start.checked_add_months(Months::new(12)),
        }
    }

    /// Axis label for the period starting at `start`.
    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            Granularity::Daily => start.format("%Y-%m-%d").to_string(),
            Granularity::Weekly => {
                let week = start.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Monthly => start.format("%Y-%m").to_string(),
            Granularity::Yearly => start.format("%Y").to_string(),
        }
    }

    /// Range used when a chart query names none: the recent periods up to `today`.
    pub fn default_range(&self, today: NaiveDate) -> DateRange {
        let current = self.bucket_start(today);
        let start = match self {
            Granularity::Daily => current - Duration::days(6),
            Granularity::Weekly => current - Duration::weeks(11),
            Granularity::Monthly => current
                .checked_sub_months(Months::new(11))
                .unwrap_or(current),
            Granularity::Yearly => current
                .checked_sub_months(Months::new(48))
                .unwrap_or(current),
        };
        DateRange {
            start,
            end: today,
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            "monthly" => Ok(Granularity::Monthly),
            "yearly" => Ok(Granularity::Yearly),
            other => Err(format!("unknown granularity '{}'", other)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One calendar period on a chart axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Contiguous periods covering `range`, oldest first, with no gaps.
///
/// The first and last bucket are clipped to the range; labels still name
/// the calendar period they fall in.
pub fn buckets(granularity: Granularity, range: &DateRange) -> Vec<Bucket> {
    let mut out = Vec::new();
    let mut period = granularity.bucket_start(range.start);
    while period <= range.end {
        let next = granularity.next_start(period);
        let period_end = next
            .and_then(|n| n.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        out.push(Bucket {
            label: granularity.label(period),
            start: period.max(range.start),
            end: period_end.min(range.end),
        });
        match next {
            Some(n) if n > period => period = n,
            _ => break,
        }
    }
    out
}

/// A dated value attributed to one chart category
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub category: String,
    pub value: Decimal,
}

/// A category on a chart with its total over the whole range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartKey {
    pub name: String,
    pub total: Decimal,
}

/// One bucket of a chart with every category present
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartPoint {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub values: BTreeMap<String, Decimal>,
    pub total: Decimal,
}

/// Time series payload returned by chart queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
    pub metric: Metric,
    pub granularity: Granularity,
    pub range: DateRange,
    pub keys: Vec<ChartKey>,
    pub points: Vec<ChartPoint>,
    pub total: Decimal,
}

/// Fold observations into zero-filled buckets.
///
/// `fixed_keys` are always present even with no observations (order
/// statuses, for example); observed categories are added after them in
/// name order. Observations dated outside `range` are ignored.
pub fn build_chart<I>(
    metric: Metric,
    granularity: Granularity,
    range: DateRange,
    fixed_keys: &[String],
    observations: I,
) -> ChartSeries
where
    I: IntoIterator<Item = Observation>,
{
    let in_range: Vec<Observation> = observations
        .into_iter()
        .filter(|o| range.contains(o.date))
        .collect();

    let mut keys: Vec<String> = fixed_keys.to_vec();
    let observed: BTreeSet<&str> = in_range.iter().map(|o| o.category.as_str()).collect();
    for name in observed {
        if !keys.iter().any(|k| k == name) {
            keys.push(name.to_string());
        }
    }

    let mut points: Vec<ChartPoint> = buckets(granularity, &range)
        .into_iter()
        .map(|b| ChartPoint {
            label: b.label,
            start: b.start,
            end: b.end,
            values: keys.iter().map(|k| (k.clone(), Decimal::ZERO)).collect(),
            total: Decimal::ZERO,
        })
        .collect();

    for obs in &in_range {
        let idx = points.partition_point(|p| p.end < obs.date);
        if let Some(point) = points.get_mut(idx) {
            *point.values.entry(obs.category.clone()).or_insert(Decimal::ZERO) += obs.value;
            point.total += obs.value;
        }
    }

    let chart_keys: Vec<ChartKey> = keys
        .into_iter()
        .map(|name| {
            let total = points
                .iter()
                .map(|p| p.values.get(&name).copied().unwrap_or(Decimal::ZERO))
                .sum();
            ChartKey { name, total }
        })
        .collect();
    let total = points.iter().map(|p| p.total).sum();

    ChartSeries {
        metric,
        granularity,
        range,
        keys: chart_keys,
        points,
        total,
    }
}

/// Orders on one day, by status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub upcoming: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: OrderStatus, count: i64) {
        match status {
            OrderStatus::Upcoming => self.upcoming += count,
            OrderStatus::InProgress => self.in_progress += count,
            OrderStatus::Completed => self.completed += count,
            OrderStatus::Cancelled => self.cancelled += count,
        }
    }

    /// Orders that were not cancelled.
    pub fn live(&self) -> i64 {
        self.upcoming + self.in_progress + self.completed
    }

    /// Short Indonesian status line for the dashboard card.
    pub fn message(&self) -> String {
        if self.live() == 0 {
            "Belum ada pesanan hari ini".to_string()
        } else if self.upcoming > 0 {
            format!("{} pesanan menunggu diproses", self.upcoming)
        } else if self.in_progress > 0 {
            format!("{} pesanan sedang diproses", self.in_progress)
        } else {
            "Semua pesanan hari ini selesai".to_string()
        }
    }
}

/// Same-day order activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderOverview {
    pub total: i64,
    pub message: String,
    pub by_status: StatusCounts,
}

/// Month-to-date sales of completed orders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalesOverview {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_income: Decimal,
    pub total_cost: Decimal,
    pub completed_orders: i64,
}

/// Dashboard overview card data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub day: NaiveDate,
    pub order: OrderOverview,
    pub sales: SalesOverview,
}
