//! Reporting service for dashboard charts and the daily overview
//!
//! Read-only. Queries run straight against the pool without locks, so a
//! report may miss writes that are still in flight.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    build_chart, ChartSeries, DateRange, Granularity, Metric, Observation, OrderOverview,
    OrderStatus, Overview, SalesOverview, StatusCounts,
};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
    offset: FixedOffset,
}

/// Chart query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ChartQuery {
    pub metric: Metric,
    pub granularity: Granularity,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub include_cancelled: bool,
}

impl ReportingService {
    /// Create a new ReportingService instance
    pub fn new(db: PgPool, offset: FixedOffset) -> Self {
        Self { db, offset }
    }

    /// Time series for one metric, zero-filled over the whole range
    pub async fn chart(&self, query: ChartQuery) -> AppResult<ChartSeries> {
        let range = resolve_range(
            query.granularity,
            query.from,
            query.to,
            local_today(self.offset),
        )?;

        let (fixed_keys, observations) = match query.metric {
            Metric::Inputs => (Vec::new(), self.input_observations(&range).await?),
            Metric::Sales => (Vec::new(), self.sales_observations(&range).await?),
            Metric::Orders => {
                let keys = order_keys(query.include_cancelled);
                let observations = self
                    .order_observations(&range, query.include_cancelled)
                    .await?;
                (keys, observations)
            }
        };

        tracing::debug!(
            metric = %query.metric,
            granularity = %query.granularity,
            observations = observations.len(),
            "Building chart"
        );
        Ok(build_chart(
            query.metric,
            query.granularity,
            range,
            &fixed_keys,
            observations,
        ))
    }

    /// Same-day order activity and month-to-date sales
    pub async fn overview(&self, day: Option<NaiveDate>) -> AppResult<Overview> {
        let day = day.unwrap_or_else(|| local_today(self.offset));

        let counts = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*)
            FROM orders
            WHERE NOT is_deleted AND date = $1
            GROUP BY status
            "#,
        )
        .bind(day)
        .fetch_all(&self.db)
        .await?;

        let mut by_status = StatusCounts::default();
        for (status, count) in counts {
            let status = status
                .parse::<OrderStatus>()
                .map_err(AppError::InvariantViolation)?;
            by_status.add(status, count);
        }

        let month_start = day.with_day(1).unwrap_or(day);
        let (total_income, total_cost, completed_orders) =
            sqlx::query_as::<_, (Decimal, Decimal, i64)>(
                r#"
                SELECT COALESCE(SUM(total_sell_price), 0),
                       COALESCE(SUM(total_buy_price), 0),
                       COUNT(*)
                FROM orders
                WHERE NOT is_deleted AND status = $1 AND date BETWEEN $2 AND $3
                "#,
            )
            .bind(OrderStatus::Completed.as_str())
            .bind(month_start)
            .bind(day)
            .fetch_one(&self.db)
            .await?;

        Ok(Overview {
            day,
            order: OrderOverview {
                total: by_status.live(),
                message: by_status.message(),
                by_status,
            },
            sales: SalesOverview {
                from: month_start,
                to: day,
                total_income,
                total_cost,
                completed_orders,
            },
        })
    }

    /// Live stock inputs by product and the local day they were first recorded.
    ///
    /// Corrections keep the input's original day; an input whose ledger entry
    /// was reversed directly no longer counts.
    async fn input_observations(&self, range: &DateRange) -> AppResult<Vec<Observation>> {
        let (from, to) = day_bounds(range, self.offset);
        let rows = sqlx::query_as::<_, (NaiveDate, String, Decimal)>(
            r#"
            SELECT ((si.created_at AT TIME ZONE 'UTC') + make_interval(mins => $3))::date AS day,
                   p.name,
                   SUM(si.amount)
            FROM stock_inputs si
            JOIN products p ON p.id = si.product_id
            JOIN stock_ledger_entries e ON e.id = si.ledger_entry_id
            WHERE NOT si.is_deleted
              AND NOT e.reversed
              AND si.created_at >= $1 AND si.created_at < $2
            GROUP BY day, p.name
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(self.offset.local_minus_utc() / 60)
        .fetch_all(&self.db)
        .await?;

        Ok(observations(rows))
    }

    /// Sell value of completed order lines by product snapshot name
    async fn sales_observations(&self, range: &DateRange) -> AppResult<Vec<Observation>> {
        let rows = sqlx::query_as::<_, (NaiveDate, String, Decimal)>(
            r#"
            SELECT o.date, i.name, SUM(i.total_sell_price)
            FROM orders o
            JOIN order_items i ON i.order_id = o.id
            WHERE NOT o.is_deleted AND NOT i.is_deleted
              AND o.status = $1
              AND o.date BETWEEN $2 AND $3
            GROUP BY o.date, i.name
            "#,
        )
        .bind(OrderStatus::Completed.as_str())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(observations(rows))
    }

    /// Order counts by status
    async fn order_observations(
        &self,
        range: &DateRange,
        include_cancelled: bool,
    ) -> AppResult<Vec<Observation>> {
        let rows = sqlx::query_as::<_, (NaiveDate, String, i64)>(
            r#"
            SELECT date, status, COUNT(*)
            FROM orders
            WHERE NOT is_deleted
              AND date BETWEEN $1 AND $2
              AND ($3 OR status <> $4)
            GROUP BY date, status
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(include_cancelled)
        .bind(OrderStatus::Cancelled.as_str())
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(date, status, count)| Observation {
                date,
                category: status,
                value: Decimal::from(count),
            })
            .collect())
    }
}

fn observations(rows: Vec<(NaiveDate, String, Decimal)>) -> Vec<Observation> {
    rows.into_iter()
        .map(|(date, category, value)| Observation {
            date,
            category,
            value,
        })
        .collect()
}

/// Status keys always present on an order chart
pub fn order_keys(include_cancelled: bool) -> Vec<String> {
    OrderStatus::ALL
        .iter()
        .filter(|s| include_cancelled || **s != OrderStatus::Cancelled)
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Fill in a chart range. A missing end is today; a missing start is the
/// granularity's default window ending at `to`.
pub fn resolve_range(
    granularity: Granularity,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> AppResult<DateRange> {
    let end = to.unwrap_or(today);
    let start = from.unwrap_or_else(|| granularity.default_range(end).start);
    DateRange::new(start, end).map_err(|msg| {
        AppError::validation("from", msg, "Tanggal awal harus sebelum tanggal akhir")
    })
}

/// Today's date in the business's local time
pub fn local_today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// UTC instants bounding a range of local days: `[start 00:00, end+1 00:00)`
pub fn day_bounds(range: &DateRange, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day_start(range.start, offset);
    let end = range
        .end
        .succ_opt()
        .map(|next| day_start(next, offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

/// UTC instant of local midnight at the start of `day`
pub fn day_start(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    // A fixed offset has no gaps, so every local midnight exists exactly once
    offset
        .from_local_datetime(&day.and_time(chrono::NaiveTime::MIN))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN)))
}
