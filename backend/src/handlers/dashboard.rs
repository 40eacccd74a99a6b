//! Dashboard handlers

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{Capability, ChartSeries, Overview};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reporting::ChartQuery;
use crate::services::ReportingService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub day: Option<NaiveDate>,
}

/// Overview card: today's orders and month-to-date sales
pub async fn get_overview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<OverviewQuery>,
) -> AppResult<Json<Overview>> {
    user.require(Capability::ViewReports)?;
    let service = ReportingService::new(state.db, state.config.reporting.offset());
    let overview = service.overview(query.day).await?;
    Ok(Json(overview))
}

/// Chart series for inputs, sales or orders
pub async fn get_chart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ChartQuery>,
) -> AppResult<Json<ChartSeries>> {
    user.require(Capability::ViewReports)?;
    let service = ReportingService::new(state.db, state.config.reporting.offset());
    let chart = service.chart(query).await?;
    Ok(Json(chart))
}
