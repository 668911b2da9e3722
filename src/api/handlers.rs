use axum::{
    extract::{State, Query},
    Json,
};
use serde::Deserialize;
use crate::db::models::{EntityPeriodRecord, InequalityRecord, WindowReportRecord};
use crate::db::queries::{get_entity_summaries, get_inequality_series, get_window_reports};
use super::error::ApiError;
use super::state::AppState;

#[derive(Deserialize)]
pub struct InequalityParams {
    pub dataset: String,
    pub metric: Option<String>,
}

#[derive(Deserialize)]
pub struct EntityParams {
    pub dataset: String,
    pub period: u32,
}

#[derive(Deserialize)]
pub struct WindowParams {
    pub dataset: String,
}

pub(crate) fn validate_metric(metric: Option<&str>) -> Result<Option<&str>, ApiError> {
    match metric {
        None | Some("") => Ok(None),
        Some(m @ ("stake" | "reward" | "incentive" | "validators")) => Ok(Some(m)),
        Some(other) => Err(ApiError::BadRequest(format!(
            "unknown metric {:?}, expected stake, reward, incentive or validators",
            other
        ))),
    }
}

pub async fn get_inequality(
    State(db): State<AppState>,
    Query(params): Query<InequalityParams>,
) -> Result<Json<Vec<InequalityRecord>>, ApiError> {
    let metric = validate_metric(params.metric.as_deref())?;
    get_inequality_series(&db, &params.dataset, metric)
        .await
        .map(Json)
        .map_err(|e| ApiError::DatabaseError(e.to_string()))
}

pub async fn get_entities(
    State(db): State<AppState>,
    Query(params): Query<EntityParams>,
) -> Result<Json<Vec<EntityPeriodRecord>>, ApiError> {
    get_entity_summaries(&db, &params.dataset, params.period)
        .await
        .map(Json)
        .map_err(|e| ApiError::DatabaseError(e.to_string()))
}

pub async fn get_windows(
    State(db): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<WindowReportRecord>>, ApiError> {
    get_window_reports(&db, &params.dataset)
        .await
        .map(Json)
        .map_err(|e| ApiError::DatabaseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use axum::http::StatusCode;

    #[test]
    fn test_metric_validation() {
        assert_eq!(validate_metric(None).unwrap(), None);
        assert_eq!(validate_metric(Some("")).unwrap(), None);
        assert_eq!(validate_metric(Some("reward")).unwrap(), Some("reward"));
        assert_eq!(validate_metric(Some("incentive")).unwrap(), Some("incentive"));
        assert_eq!(validate_metric(Some("validators")).unwrap(), Some("validators"));
        let err = validate_metric(Some("gini")).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
