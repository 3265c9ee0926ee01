use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::AppError,
    models::{DataSourceConnection, DataStatus, ExternalFactor, OnboardingRecord, UserId},
    services::store::StoreError,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/onboarding", get(list_records))
        .route("/api/onboarding/:user_id", get(get_record))
        .route("/api/onboarding/:user_id/kpis", put(set_kpis))
        .route("/api/onboarding/:user_id/connections", put(set_connections))
        .route("/api/onboarding/:user_id/external-factors", put(set_external_factors))
        .route("/api/onboarding/:user_id/confirm", post(confirm))
}

#[derive(Debug, Deserialize)]
pub struct KpiSelection {
    kpis: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    platform: String,
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionsRequest {
    connections: Vec<ConnectionRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalFactorsRequest {
    factors: Vec<ExternalFactor>,
}

async fn list_records(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OnboardingRecord>>, AppError> {
    Ok(Json(state.store.list()?))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<OnboardingRecord>, AppError> {
    let user_id = UserId::parse(&user_id)?;
    state
        .store
        .get(&user_id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No onboarding record for user {}", user_id)))
}

async fn set_kpis(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<KpiSelection>,
) -> Result<Json<OnboardingRecord>, AppError> {
    let user_id = UserId::parse(&user_id)?;

    let mut seen = HashSet::new();
    let kpis: Vec<String> = request
        .kpis
        .iter()
        .map(|kpi| kpi.trim())
        .filter(|kpi| !kpi.is_empty() && seen.insert(kpi.to_lowercase()))
        .map(str::to_string)
        .collect();

    if kpis.is_empty() {
        return Err(AppError::InvalidInput("At least one KPI must be selected".to_string()));
    }

    tracing::info!("User {} selected KPIs: {:?}", user_id, kpis);
    let record = state.store.update(&user_id, &mut |record| {
        record.kpis = kpis.clone();
        Ok(())
    })?;
    Ok(Json(record))
}

async fn set_connections(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<ConnectionsRequest>,
) -> Result<Json<OnboardingRecord>, AppError> {
    let user_id = UserId::parse(&user_id)?;

    let now = Utc::now();
    let connections = request
        .connections
        .into_iter()
        .map(|c| {
            let platform = c.platform.trim().to_string();
            if platform.is_empty() {
                return Err(AppError::InvalidInput("Connection platform must not be empty".to_string()));
            }
            Ok(DataSourceConnection {
                platform,
                account_id: c.account_id.filter(|id| !id.trim().is_empty()),
                connected_at: now,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let record = state.store.update(&user_id, &mut |record| {
        record.connections = connections.clone();
        Ok(())
    })?;
    Ok(Json(record))
}

async fn set_external_factors(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<ExternalFactorsRequest>,
) -> Result<Json<OnboardingRecord>, AppError> {
    let user_id = UserId::parse(&user_id)?;
    for factor in &request.factors {
        factor.validate()?;
    }

    let record = state.store.update(&user_id, &mut |record| {
        record.external_factors = request.factors.clone();
        Ok(())
    })?;
    Ok(Json(record))
}

async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<OnboardingRecord>, AppError> {
    let user_id = UserId::parse(&user_id)?;
    if state.store.get(&user_id)?.is_none() {
        return Err(AppError::NotFound(format!("No onboarding record for user {}", user_id)));
    }

    let record = state.store.update(&user_id, &mut |record| {
        if record.data_status != Some(DataStatus::Success) {
            return Err(StoreError::Conflict(
                "Setup can only be confirmed after uploaded data passes validation".to_string(),
            ));
        }
        record.set_data_status(DataStatus::Complete).map_err(StoreError::Conflict)?;
        record.completed = true;
        record.completed_at = Some(Utc::now());
        Ok(())
    })?;

    tracing::info!("User {} confirmed onboarding", user_id);
    Ok(Json(record))
}
