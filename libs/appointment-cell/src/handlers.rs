// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use doctor_cell::{DoctorStore, SupabaseDoctorStore};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{AccessToken, User};
use shared_models::error::AppError;
use shared_utils::extractor::bearer_token;
use shared_utils::timezone::{parse_local_date, resolve_user_timezone, today_in};

use crate::models::{AppointmentError, BookAppointmentRequest, RescheduleAppointmentRequest};
use crate::runtime::SchedulingRuntime;
use crate::services::availability::SlotAvailabilityService;
use crate::services::booking::AppointmentBookingService;
use crate::services::reschedule::AppointmentOrchestrator;
use crate::store::{SchedulingStores, SupabaseAppointmentStore};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// `YYYY-MM-DD`; today in the caller's zone when omitted.
    pub date: Option<String>,
    pub timezone: Option<String>,
    pub exclude_appointment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingAvailabilityQuery {
    pub days: Option<u32>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub timezone: Option<String>,
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

/// Availability is readable without signing in; a bearer token, when sent,
/// is forwarded so reads run as that patient.
fn availability_service(
    config: &AppConfig,
    headers: &HeaderMap,
    runtime: &SchedulingRuntime,
) -> SlotAvailabilityService {
    let supabase = Arc::new(SupabaseClient::new(config));
    let token = bearer_token(headers).ok();

    let doctors: Arc<dyn DoctorStore> = match token {
        Some(token) => Arc::new(SupabaseDoctorStore::with_token(supabase.clone(), token)),
        None => Arc::new(SupabaseDoctorStore::new(supabase.clone())),
    };

    SlotAvailabilityService::new(
        Arc::new(SupabaseAppointmentStore::new(supabase, token)),
        doctors,
        Arc::clone(&runtime.clock),
    )
}

#[axum::debug_handler]
pub async fn get_day_availability(
    State(state): State<Arc<AppConfig>>,
    Extension(runtime): Extension<Arc<SchedulingRuntime>>,
    headers: HeaderMap,
    Path(doctor_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let timezone = resolve_user_timezone(query.timezone.as_deref(), &runtime.default_timezone);
    let date = match query.date.as_deref() {
        Some(value) => parse_local_date(value).map_err(AppointmentError::from)?,
        None => today_in(timezone, runtime.clock.now()),
    };

    let service = availability_service(&state, &headers, &runtime);
    let day = service
        .day_slots(&doctor_id, date, timezone, query.exclude_appointment_id.as_deref())
        .await?;

    Ok(Json(json!(day)))
}

#[axum::debug_handler]
pub async fn get_upcoming_availability(
    State(state): State<Arc<AppConfig>>,
    Extension(runtime): Extension<Arc<SchedulingRuntime>>,
    headers: HeaderMap,
    Path(doctor_id): Path<String>,
    Query(query): Query<UpcomingAvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let timezone = resolve_user_timezone(query.timezone.as_deref(), &runtime.default_timezone);

    let service = availability_service(&state, &headers, &runtime);
    let upcoming = service.upcoming(&doctor_id, query.days, timezone).await?;

    Ok(Json(json!(upcoming)))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(runtime): Extension<Arc<SchedulingRuntime>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
) -> Result<Json<Value>, AppError> {
    let stores = SchedulingStores::supabase(&state, token.as_str(), runtime.feed.clone());
    let service = AppointmentBookingService::new(stores, runtime);

    let appointments = service.list_patient_appointments(&user).await?;

    Ok(Json(json!({
        "total": appointments.len(),
        "appointments": appointments,
    })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(runtime): Extension<Arc<SchedulingRuntime>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let stores = SchedulingStores::supabase(&state, token.as_str(), runtime.feed.clone());
    let service = AppointmentBookingService::new(stores, runtime);

    let outcome = service.book_appointment(&user, request).await?;

    Ok((StatusCode::CREATED, Json(json!(outcome))))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(runtime): Extension<Arc<SchedulingRuntime>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Path(appointment_id): Path<String>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let stores = SchedulingStores::supabase(&state, token.as_str(), runtime.feed.clone());
    let orchestrator = AppointmentOrchestrator::new(stores, runtime);

    let outcome = orchestrator
        .reschedule_appointment(&user, &appointment_id, request)
        .await?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(runtime): Extension<Arc<SchedulingRuntime>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Path(appointment_id): Path<String>,
    Query(query): Query<CancelQuery>,
) -> Result<Json<Value>, AppError> {
    let stores = SchedulingStores::supabase(&state, token.as_str(), runtime.feed.clone());
    let orchestrator = AppointmentOrchestrator::new(stores, runtime);

    let outcome = orchestrator
        .cancel_appointment(&user, &appointment_id, query.timezone.as_deref())
        .await?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(runtime): Extension<Arc<SchedulingRuntime>>,
    Extension(user): Extension<User>,
    Extension(token): Extension<AccessToken>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let stores = SchedulingStores::supabase(&state, token.as_str(), runtime.feed.clone());
    let orchestrator = AppointmentOrchestrator::new(stores, runtime);

    let outcome = orchestrator.delete_appointment(&user, &appointment_id).await?;

    Ok(Json(json!(outcome)))
}
