use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use haven_core::{BookingScope, CreateBooking, DashboardStats};
use haven_domain::{Booking, DateRange, ServiceRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{CallerRole, Identity};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub property_id: Uuid,
    pub date_range: DateRange,
    pub guests: u32,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub property_id: Uuid,
    pub date_range: DateRange,
    pub available: bool,
}

/// Write routes depend on the deployment's role; reads are shared.
pub fn routes(role: ServiceRole) -> Router<AppState> {
    let router = Router::new()
        .route("/v1/bookings", get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/dashboard", get(dashboard))
        .route("/v1/properties/{id}/availability", get(check_availability));

    match role {
        ServiceRole::TravelerService => router.route("/v1/bookings", post(create_booking)),
        ServiceRole::OwnerService => router
            .route("/v1/bookings/{id}/accept", post(accept_booking))
            .route("/v1/bookings/{id}/cancel", post(cancel_booking)),
    }
}

fn scope_of(identity: &Identity) -> BookingScope {
    match identity.role {
        CallerRole::Owner => BookingScope::Owner(identity.user_id.clone()),
        CallerRole::Traveler => BookingScope::Traveler(identity.user_id.clone()),
    }
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    identity.require(CallerRole::Traveler)?;
    let Json(req) = payload?;

    let booking = state
        .bookings
        .create_booking(CreateBooking {
            property_id: req.property_id,
            traveler_id: identity.user_id,
            date_range: req.date_range,
            guests: req.guests,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

async fn accept_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    identity.require(CallerRole::Owner)?;
    let booking = state.bookings.accept_booking(id, &identity.user_id).await?;
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    identity.require(CallerRole::Owner)?;
    let booking = state.bookings.cancel_booking(id, &identity.user_id).await?;
    Ok(Json(booking))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state.bookings.list_bookings(&scope_of(&identity)).await?;
    Ok(Json(bookings))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.get_booking(id, &identity.user_id).await?;
    Ok(Json(booking))
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = state.bookings.dashboard_stats(&scope_of(&identity)).await?;
    Ok(Json(stats))
}

async fn check_availability(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let date_range = DateRange { start: query.start, end: query.end };
    let available = state.bookings.check_availability(property_id, &date_range).await?;
    Ok(Json(AvailabilityResponse { property_id, date_range, available }))
}
