//! REST API for StayVista using Axum.
//!
//! Public catalogue reads, bookings and auth are open; everything under
//! `/admin` (plus per-villa booking lists) needs an admin bearer token.
//! Uploaded images are served back from `/blobs`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{Admin, ImageFile, Submission};
use crate::auth::{Auth, Session};
use crate::blob::FsBlobStore;
use crate::config::Config;
use crate::error::{ApiError, AuthError, StoreError};
use crate::gateway::{parse_offer_filter, CollectionDrift, Gateway, HomePage};
use crate::logging;
use crate::models::{
    trees, AuthPayload, Booking, Collection, Destination, HeroSlide, Offer, Record, Star, Villa,
    VillaCard,
};
use crate::storage::Storage;

/// Shared app state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub admin: Admin,
    pub auth: Auth,
}

impl AppState {
    pub fn new(storage: Storage, config: &Config) -> Self {
        let blobs = Arc::new(FsBlobStore::new(&config.blob_dir, &config.public_base_url));
        let gateway = Gateway::new(storage.clone(), blobs, config.trending);
        Self {
            admin: Admin::new(gateway.clone(), config.max_upload_bytes),
            auth: Auth::new(storage, &config.jwt_secret, config.token_ttl_secs, config.bcrypt_cost),
            gateway,
        }
    }
}

type SharedState = Arc<AppState>;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    villas: usize,
}

#[derive(Deserialize)]
pub struct LocationParams {
    pub location: Option<String>,
}

#[derive(Deserialize)]
pub struct CategoryParams {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct OfferParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionParams {
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct MonthsParams {
    pub months: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub villa_id: String,
    pub booking_date: Option<DateTime<Utc>>,
    pub guest_name: Option<String>,
    pub guests: Option<u32>,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub uid: String,
}

/// Offer body: the offer fields plus an optional `expectedVersion`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    #[serde(flatten)]
    pub offer: Offer,
    pub expected_version: Option<u64>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub path: String,
    pub url: String,
}

async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let claims = state.auth.authenticate(header)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

async fn admin_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let claims = state.auth.authenticate(header)?;
    if let Err(e) = Auth::require_admin(&claims) {
        tracing::warn!(uid = %claims.sub, uri = %req.uri(), "non-admin hit admin route");
        return Err(e.into());
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Create the Axum router with every public, authenticated and admin route.
pub fn create_router(state: AppState, config: &Config) -> Router {
    let state = Arc::new(state);

    let session_routes = Router::new()
        .route("/auth/session", get(session_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/admin/villas", post(create_villa_handler))
        .route("/admin/villas/:id", put(update_villa_handler).delete(delete_villa_handler))
        .route("/admin/collections", post(create_collection_handler))
        .route(
            "/admin/collections/:id",
            put(update_collection_handler).delete(delete_collection_handler),
        )
        .route("/admin/collections/:id/drift", get(collection_drift_handler))
        .route("/admin/offers", post(create_offer_handler))
        .route("/admin/offers/:id", put(update_offer_handler).delete(delete_offer_handler))
        .route("/admin/stars", post(create_star_handler))
        .route("/admin/stars/:id", put(update_star_handler).delete(delete_star_handler))
        .route("/admin/destinations", post(create_destination_handler))
        .route(
            "/admin/destinations/:id",
            put(update_destination_handler).delete(delete_destination_handler),
        )
        .route("/admin/slides", post(create_slide_handler))
        .route("/admin/slides/:id", put(update_slide_handler).delete(delete_slide_handler))
        .route("/admin/uploads", post(upload_handler))
        .route("/admin/bookings/recent", get(recent_bookings_handler))
        .route("/villas/:id/bookings", get(villa_bookings_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_middleware));

    // Several images per form, so the body cap is a multiple of the per-file cap
    let body_limit = config.max_upload_bytes.saturating_mul(8);

    Router::new()
        .route("/health", get(health_handler))
        .route("/home", get(home_handler))
        .route("/collections", get(collections_handler))
        .route("/collections/:id", get(collection_handler))
        .route("/collections/:id/villas", get(collection_villas_handler))
        .route("/villas", get(villas_handler))
        .route("/villas/best-rated", get(best_rated_handler))
        .route("/villas/trending", get(trending_handler))
        .route("/villas/locations", get(locations_handler))
        .route("/villas/:id", get(villa_handler))
        .route("/offers", get(offers_handler))
        .route("/destinations", get(destinations_handler))
        .route("/stars", get(stars_handler))
        .route("/slides", get(slides_handler))
        .route("/bookings", post(booking_handler))
        .route("/auth/sign-up", post(sign_up_handler))
        .route("/auth/sign-in", post(sign_in_handler))
        .merge(session_routes)
        .merge(admin_routes)
        .nest_service("/blobs", ServeDir::new(&config.blob_dir))
        .with_state(state)
        // Outermost last: the request id is set before anything logs it
        .layer(middleware::from_fn(logging::log_request))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer(&config.allowed_origins))
        .layer(logging::propagate_request_id_layer())
        .layer(logging::request_id_layer())
}

async fn health_handler(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let villas = state
        .gateway
        .blocking(|gw| gw.storage().count(trees::VILLAS))
        .await
        .map_err(|e| ApiError::read_failed("health", e))?;
    Ok(Json(HealthResponse { status: "ok", villas }))
}

// --- public reads ---

async fn home_handler(
    State(state): State<SharedState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<HomePage>, ApiError> {
    state
        .gateway
        .home_page(params.location.as_deref(), Utc::now())
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("home page", e))
}

async fn collections_handler(State(state): State<SharedState>) -> Result<Json<Vec<Record<Collection>>>, ApiError> {
    state
        .gateway
        .blocking(|gw| gw.fetch_collections())
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("collections", e))
}

async fn collection_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Record<Collection>>, ApiError> {
    state
        .gateway
        .blocking(move |gw| {
            gw.fetch_collection_by_id(&id)?
                .ok_or_else(|| StoreError::not_found("collection", &id))
        })
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("collection", e))
}

async fn collection_villas_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Record<Villa>>>, ApiError> {
    state
        .gateway
        .blocking(move |gw| gw.fetch_villas_by_collection(&id))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("villas", e))
}

async fn villas_handler(State(state): State<SharedState>) -> Result<Json<Vec<Record<Villa>>>, ApiError> {
    state
        .gateway
        .blocking(|gw| gw.fetch_villas())
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("villas", e))
}

async fn villa_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Record<Villa>>, ApiError> {
    state
        .gateway
        .blocking(move |gw| gw.fetch_villa_by_id(&id)?.ok_or_else(|| StoreError::not_found("villa", &id)))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("villa", e))
}

async fn best_rated_handler(
    State(state): State<SharedState>,
    Query(params): Query<CategoryParams>,
) -> Result<Json<Vec<VillaCard>>, ApiError> {
    state
        .gateway
        .blocking(move |gw| gw.fetch_best_rated(params.category.as_deref()))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("best rated villas", e))
}

async fn trending_handler(
    State(state): State<SharedState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<Vec<VillaCard>>, ApiError> {
    state
        .gateway
        .blocking(move |gw| gw.fetch_trending(params.location.as_deref(), Utc::now()))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("trending villas", e))
}

async fn locations_handler(State(state): State<SharedState>) -> Result<Json<Vec<String>>, ApiError> {
    state
        .gateway
        .blocking(|gw| gw.fetch_villa_locations())
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("locations", e))
}

async fn offers_handler(
    State(state): State<SharedState>,
    Query(params): Query<OfferParams>,
) -> Result<Json<Vec<Record<Offer>>>, ApiError> {
    state
        .gateway
        .blocking(move |gw| gw.fetch_offers(parse_offer_filter(params.kind.as_deref())))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("offers", e))
}

async fn destinations_handler(State(state): State<SharedState>) -> Result<Json<Vec<Record<Destination>>>, ApiError> {
    state
        .gateway
        .blocking(|gw| gw.fetch_destinations())
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("destinations", e))
}

async fn stars_handler(State(state): State<SharedState>) -> Result<Json<Vec<Record<Star>>>, ApiError> {
    state
        .gateway
        .blocking(|gw| gw.fetch_stars())
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("celebrity stays", e))
}

async fn slides_handler(State(state): State<SharedState>) -> Result<Json<Vec<Record<HeroSlide>>>, ApiError> {
    state
        .gateway
        .blocking(|gw| gw.fetch_slides())
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("slides", e))
}

// --- bookings ---

async fn booking_handler(
    State(state): State<SharedState>,
    Json(payload): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Record<Booking>>), ApiError> {
    let villa_id = payload.villa_id.clone();
    let exists = state
        .gateway
        .blocking(move |gw| gw.fetch_villa_by_id(&villa_id))
        .await
        .map_err(|e| ApiError::read_failed("villa", e))?
        .is_some();
    if !exists {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Villa not found"));
    }
    let booking = state
        .gateway
        .blocking(move |gw| {
            gw.create_booking(&payload.villa_id, payload.booking_date, payload.guest_name, payload.guests)
        })
        .await
        .map_err(|e| ApiError::write_failed("booking", e))?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn villa_bookings_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Record<Booking>>>, ApiError> {
    state
        .gateway
        .blocking(move |gw| gw.fetch_bookings_for_villa(&id))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("bookings", e))
}

async fn recent_bookings_handler(
    State(state): State<SharedState>,
    Query(params): Query<MonthsParams>,
) -> Result<Json<Vec<Record<Booking>>>, ApiError> {
    let months = params.months.unwrap_or(state.gateway.trending.window_months);
    state
        .gateway
        .blocking(move |gw| gw.fetch_recent_bookings(months, Utc::now()))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("bookings", e))
}

// --- auth ---

/// bcrypt is deliberately slow; keep it off the async workers.
async fn run_auth<T, F>(auth: &Auth, f: F) -> Result<T, ApiError>
where
    F: FnOnce(Auth) -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    let auth = auth.clone();
    tokio::task::spawn_blocking(move || f(auth))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "auth task panicked");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed. Please try again.")
        })?
        .map_err(ApiError::from)
}

async fn sign_up_handler(
    State(state): State<SharedState>,
    Json(payload): Json<Credentials>,
) -> Result<(StatusCode, Json<SignUpResponse>), ApiError> {
    let uid = run_auth(&state.auth, move |auth| auth.sign_up(&payload.email, &payload.password)).await?;
    Ok((StatusCode::CREATED, Json(SignUpResponse { uid })))
}

async fn sign_in_handler(
    State(state): State<SharedState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<Session>, ApiError> {
    run_auth(&state.auth, move |auth| auth.sign_in(&payload.email, &payload.password))
        .await
        .map(Json)
}

async fn session_handler(Extension(claims): Extension<AuthPayload>) -> Json<AuthPayload> {
    Json(claims)
}

// --- admin: multipart forms ---

/// Reads a form of one `record` JSON part, an optional `expectedVersion`
/// field, and any number of file parts keyed by image slot.
async fn read_submission<T: DeserializeOwned>(
    mut multipart: Multipart,
    expected_version: Option<u64>,
) -> Result<Submission<T>, ApiError> {
    let mut record = None;
    let mut images = HashMap::new();
    let mut expected_version = expected_version;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "record" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?;
                let parsed = serde_json::from_str(&text)
                    .map_err(|e| ApiError::bad_request(format!("Invalid record: {}", e)))?;
                record = Some(parsed);
            }
            "expectedVersion" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?;
                let version = text
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::bad_request("expectedVersion must be a number"))?;
                expected_version = Some(version);
            }
            _ => {
                let file_name = field.file_name().unwrap_or(&name).to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?;
                images.insert(
                    name,
                    ImageFile {
                        file_name,
                        bytes: bytes.to_vec(),
                    },
                );
            }
        }
    }

    let record = record.ok_or_else(|| ApiError::bad_request("Missing record field"))?;
    Ok(Submission {
        record,
        images,
        expected_version,
    })
}

async fn create_villa_handler(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Record<Villa>>), ApiError> {
    let submission = read_submission(multipart, None).await?;
    let saved = state
        .admin
        .submit_villa(None, submission)
        .await
        .map_err(|e| ApiError::write_failed("villa data", e))?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn update_villa_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<VersionParams>,
    multipart: Multipart,
) -> Result<Json<Record<Villa>>, ApiError> {
    let submission = read_submission(multipart, params.expected_version).await?;
    state
        .admin
        .submit_villa(Some(&id), submission)
        .await
        .map(Json)
        .map_err(|e| ApiError::write_failed("villa data", e))
}

async fn delete_villa_handler(State(state): State<SharedState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state
        .admin
        .blocking(move |admin| admin.remove_villa(&id))
        .await
        .map_err(|e| ApiError::delete_failed("villa", e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_collection_handler(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Record<Collection>>), ApiError> {
    let submission = read_submission(multipart, None).await?;
    let saved = state
        .admin
        .submit_collection(None, submission)
        .await
        .map_err(|e| ApiError::write_failed("collection", e))?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn update_collection_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<VersionParams>,
    multipart: Multipart,
) -> Result<Json<Record<Collection>>, ApiError> {
    let submission = read_submission(multipart, params.expected_version).await?;
    state
        .admin
        .submit_collection(Some(&id), submission)
        .await
        .map(Json)
        .map_err(|e| ApiError::write_failed("collection", e))
}

async fn delete_collection_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .admin
        .blocking(move |admin| admin.remove_collection(&id))
        .await
        .map_err(|e| ApiError::delete_failed("collection", e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn collection_drift_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<CollectionDrift>, ApiError> {
    state
        .gateway
        .blocking(move |gw| gw.collection_drift(&id))
        .await
        .map(Json)
        .map_err(|e| ApiError::read_failed("collection", e))
}

async fn create_offer_handler(
    State(state): State<SharedState>,
    Json(payload): Json<OfferRequest>,
) -> Result<(StatusCode, Json<Record<Offer>>), ApiError> {
    let saved = state
        .admin
        .blocking(move |admin| admin.submit_offer(None, payload.offer, None))
        .await
        .map_err(|e| ApiError::write_failed("offer", e))?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn update_offer_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<OfferRequest>,
) -> Result<Json<Record<Offer>>, ApiError> {
    state
        .admin
        .blocking(move |admin| admin.submit_offer(Some(&id), payload.offer, payload.expected_version))
        .await
        .map(Json)
        .map_err(|e| ApiError::write_failed("offer", e))
}

async fn delete_offer_handler(State(state): State<SharedState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state
        .admin
        .blocking(move |admin| admin.remove_offer(&id))
        .await
        .map_err(|e| ApiError::delete_failed("offer", e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_star_handler(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Record<Star>>), ApiError> {
    let submission = read_submission(multipart, None).await?;
    let saved = state
        .admin
        .submit_star(None, submission)
        .await
        .map_err(|e| ApiError::write_failed("celebrity stay", e))?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn update_star_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<VersionParams>,
    multipart: Multipart,
) -> Result<Json<Record<Star>>, ApiError> {
    let submission = read_submission(multipart, params.expected_version).await?;
    state
        .admin
        .submit_star(Some(&id), submission)
        .await
        .map(Json)
        .map_err(|e| ApiError::write_failed("celebrity stay", e))
}

async fn delete_star_handler(State(state): State<SharedState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state
        .admin
        .blocking(move |admin| admin.remove_star(&id))
        .await
        .map_err(|e| ApiError::delete_failed("celebrity stay", e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_destination_handler(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Record<Destination>>), ApiError> {
    let submission = read_submission(multipart, None).await?;
    let saved = state
        .admin
        .submit_destination(None, submission)
        .await
        .map_err(|e| ApiError::write_failed("destination", e))?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn update_destination_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<VersionParams>,
    multipart: Multipart,
) -> Result<Json<Record<Destination>>, ApiError> {
    let submission = read_submission(multipart, params.expected_version).await?;
    state
        .admin
        .submit_destination(Some(&id), submission)
        .await
        .map(Json)
        .map_err(|e| ApiError::write_failed("destination", e))
}

async fn delete_destination_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .admin
        .blocking(move |admin| admin.remove_destination(&id))
        .await
        .map_err(|e| ApiError::delete_failed("destination", e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_slide_handler(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Record<HeroSlide>>), ApiError> {
    let submission = read_submission(multipart, None).await?;
    let saved = state
        .admin
        .submit_slide(None, submission)
        .await
        .map_err(|e| ApiError::write_failed("slide", e))?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn update_slide_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<VersionParams>,
    multipart: Multipart,
) -> Result<Json<Record<HeroSlide>>, ApiError> {
    let submission = read_submission(multipart, params.expected_version).await?;
    state
        .admin
        .submit_slide(Some(&id), submission)
        .await
        .map(Json)
        .map_err(|e| ApiError::write_failed("slide", e))
}

async fn delete_slide_handler(State(state): State<SharedState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state
        .admin
        .blocking(move |admin| admin.remove_slide(&id))
        .await
        .map_err(|e| ApiError::delete_failed("slide", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Single image upload: `prefix` and `name` text fields plus one `file` part.
async fn upload_handler(State(state): State<SharedState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let mut prefix = String::from("uploads");
    let mut name = String::new();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "prefix" | "name" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?;
                if field_name == "prefix" {
                    prefix = text;
                } else {
                    name = text;
                }
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?;
                file = Some(ImageFile {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::bad_request("Missing file field"))?;
    if name.trim().is_empty() {
        name = file.file_name.clone();
    }
    let (path, url) = state
        .admin
        .upload_image(&prefix, &name, file)
        .await
        .map_err(|e| ApiError::write_failed("image", e))?;
    Ok((StatusCode::CREATED, Json(UploadResponse { path, url })).into_response())
}
