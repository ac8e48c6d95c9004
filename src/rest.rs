//! REST API layer for the loan-intake service using Axum.
//!
//! Endpoints mirror the branch workflow:
//! - auth (signup/login), center and member CRUD for the field agent,
//! - the multipart loan intake pipeline (files -> object storage, scalars ->
//!   one flat record),
//! - admin surfaces: loan listing/detail, status transitions, user blocking,
//! - public blob reads under /storage for the stored document keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{create_jwt, hash_password, validate_jwt, verify_password};
use crate::blobstore::BlobStore;
use crate::crop::normalize_upload;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthPayload, Center, DocumentImage, DocumentPaths, DocumentSlot, Loan, LoanDraft, LoanStatus,
    Member, User,
};
use crate::storage::Storage;
use crate::validate::{validate_step1, validate_step2, validate_step3};

/// Per-file cap for document uploads.
pub const MAX_FILE_BYTES: usize = 25 * 1024 * 1024;

/// Shared app state for REST handlers (Arc-wrapped for concurrency).
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub blobs: BlobStore,
    pub jwt_secret: Vec<u8>,
    /// When set, uploads pass through the best-effort re-encode hook.
    pub normalize_uploads: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User as exposed over the wire; never carries the password hash.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub blocked: bool,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        UserView {
            id: user.id,
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
            blocked: user.blocked,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: UserView,
}

#[derive(Deserialize)]
pub struct CreateCenterRequest {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub name: String,
    pub center_id: String,
    #[serde(default)]
    pub member_cibil: Option<String>,
    #[serde(default)]
    pub dateofbirth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct BlockUpdateRequest {
    pub blocked: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanSubmittedResponse {
    pub success: bool,
    pub loan_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoanCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub credited: usize,
}

/// Loan detail plus resolved public URLs per slot (wire field name keyed).
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanDetailResponse {
    #[serde(flatten)]
    pub loan: Loan,
    pub document_urls: BTreeMap<&'static str, Option<String>>,
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;
    let claims = validate_jwt(token, &state.jwt_secret).map_err(|_| ApiError::Unauthorized)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn require_admin(claims: &AuthPayload) -> ApiResult<()> {
    if claims.admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Admin access required".to_string()))
    }
}

/// Create the Axum router over the record store and blob store.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let auth_routes = Router::new()
        .route(
            "/api/centers",
            post(create_center_handler).get(list_centers_handler),
        )
        .route("/api/members", post(create_member_handler))
        .route("/api/members/:center_id", get(list_members_handler))
        .route(
            "/api/loans",
            post(create_loan_handler).get(list_loans_handler),
        )
        .route("/api/loans/counts", get(loan_counts_handler))
        .route(
            "/api/loans/:id",
            get(get_loan_handler)
                .patch(update_loan_status_handler)
                .delete(delete_loan_handler),
        )
        .route("/api/users", get(list_users_handler))
        .route("/api/users/:id", patch(block_user_handler))
        .route("/api/users/:id/loans", get(user_loans_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/storage/*key", get(read_object_handler))
        .route("/", get(health_handler))
        .merge(auth_routes)
        .layer(DefaultBodyLimit::max(MAX_FILE_BYTES * 10))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK", "message": "Backend running" }))
}

// --- Auth ---

async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if payload.name.is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest("All fields required".to_string()));
    }

    let hash = hash_password(&payload.password)
        .map_err(|e| ApiError::Storage(format!("password hash failed: {e}")))?;
    let user = state
        .storage
        .create_user(&payload.name, &payload.email, &hash, payload.is_admin)?;

    tracing::info!(user = %user.email, "user signed up");
    Ok(Json(serde_json::json!({
        "success": true,
        "user": UserView::from(user),
    })))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password required".to_string(),
        ));
    }

    let user = state
        .storage
        .get_user_by_email(&payload.email)?
        .ok_or(ApiError::Unauthorized)?;

    if user.blocked {
        return Err(ApiError::Forbidden("Account blocked".to_string()));
    }

    if !verify_password(&payload.password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::Unauthorized);
    }

    let token = create_jwt(&user, &state.jwt_secret)
        .map_err(|e| ApiError::Storage(format!("token mint failed: {e}")))?;
    // The admin flag rides back so the client decides where to land.
    Ok(Json(LoginResponse {
        success: true,
        token,
        user: user.into(),
    }))
}

// --- Centers / Members ---

async fn create_center_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCenterRequest>,
) -> ApiResult<Json<Center>> {
    let center = state.storage.create_center(&payload.name)?;
    Ok(Json(center))
}

async fn list_centers_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Center>>> {
    Ok(Json(state.storage.list_centers()?))
}

async fn create_member_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateMemberRequest>,
) -> ApiResult<Json<Member>> {
    let member = state.storage.create_member(
        &payload.center_id,
        &payload.name,
        payload.member_cibil,
        payload.dateofbirth,
        payload.gender,
    )?;
    Ok(Json(member))
}

async fn list_members_handler(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<String>,
) -> ApiResult<Json<Vec<Member>>> {
    Ok(Json(state.storage.members_in_center(&center_id)?))
}

// --- Loan intake pipeline ---

/// Sequence id for a new loan: timestamp plus a random numeric suffix so two
/// submissions in the same millisecond cannot collide into one key prefix. A
/// retry after failure always mints a fresh id.
fn next_loan_sequence_id() -> String {
    let random = Uuid::new_v4().as_u128() % 100_000;
    format!("LN-{}{:05}", Utc::now().timestamp_millis(), random)
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        _ => "jpg",
    }
}

fn draft_from_scalars(scalars: &BTreeMap<String, String>) -> LoanDraft {
    let field = |name: &str| scalars.get(name).cloned().unwrap_or_default();
    LoanDraft {
        member_cibil: field("memberCibil"),
        person_name: field("personName"),
        dateofbirth: field("dateofbirth"),
        gender: field("gender"),
        religion: field("religion"),
        marital_status: field("maritalStatus"),
        aadhar_no: field("aadharNo"),
        memberwork: field("memberwork"),
        annual_income: field("annualIncome"),
        nominee_name: field("nomineeName"),
        nominee_dob: field("nomineeDob"),
        nominee_gender: field("nomineeGender"),
        nominee_religion: field("nomineeReligion"),
        nominee_marital_status: field("nomineeMaritalStatus"),
        nominee_relationship: field("nomineeRelationship"),
        nominee_business: field("nomineeBusiness"),
        mobile_no: field("mobileNo"),
        nominee_mobile: field("nomineeMobile"),
        member_email: field("memberEmail"),
        address: field("address"),
        pincode: field("pincode"),
        ..LoanDraft::default()
    }
}

/// The intake pipeline: drain the multipart request, re-validate everything
/// the client already validated, write each file to object storage under the
/// new sequence id, then insert one flat record. Any file-write or insert
/// failure aborts the request; already-written files are left behind (orphan
/// risk accepted, see DESIGN notes).
async fn create_loan_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    mut multipart: Multipart,
) -> ApiResult<Json<LoanSubmittedResponse>> {
    let mut scalars: BTreeMap<String, String> = BTreeMap::new();
    let mut files: BTreeMap<DocumentSlot, DocumentImage> = BTreeMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart request: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(slot) = DocumentSlot::from_field_name(&name) {
            let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
            let file_name = field.file_name().unwrap_or("upload.jpg").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed reading {name}: {e}")))?;
            if bytes.len() > MAX_FILE_BYTES {
                return Err(ApiError::BadRequest(format!(
                    "{name} exceeds the 25 MB limit"
                )));
            }
            files.insert(
                slot,
                DocumentImage {
                    bytes: bytes.to_vec(),
                    content_type,
                    file_name,
                },
            );
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed reading {name}: {e}")))?;
            scalars.insert(name, value);
        }
    }

    // Selection context is fatal when absent; there is nothing to retry.
    let user_id = require_context(&scalars, "userId")?;
    let center_id = require_context(&scalars, "centerId")?;
    let member_id = require_context(&scalars, "memberId")?;
    if state.storage.get_center(&center_id)?.is_none() {
        return Err(ApiError::MissingContext("centerId".to_string()));
    }
    if state.storage.get_member(&member_id)?.is_none() {
        return Err(ApiError::MissingContext("memberId".to_string()));
    }

    // Same rules as the wizard steps; the server never trusts the client.
    let draft = draft_from_scalars(&scalars);
    let mut errors = validate_step1(&draft);
    errors.extend(validate_step2(&draft));
    errors.extend(validate_step3(&draft));
    for slot in DocumentSlot::ALL {
        if !files.contains_key(&slot) {
            errors.insert(slot.field_name(), "Required".to_string());
        }
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let loan_id = next_loan_sequence_id();
    let mut documents = DocumentPaths::default();
    for (slot, image) in &files {
        let (bytes, content_type) = if state.normalize_uploads {
            normalize_upload(&image.bytes, &image.content_type)
        } else {
            (image.bytes.clone(), image.content_type.clone())
        };
        let key = format!(
            "loans/{}/{}-{}.{}",
            loan_id,
            slot.field_name(),
            Uuid::new_v4().simple(),
            extension_for(&content_type),
        );
        let key = state.blobs.put_object(&key, &bytes, &content_type)?;
        documents.set(*slot, key);
    }

    let loan = Loan {
        id: Uuid::new_v4().to_string(),
        loan_id: loan_id.clone(),
        user_id,
        center_id,
        member_id,
        member_cibil: draft.member_cibil,
        person_name: draft.person_name,
        dateofbirth: draft.dateofbirth,
        gender: draft.gender,
        religion: draft.religion,
        marital_status: draft.marital_status,
        aadhar_no: draft.aadhar_no,
        memberwork: draft.memberwork,
        annual_income: draft.annual_income,
        nominee_name: draft.nominee_name,
        nominee_dob: draft.nominee_dob,
        nominee_gender: draft.nominee_gender,
        nominee_religion: draft.nominee_religion,
        nominee_marital_status: draft.nominee_marital_status,
        nominee_relationship: draft.nominee_relationship,
        nominee_business: draft.nominee_business,
        mobile_no: draft.mobile_no,
        nominee_mobile: draft.nominee_mobile,
        member_email: draft.member_email,
        address: draft.address,
        pincode: draft.pincode,
        documents,
        status: LoanStatus::Pending,
        created_at: Utc::now(),
    };
    state.storage.insert_loan(&loan)?;

    tracing::info!(loan = %loan_id, agent = %claims.sub, "loan application received");
    Ok(Json(LoanSubmittedResponse {
        success: true,
        loan_id,
    }))
}

fn require_context(scalars: &BTreeMap<String, String>, name: &str) -> ApiResult<String> {
    match scalars.get(name) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ApiError::MissingContext(name.to_string())),
    }
}

// --- Loan queries / admin ---

async fn list_loans_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
) -> ApiResult<Json<Vec<Loan>>> {
    require_admin(&claims)?;
    Ok(Json(state.storage.list_loans()?))
}

async fn user_loans_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Loan>>> {
    if claims.sub != user_id {
        require_admin(&claims)?;
    }
    Ok(Json(state.storage.loans_for_user(&user_id)?))
}

async fn loan_counts_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
) -> ApiResult<Json<LoanCounts>> {
    require_admin(&claims)?;
    Ok(Json(LoanCounts {
        pending: state.storage.count_loans_with_status(LoanStatus::Pending)?,
        approved: state.storage.count_loans_with_status(LoanStatus::Approved)?,
        rejected: state.storage.count_loans_with_status(LoanStatus::Rejected)?,
        credited: state.storage.count_loans_with_status(LoanStatus::Credited)?,
    }))
}

async fn get_loan_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> ApiResult<Json<LoanDetailResponse>> {
    let loan = state
        .storage
        .get_loan(&id)?
        .ok_or_else(|| ApiError::NotFound("loan".to_string()))?;
    if claims.sub != loan.user_id {
        require_admin(&claims)?;
    }

    let document_urls = DocumentSlot::ALL
        .into_iter()
        .map(|slot| {
            let url = loan
                .documents
                .get(slot)
                .map(|key| state.blobs.public_url(key));
            (slot.field_name(), url)
        })
        .collect();
    Ok(Json(LoanDetailResponse {
        loan,
        document_urls,
    }))
}

async fn update_loan_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<Json<Loan>> {
    require_admin(&claims)?;
    let status: LoanStatus = payload.status.parse().map_err(ApiError::BadRequest)?;
    let loan = state.storage.update_loan_status(&id, status)?;
    tracing::info!(loan = %loan.loan_id, status = %loan.status, "loan status updated");
    Ok(Json(loan))
}

async fn delete_loan_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&claims)?;
    state.storage.delete_loan(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// --- Users (admin) ---

async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
) -> ApiResult<Json<Vec<UserView>>> {
    require_admin(&claims)?;
    let users = state
        .storage
        .list_users()?
        .into_iter()
        .map(UserView::from)
        .collect();
    Ok(Json(users))
}

async fn block_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    Json(payload): Json<BlockUpdateRequest>,
) -> ApiResult<Json<UserView>> {
    require_admin(&claims)?;
    let user = state.storage.set_user_blocked(&id, payload.blocked)?;
    Ok(Json(user.into()))
}

// --- Blob reads (public URLs) ---

async fn read_object_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    if !state.blobs.object_exists(&key) {
        return Err(ApiError::NotFound("object".to_string()));
    }
    let (bytes, content_type) = state.blobs.get_object(&key)?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
