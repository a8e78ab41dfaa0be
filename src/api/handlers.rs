use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ErrorKind, LineageError};
use crate::logic::LineageService;
use crate::model::{
    BreedingRecord, CrossLineage, CrossSummary, CrossUpdate, FloweringCycle, FloweringPatch, FloweringStage, Harvest,
    HarvestUpdate, Id, NewCross, NewHarvest, NewPlant, NewSeedBatch, NewSeedling, Plant, PlantPromotion, SeedBatch,
    SeedBatchSummary, Seedling, SeedlingFilter, SeedlingUpdate, YieldReport,
};
use crate::store::traits::Store;

pub type AppState<S> = Arc<LineageService<S>>;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    fn new(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

impl ErrorResponse {
    pub fn new(message: &str, kind: ErrorKind) -> Self {
        Self {
            error: message.to_string(),
            kind,
        }
    }
}

pub fn error_response(err: LineageError) -> (StatusCode, Json<ErrorResponse>) {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Persistence => {
            log::error!("Persistence failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ErrorResponse::new(&err.to_string(), kind)))
}

/// Cycle as returned over HTTP, with the derived stage alongside the fields
#[derive(Debug, Serialize)]
pub struct FloweringCycleView {
    #[serde(flatten)]
    pub cycle: FloweringCycle,
    pub stage: Option<FloweringStage>,
}

impl From<FloweringCycle> for FloweringCycleView {
    fn from(cycle: FloweringCycle) -> Self {
        let stage = cycle.stage();
        Self { cycle, stage }
    }
}

/// Create-or-update body: with an `id` the cycle is patched, without one a new cycle starts
#[derive(Debug, Deserialize)]
pub struct FloweringRequest {
    pub id: Option<Id>,
    #[serde(flatten)]
    pub patch: FloweringPatch,
}

#[derive(Debug, Deserialize)]
pub struct SeedBatchQuery {
    pub harvest_id: Option<Id>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSeedBatchRequest {
    pub harvest_id: Id,
    #[serde(flatten)]
    pub batch: NewSeedBatch,
}

#[derive(Debug, Deserialize)]
pub struct CreateSeedlingRequest {
    /// Required on the first entry; later entries default to it
    pub seed_batch_id: Option<Id>,
    #[serde(flatten)]
    pub seedling: NewSeedling,
}

/// `POST /seedlings` takes one seedling or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateSeedlingsBody {
    Many(Vec<CreateSeedlingRequest>),
    One(CreateSeedlingRequest),
}

impl CreateSeedlingsBody {
    fn into_entries(self) -> Result<Vec<(Id, NewSeedling)>, LineageError> {
        let requests = match self {
            CreateSeedlingsBody::Many(requests) => requests,
            CreateSeedlingsBody::One(request) => vec![request],
        };
        let Some(first) = requests.first() else {
            return Err(LineageError::Validation("at least one seedling is required".to_string()));
        };
        let Some(default_batch) = first.seed_batch_id.clone() else {
            return Err(LineageError::Validation("seed_batch_id is required".to_string()));
        };
        Ok(requests
            .into_iter()
            .map(|r| (r.seed_batch_id.unwrap_or_else(|| default_batch.clone()), r.seedling))
            .collect())
    }
}

/// A lone seedling comes back as an object, several as an array
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreatedSeedlings {
    One(Seedling),
    Many(Vec<Seedling>),
}

#[derive(Debug, Serialize)]
pub struct NextHarvestNumberResponse {
    pub breeding_record_id: Id,
    pub next_harvest_number: i32,
}

#[derive(Debug, Serialize)]
pub struct GraduationResponse {
    pub seedling: Seedling,
    pub plant: Plant,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: Id,
}

// Plants

pub async fn register_plant<S: Store>(
    State(service): State<AppState<S>>,
    RequestJson(plant): RequestJson<NewPlant>,
) -> ApiResult<(StatusCode, Json<Plant>)> {
    let plant = service.register_plant(plant).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(plant)))
}

pub async fn get_plant<S: Store>(
    State(service): State<AppState<S>>,
    Path(plant_id): Path<Id>,
) -> ApiResult<Json<Plant>> {
    service.get_plant(&plant_id).await.map(Json).map_err(error_response)
}

pub async fn archive_plant<S: Store>(
    State(service): State<AppState<S>>,
    Path(plant_id): Path<Id>,
) -> ApiResult<Json<Plant>> {
    service.archive_plant(&plant_id).await.map(Json).map_err(error_response)
}

// Flowering

pub async fn list_flowering_cycles<S: Store>(
    State(service): State<AppState<S>>,
    Path(plant_id): Path<Id>,
) -> ApiResult<Json<ListResponse<FloweringCycleView>>> {
    let cycles = service.list_cycles(&plant_id).await.map_err(error_response)?;
    Ok(Json(ListResponse::new(cycles.into_iter().map(Into::into).collect())))
}

pub async fn upsert_flowering_cycle<S: Store>(
    State(service): State<AppState<S>>,
    Path(plant_id): Path<Id>,
    RequestJson(request): RequestJson<FloweringRequest>,
) -> ApiResult<(StatusCode, Json<FloweringCycleView>)> {
    let status = if request.id.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let cycle = service
        .upsert_cycle_for_plant(&plant_id, request.id.as_ref(), request.patch)
        .await
        .map_err(error_response)?;
    Ok((status, Json(cycle.into())))
}

pub async fn get_flowering_cycle<S: Store>(
    State(service): State<AppState<S>>,
    Path((plant_id, cycle_id)): Path<(Id, Id)>,
) -> ApiResult<Json<FloweringCycleView>> {
    let cycle = service.get_cycle(&plant_id, &cycle_id).await.map_err(error_response)?;
    Ok(Json(cycle.into()))
}

pub async fn patch_flowering_cycle<S: Store>(
    State(service): State<AppState<S>>,
    Path((plant_id, cycle_id)): Path<(Id, Id)>,
    RequestJson(patch): RequestJson<FloweringPatch>,
) -> ApiResult<Json<FloweringCycleView>> {
    let cycle = service
        .update_cycle(&plant_id, &cycle_id, patch)
        .await
        .map_err(error_response)?;
    Ok(Json(cycle.into()))
}

pub async fn delete_flowering_cycle<S: Store>(
    State(service): State<AppState<S>>,
    Path((plant_id, cycle_id)): Path<(Id, Id)>,
) -> ApiResult<Json<DeletedResponse>> {
    service
        .delete_cycle(&plant_id, &cycle_id)
        .await
        .map_err(error_response)?;
    Ok(Json(DeletedResponse { deleted: cycle_id }))
}

// Crosses

pub async fn list_crosses<S: Store>(
    State(service): State<AppState<S>>,
) -> ApiResult<Json<ListResponse<CrossSummary>>> {
    let summaries = service.queries().cross_summaries().await.map_err(error_response)?;
    Ok(Json(ListResponse::new(summaries)))
}

pub async fn create_cross<S: Store>(
    State(service): State<AppState<S>>,
    RequestJson(cross): RequestJson<NewCross>,
) -> ApiResult<(StatusCode, Json<BreedingRecord>)> {
    let record = service.create_cross(cross).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_cross<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
) -> ApiResult<Json<CrossLineage>> {
    service
        .queries()
        .cross_lineage(&cross_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_cross<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
    RequestJson(update): RequestJson<CrossUpdate>,
) -> ApiResult<Json<BreedingRecord>> {
    service
        .update_cross(&cross_id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn archive_cross<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
) -> ApiResult<Json<BreedingRecord>> {
    service.archive_cross(&cross_id).await.map(Json).map_err(error_response)
}

pub async fn delete_cross<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
) -> ApiResult<Json<DeletedResponse>> {
    service.delete_cross(&cross_id).await.map_err(error_response)?;
    Ok(Json(DeletedResponse { deleted: cross_id }))
}

pub async fn cross_yield<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
) -> ApiResult<Json<YieldReport>> {
    service
        .queries()
        .year_to_date_yield(&cross_id)
        .await
        .map(Json)
        .map_err(error_response)
}

// Harvests

pub async fn next_harvest_number<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
) -> ApiResult<Json<NextHarvestNumberResponse>> {
    let next = service.next_harvest_number(&cross_id).await.map_err(error_response)?;
    Ok(Json(NextHarvestNumberResponse {
        breeding_record_id: cross_id,
        next_harvest_number: next,
    }))
}

pub async fn list_harvests<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
) -> ApiResult<Json<ListResponse<Harvest>>> {
    let harvests = service.list_harvests(&cross_id).await.map_err(error_response)?;
    Ok(Json(ListResponse::new(harvests)))
}

pub async fn create_harvest<S: Store>(
    State(service): State<AppState<S>>,
    Path(cross_id): Path<Id>,
    RequestJson(harvest): RequestJson<NewHarvest>,
) -> ApiResult<(StatusCode, Json<Harvest>)> {
    let harvest = service
        .create_harvest(&cross_id, harvest)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(harvest)))
}

pub async fn get_harvest<S: Store>(
    State(service): State<AppState<S>>,
    Path((cross_id, harvest_id)): Path<(Id, Id)>,
) -> ApiResult<Json<Harvest>> {
    service
        .get_harvest(&cross_id, &harvest_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_harvest<S: Store>(
    State(service): State<AppState<S>>,
    Path((cross_id, harvest_id)): Path<(Id, Id)>,
    RequestJson(update): RequestJson<HarvestUpdate>,
) -> ApiResult<Json<Harvest>> {
    service
        .update_harvest(&cross_id, &harvest_id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_harvest<S: Store>(
    State(service): State<AppState<S>>,
    Path((cross_id, harvest_id)): Path<(Id, Id)>,
) -> ApiResult<Json<DeletedResponse>> {
    service
        .delete_harvest(&cross_id, &harvest_id)
        .await
        .map_err(error_response)?;
    Ok(Json(DeletedResponse { deleted: harvest_id }))
}

// Seed batches

pub async fn list_seed_batches<S: Store>(
    State(service): State<AppState<S>>,
    Query(query): Query<SeedBatchQuery>,
) -> ApiResult<Json<ListResponse<SeedBatch>>> {
    let batches = service
        .list_seed_batches(query.harvest_id.as_ref())
        .await
        .map_err(error_response)?;
    Ok(Json(ListResponse::new(batches)))
}

pub async fn create_seed_batch<S: Store>(
    State(service): State<AppState<S>>,
    RequestJson(request): RequestJson<CreateSeedBatchRequest>,
) -> ApiResult<(StatusCode, Json<SeedBatch>)> {
    let batch = service
        .create_seed_batch(&request.harvest_id, request.batch)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(batch)))
}

pub async fn get_seed_batch<S: Store>(
    State(service): State<AppState<S>>,
    Path(batch_id): Path<Id>,
) -> ApiResult<Json<SeedBatchSummary>> {
    service
        .queries()
        .seed_batch_summary(&batch_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_seed_batch<S: Store>(
    State(service): State<AppState<S>>,
    Path(batch_id): Path<Id>,
) -> ApiResult<Json<DeletedResponse>> {
    service.delete_seed_batch(&batch_id).await.map_err(error_response)?;
    Ok(Json(DeletedResponse { deleted: batch_id }))
}

// Seedlings

pub async fn list_seedlings<S: Store>(
    State(service): State<AppState<S>>,
    Query(filter): Query<SeedlingFilter>,
) -> ApiResult<Json<ListResponse<Seedling>>> {
    let seedlings = service.list_seedlings(&filter).await.map_err(error_response)?;
    Ok(Json(ListResponse::new(seedlings)))
}

pub async fn create_seedlings<S: Store>(
    State(service): State<AppState<S>>,
    RequestJson(body): RequestJson<CreateSeedlingsBody>,
) -> ApiResult<(StatusCode, Json<CreatedSeedlings>)> {
    let entries = body.into_entries().map_err(error_response)?;
    let mut created = service.create_seedlings(entries).await.map_err(error_response)?;
    let created = if created.len() == 1 {
        CreatedSeedlings::One(created.remove(0))
    } else {
        CreatedSeedlings::Many(created)
    };
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_seedling<S: Store>(
    State(service): State<AppState<S>>,
    Path(seedling_id): Path<Id>,
) -> ApiResult<Json<Seedling>> {
    service.get_seedling(&seedling_id).await.map(Json).map_err(error_response)
}

pub async fn update_seedling<S: Store>(
    State(service): State<AppState<S>>,
    Path(seedling_id): Path<Id>,
    RequestJson(update): RequestJson<SeedlingUpdate>,
) -> ApiResult<Json<Seedling>> {
    service
        .update_seedling(&seedling_id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_seedling<S: Store>(
    State(service): State<AppState<S>>,
    Path(seedling_id): Path<Id>,
) -> ApiResult<Json<DeletedResponse>> {
    service.delete_seedling(&seedling_id).await.map_err(error_response)?;
    Ok(Json(DeletedResponse { deleted: seedling_id }))
}

pub async fn graduate_seedling<S: Store>(
    State(service): State<AppState<S>>,
    Path(seedling_id): Path<Id>,
    RequestJson(promotion): RequestJson<PlantPromotion>,
) -> ApiResult<(StatusCode, Json<GraduationResponse>)> {
    let (seedling, plant) = service
        .promote_seedling(&seedling_id, promotion)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(GraduationResponse { seedling, plant })))
}
