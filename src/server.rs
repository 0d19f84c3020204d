//! REST surface of the schema registry
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/schema/{id}/version/{version}` | one version of a schema |
//! | POST | `/schema/` | create, version 1 |
//! | PUT | `/schema/{id}` | append a version |
//! | PATCH | `/schema/{id}` | change name, description or type |
//! | DELETE | `/schema/{id}` | remove a schema |
//! | POST | `/schema/{id}/evolution` | infer and register a version |
//! | GET | `/schema/resolver/{id}` | all versions |
//!
//! Every failure body is `{"message": ...}`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::{PipelineError, SchemaError};
use crate::evolution::{self, Evolution};
use crate::schema::{
    EvolutionRequest, InsertInfo, NewSchema, Report, Schema, SchemaMetadataUpdate, SpecificationUpdate,
};
use crate::store::SchemaStore;
use crate::version::SchemaVersion;

pub type AppState = Arc<dyn SchemaStore>;

type ApiError = (StatusCode, Json<Report>);
type ApiResult<T> = std::result::Result<T, ApiError>;

fn report(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(Report {
            message: message.into(),
        }),
    )
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    warn!(error = %rejection, "rejected request body");
    report(
        StatusCode::BAD_REQUEST,
        "Bad request. Content-Type must be 'application/json'.",
    )
}

/// Build the registry router over a store
pub fn router(store: AppState) -> Router {
    Router::new()
        .route("/schema", post(create_schema))
        .route("/schema/", post(create_schema))
        .route("/schema/resolver/{id}", get(list_versions))
        .route(
            "/schema/{id}",
            put(update_schema).patch(update_metadata).delete(delete_schema),
        )
        .route("/schema/{id}/version/{version}", get(get_schema))
        .route("/schema/{id}/evolution", post(evolve_schema))
        .with_state(store)
}

/// Serve the registry on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener, store: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "schema registry listening");
    }
    axum::serve(listener, router(store)).await
}

async fn get_schema(
    State(store): State<AppState>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<Schema>> {
    let Some(number) = SchemaVersion::parse_number(&version) else {
        return Err(report(
            StatusCode::BAD_REQUEST,
            "Bad request. Version isn't a valid number.",
        ));
    };

    match store.get_by_id_and_version(&id, number) {
        Ok(Some(schema)) => Ok(Json(schema)),
        Ok(None) => Err(report(StatusCode::NOT_FOUND, "Schema not found.")),
        Err(e) => {
            error!(schema_id = %id, version = number, error = %e, "schema lookup failed");
            Err(report(StatusCode::INTERNAL_SERVER_ERROR, "Server storage error while getting schema."))
        }
    }
}

async fn create_schema(
    State(store): State<AppState>,
    body: Result<Json<NewSchema>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InsertInfo>)> {
    let Json(request) = body.map_err(bad_body)?;
    match store.create(request) {
        Ok(info) => {
            info!(schema_id = %info.identification, "schema registered");
            Ok((StatusCode::CREATED, Json(info)))
        }
        Err(e) => {
            error!(error = %e, "schema creation failed");
            Err(report(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server storage error! Schema was not registered.",
            ))
        }
    }
}

async fn update_schema(
    State(store): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<SpecificationUpdate>, JsonRejection>,
) -> ApiResult<Json<InsertInfo>> {
    let Json(update) = body.map_err(bad_body)?;
    store.update(&id, update.specification, false).map(Json).map_err(|e| {
        error!(schema_id = %id, error = %e, "schema update failed");
        report(StatusCode::INTERNAL_SERVER_ERROR, "Could not update schema")
    })
}

async fn update_metadata(
    State(store): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<SchemaMetadataUpdate>, JsonRejection>,
) -> ApiResult<Json<Report>> {
    let Json(update) = body.map_err(bad_body)?;
    match store.update_metadata(&id, update) {
        Ok(()) => Ok(Json(Report {
            message: "Schema metadata updated.".to_string(),
        })),
        Err(SchemaError::NotFound { .. }) => Err(report(StatusCode::NOT_FOUND, "Schema not found.")),
        Err(e) => {
            error!(schema_id = %id, error = %e, "metadata update failed");
            Err(report(StatusCode::INTERNAL_SERVER_ERROR, "Could not update schema"))
        }
    }
}

async fn delete_schema(State(store): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Report>> {
    match store.delete(&id) {
        Ok(()) => {
            info!(schema_id = %id, "schema deleted");
            Ok(Json(Report {
                message: "Schema deleted.".to_string(),
            }))
        }
        Err(SchemaError::NotFound { .. }) => Err(report(StatusCode::NOT_FOUND, "Schema not found.")),
        Err(e) => {
            error!(schema_id = %id, error = %e, "schema deletion failed");
            Err(report(StatusCode::INTERNAL_SERVER_ERROR, "Could not delete schema"))
        }
    }
}

async fn evolve_schema(
    State(store): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<EvolutionRequest>, JsonRejection>,
) -> ApiResult<Json<InsertInfo>> {
    let Json(request) = body.map_err(bad_body)?;
    match evolution::evolve(store.as_ref(), &id, &request) {
        Ok(Evolution::Registered(info)) => Ok(Json(info)),
        Ok(Evolution::NotGenerated) => Ok(Json(InsertInfo {
            message: "Schema couldn't be generated, dead-letter message".to_string(),
            ..Default::default()
        })),
        Err(PipelineError::UnknownFormat(format)) => Err(report(
            StatusCode::BAD_REQUEST,
            format!("Bad request. Unknown format '{format}'."),
        )),
        Err(e @ PipelineError::Inference(_)) => {
            warn!(schema_id = %id, error = %e, "schema inference failed");
            Err(report(StatusCode::INTERNAL_SERVER_ERROR, "Schema dynamic generation error!"))
        }
        Err(e) => {
            error!(schema_id = %id, error = %e, "evolved schema was not stored");
            Err(report(StatusCode::INTERNAL_SERVER_ERROR, "Could not update schema"))
        }
    }
}

async fn list_versions(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<SchemaVersion>>> {
    store.list_versions(&id).map(Json).map_err(|e| {
        error!(schema_id = %id, error = %e, "listing versions failed");
        report(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server storage error while getting schema versions.",
        )
    })
}
