use std::sync::Arc;

use axum::extract::{Path, Query as Params, State};
use axum::http::StatusCode;
use axum::response::Json;
use scd_engine::{Engine, EngineError};
use scd_store::VersionStore;
use scd_types::{BusinessKey, Envelope, Payload, Version, Versioned};
use serde_json::{json, Value};

use crate::error::{ServerError, ServerResult};
use crate::resource::{list_query, ListFilter, Resource};

/// Shared handler state.
pub struct AppState<S> {
    engine: Arc<Engine<S>>,
}

impl<S: VersionStore + 'static> AppState<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// Run a blocking engine call off the async executor.
    async fn run<T, F>(&self, f: F) -> ServerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Engine<S>) -> ServerResult<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

fn one(data: impl serde::Serialize) -> Json<Value> {
    Json(json!({ "data": data }))
}

fn many<T: serde::Serialize>(data: Vec<T>) -> Json<Value> {
    let count = data.len();
    Json(json!({ "data": data, "count": count }))
}

/// Reject keys that are not payload columns of `E`. Envelope fields are
/// assigned by the engine and never accepted from clients.
fn payload_from<E: Resource>(object: &Payload) -> ServerResult<Payload> {
    if let Some(key) = object.keys().find(|k| E::TABLE.column(k).is_none()) {
        return Err(ServerError::BadRequest(format!(
            "'{key}' is not a writable field of {}",
            E::PATH
        )));
    }
    Ok(object.clone())
}

/// Health check handler.
pub async fn health<S: VersionStore + 'static>(State(state): State<AppState<S>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "backend": state.engine().store().backend(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /<resource>`: latest rows, optionally filtered.
pub async fn list<S: VersionStore + 'static, E: Resource>(
    State(state): State<AppState<S>>,
    Params(filter): Params<ListFilter>,
) -> ServerResult<Json<Value>> {
    let rows = state
        .run(move |engine| {
            let query = list_query::<E, _, _>(engine, &filter)?;
            Ok(engine.find::<E>(&query)?)
        })
        .await?;
    Ok(many(rows))
}

/// `GET /<resource>/:id`
pub async fn latest<S: VersionStore + 'static, E: Resource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    let key = BusinessKey::new(id)?;
    let row = state.run(move |engine| Ok(engine.get_latest::<E>(&key)?)).await?;
    Ok(one(row))
}

/// `GET /<resource>/:id/versions`: full history, 404 if the key never existed.
pub async fn versions<S: VersionStore + 'static, E: Resource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    let key = BusinessKey::new(id)?;
    let rows = state
        .run(move |engine| {
            let rows = engine.get_all_versions::<E>(&key)?;
            if rows.is_empty() {
                return Err(EngineError::NotFound {
                    table: E::TABLE.name,
                    business_key: key.to_string(),
                }
                .into());
            }
            Ok(rows)
        })
        .await?;
    Ok(many(rows))
}

/// `GET /<resource>/:id/versions/:version`
pub async fn version<S: VersionStore + 'static, E: Resource>(
    State(state): State<AppState<S>>,
    Path((id, version)): Path<(String, u32)>,
) -> ServerResult<Json<Value>> {
    let key = BusinessKey::new(id)?;
    let version = Version::new(version)?;
    let row = state
        .run(move |engine| Ok(engine.get_version::<E>(&key, version)?))
        .await?;
    Ok(one(row))
}

/// `POST /<resource>`: body holds `business_key` plus every payload field.
pub async fn create<S: VersionStore + 'static, E: Resource>(
    State(state): State<AppState<S>>,
    Json(mut body): Json<Payload>,
) -> ServerResult<(StatusCode, Json<Value>)> {
    let key = match body.remove("business_key") {
        Some(Value::String(key)) => BusinessKey::new(key)?,
        _ => return Err(ServerError::BadRequest("business_key must be a string".into())),
    };
    let payload = payload_from::<E>(&body)?;
    let entity = E::from_parts(Envelope::draft(key), payload)
        .map_err(|e| EngineError::Validation(e.to_string()))?;
    let created = state.run(move |engine| Ok(engine.create(entity)?)).await?;
    Ok((StatusCode::CREATED, one(created)))
}

/// `PATCH /<resource>/:id`: merge the body into a copy of the latest
/// version and store it as the next version.
pub async fn update<S: VersionStore + 'static, E: Resource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Json(body): Json<Payload>,
) -> ServerResult<Json<Value>> {
    let key = BusinessKey::new(id)?;
    let patch = payload_from::<E>(&body)?;
    if patch.is_empty() {
        return Err(ServerError::BadRequest("nothing to update".into()));
    }
    let updated = state
        .run(move |engine| {
            Ok(engine.try_update(&key, |entity: &mut E| {
                let mut payload = entity.to_payload().map_err(|e| e.to_string())?;
                payload.extend(patch.clone());
                *entity = E::from_parts(entity.envelope().clone(), payload)
                    .map_err(|e| e.to_string())?;
                Ok(())
            })?)
        })
        .await?;
    Ok(one(updated))
}

/// `DELETE /<resource>/:id`: soft delete.
pub async fn delete<S: VersionStore + 'static, E: Resource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    let key = BusinessKey::new(id)?;
    state
        .run(move |engine| Ok(engine.soft_delete::<E>(&key)?))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
