use tracing::info;
use warp::{Rejection, Reply};

use super::{reject, SharedState};
use crate::error::ApiError;
use crate::ingest;
use crate::models::{DishCard, DishRecord, IndexResponse};

/// Path segments arrive percent-encoded; store keys are the decoded text.
fn decode_id(raw: &str) -> Result<String, ApiError> {
    urlencoding::decode(raw)
        .map(|id| id.into_owned())
        .map_err(|_| ApiError::BadRequest("dish id is not valid UTF-8".into()))
}

pub async fn handle_list(state: SharedState) -> Result<impl Reply, Rejection> {
    let dishes = state
        .repository
        .load_all()
        .await
        .map_err(|e| reject(&state, e))?;
    let cards: Vec<DishCard> = dishes.iter().map(DishCard::from).collect();
    Ok(warp::reply::json(&cards))
}

pub async fn handle_get(id: String, state: SharedState) -> Result<impl Reply, Rejection> {
    let id = decode_id(&id).map_err(|e| reject(&state, e))?;
    let dish = state
        .repository
        .get(&id)
        .await
        .map_err(|e| reject(&state, e))?;
    Ok(warp::reply::json(&DishCard::from(&dish)))
}

/// Stores one record under `id`. Takes effect in search after the next reindex.
pub async fn handle_put(
    id: String,
    mut record: DishRecord,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    record.id = decode_id(&id).map_err(|e| reject(&state, e))?;
    state
        .repository
        .put(&record)
        .await
        .map_err(|e| reject(&state, e))?;
    info!(dish_id = %record.id, "Dish stored");
    Ok(warp::reply::json(&DishCard::from(&record)))
}

pub async fn handle_index(state: SharedState) -> Result<impl Reply, Rejection> {
    let indexed = ingest::index_catalog(
        &state.repository,
        state.embedder.as_ref(),
        state.index.as_ref(),
    )
    .await
    .map_err(|e| reject(&state, e))?;

    state.metrics.dishes_indexed.inc_by(indexed as u64);
    Ok(warp::reply::json(&IndexResponse { indexed }))
}
