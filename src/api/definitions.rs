//! POST /definitions - publish a contest definition.
//!
//! Definitions are immutable once stored; this is the only write path.

use axum::{extract::State, http::StatusCode, response::Json};

use crate::api::SharedAppState;
use crate::domain::definition::Definition;
use crate::error::AppError;

/// POST /definitions - validate and persist a new definition.
pub async fn create_definition(
    State(state): State<SharedAppState>,
    Json(definition): Json<Definition>,
) -> Result<(StatusCode, Json<Definition>), AppError> {
    definition.validate()?;
    let stored = state.store.create_definition(definition).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}
