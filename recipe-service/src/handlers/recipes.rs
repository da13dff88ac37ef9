use crate::dtos::{parse_ids, PaginationQuery, RecipePage};
use crate::models::{NewRecipe, Recipe};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, RawQuery, State},
    Json,
};
use recipe_core::error::AppError;
use validator::Validate;

/// Recipes returned by `/recipes/random`.
const RANDOM_SAMPLE_SIZE: i64 = 6;

pub async fn list_all(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, AppError> {
    Ok(Json(state.db.find_all().await?))
}

pub async fn paginate(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<RecipePage>, AppError> {
    let (page, limit) = query
        .resolve()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid page or limit")))?;

    let total = state.db.count().await?;
    let data = state.db.paginate(page, limit).await?;

    Ok(Json(RecipePage::new(data, page, limit, total)))
}

pub async fn random(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, AppError> {
    Ok(Json(state.db.sample(RANDOM_SAMPLE_SIZE).await?))
}

pub async fn by_ids(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<Recipe>>, AppError> {
    let ids = query
        .as_deref()
        .and_then(parse_ids)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("ids query param required")))?;

    Ok(Json(state.db.find_by_ids(&ids).await?))
}

pub async fn add_new(
    State(state): State<AppState>,
    payload: Result<Json<NewRecipe>, JsonRejection>,
) -> Result<Json<Recipe>, AppError> {
    let Json(new_recipe) =
        payload.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    new_recipe.validate()?;

    let recipe = Recipe::from(new_recipe);
    state.db.insert(&recipe).await?;

    tracing::info!(recipe_id = recipe.id, "Recipe created");
    Ok(Json(recipe))
}
