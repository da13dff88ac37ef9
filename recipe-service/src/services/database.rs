//! Recipe storage in MongoDB.

use crate::models::Recipe;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    options::{ClientOptions, FindOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use recipe_core::error::AppError;

const RECIPES_COLLECTION: &str = "recipes";

#[derive(Clone)]
pub struct RecipeDb {
    client: MongoClient,
    db: Database,
}

impl RecipeDb {
    /// Create a client for `uri`. The driver connects lazily, so this only
    /// fails on a malformed connection string.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        options.app_name = Some("recipe-service".to_string());

        let client = MongoClient::with_options(options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "MongoDB client ready");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .name("recipe_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.recipes()
            .create_index(id_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create recipe id index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Created MongoDB indexes for recipe-service");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }

    pub fn recipes(&self) -> Collection<Recipe> {
        self.db.collection(RECIPES_COLLECTION)
    }

    fn by_id() -> FindOptions {
        FindOptions::builder()
            .sort(doc! { "id": 1 })
            .projection(doc! { "_id": 0 })
            .build()
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Recipe>, AppError> {
        let cursor = self.recipes().find(filter, options).await.map_err(|e| {
            tracing::error!("Failed to query recipes: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;

        cursor.try_collect().await.map_err(|e| {
            tracing::error!("Failed to collect recipes: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })
    }

    pub async fn find_all(&self) -> Result<Vec<Recipe>, AppError> {
        self.find(doc! {}, Self::by_id()).await
    }

    /// One page of recipes, `page` starting at 1.
    pub async fn paginate(&self, page: u64, limit: u64) -> Result<Vec<Recipe>, AppError> {
        let mut options = Self::by_id();
        options.skip = Some(page.saturating_sub(1).saturating_mul(limit));
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        self.find(doc! {}, options).await
    }

    pub async fn count(&self) -> Result<u64, AppError> {
        self.recipes()
            .count_documents(doc! {}, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to count recipes: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })
    }

    /// `size` recipes chosen by the server at random.
    pub async fn sample(&self, size: i64) -> Result<Vec<Recipe>, AppError> {
        let pipeline = vec![
            doc! { "$sample": { "size": size } },
            doc! { "$project": { "_id": 0 } },
        ];

        let cursor = self.recipes().aggregate(pipeline, None).await.map_err(|e| {
            tracing::error!("Failed to sample recipes: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;

        let documents: Vec<Document> = cursor.try_collect().await.map_err(|e| {
            tracing::error!("Failed to collect sampled recipes: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;

        documents
            .into_iter()
            .map(|document| {
                bson::from_document(document).map_err(|e| {
                    tracing::error!("Failed to decode sampled recipe: {}", e);
                    AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
                })
            })
            .collect()
    }

    pub async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Recipe>, AppError> {
        self.find(doc! { "id": { "$in": ids.to_vec() } }, Self::by_id()).await
    }

    /// Insert a recipe. A taken `id` surfaces as `AppError::Conflict`.
    pub async fn insert(&self, recipe: &Recipe) -> Result<(), AppError> {
        self.recipes().insert_one(recipe, None).await.map_err(|e| {
            tracing::error!(recipe_id = recipe.id, "Failed to insert recipe: {}", e);
            AppError::from(e)
        })?;
        Ok(())
    }
}
