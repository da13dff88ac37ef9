//! Recipe documents stored in the `recipes` collection.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A stored recipe. The numeric `id` is the public identifier; MongoDB's
/// `_id` is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub ingredients: Vec<String>,
    pub preparation_steps: String,
    pub preparation_time: String,
    pub country_of_origin: String,
    pub author: String,
    pub tags: Vec<String>,
    pub category: String,
}

/// Payload accepted by `POST /recipes/addNew`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRecipe {
    #[validate(range(min = 1, message = "id must be a positive integer"))]
    pub id: i64,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    #[validate(length(min = 1, message = "image_url is required"))]
    pub image_url: String,
    pub ingredients: Vec<String>,
    #[validate(length(min = 1, message = "preparation_steps is required"))]
    pub preparation_steps: String,
    #[validate(length(min = 1, message = "preparation_time is required"))]
    pub preparation_time: String,
    #[validate(length(min = 1, message = "country_of_origin is required"))]
    pub country_of_origin: String,
    #[validate(length(min = 1, message = "author is required"))]
    pub author: String,
    pub tags: Vec<String>,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
}

impl From<NewRecipe> for Recipe {
    fn from(new: NewRecipe) -> Self {
        Self {
            id: new.id,
            title: new.title,
            description: new.description,
            image_url: new.image_url,
            ingredients: new.ingredients,
            preparation_steps: new.preparation_steps,
            preparation_time: new.preparation_time,
            country_of_origin: new.country_of_origin,
            author: new.author,
            tags: new.tags,
            category: new.category,
        }
    }
}
