//! Domain models for the recipe service.

pub mod history;
pub mod recipe;

pub use history::{HistoryEntry, HistoryPart, Role};
pub use recipe::{NewRecipe, Recipe};
