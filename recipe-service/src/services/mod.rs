pub mod database;
pub mod generation;
pub mod metrics;
pub mod providers;

pub use database::RecipeDb;
pub use generation::{GenerationError, GenerationService, TextStream};
pub use metrics::{get_metrics, init_metrics};
