pub mod generate;
pub mod recipes;

pub use generate::{GenerateRequest, InvalidRequest, ValidationMode};
pub use recipes::{parse_ids, PaginationQuery, RecipePage};
