use crate::models::Recipe;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

/// Raw `page`/`limit` query values. Kept as strings so a malformed value
/// yields the endpoint's own message instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PaginationQuery {
    /// Parsed `(page, limit)`, both at least 1.
    pub fn resolve(&self) -> Option<(u64, u64)> {
        let page = parse_positive(self.page.as_deref(), DEFAULT_PAGE)?;
        let limit = parse_positive(self.limit.as_deref(), DEFAULT_LIMIT)?;
        Some((page, limit))
    }
}

/// Integer prefix parse: `"3abc"` reads as 3, `"abc"` is rejected.
fn parse_positive(raw: Option<&str>, default: u64) -> Option<u64> {
    let Some(raw) = raw else {
        return Some(default);
    };
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i128 = digits[..end].parse().ok()?;
    u64::try_from(sign * value).ok().filter(|v| *v >= 1)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePage {
    pub data: Vec<Recipe>,
    pub current_page: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl RecipePage {
    pub fn new(data: Vec<Recipe>, page: u64, limit: u64, total: u64) -> Self {
        Self {
            data,
            current_page: page,
            total_pages: total.div_ceil(limit),
            has_next_page: page.saturating_mul(limit) < total,
            has_prev_page: page > 1,
        }
    }
}

/// Recipe ids from a query string. Accepts `ids=1,2`, repeated `ids=` keys
/// and `ids[]=`. Returns `None` when no ids key is present; zero and
/// unparsable entries are dropped.
pub fn parse_ids(query: &str) -> Option<Vec<i64>> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;

    let values: Vec<String> = pairs
        .into_iter()
        .filter(|(key, _)| key == "ids" || key == "ids[]")
        .map(|(_, value)| value)
        .collect();

    if values.iter().all(|value| value.is_empty()) {
        return None;
    }

    Some(
        values
            .iter()
            .flat_map(|value| value.split(','))
            .filter_map(|id| id.trim().parse::<i64>().ok())
            .filter(|id| *id != 0)
            .collect(),
    )
}
