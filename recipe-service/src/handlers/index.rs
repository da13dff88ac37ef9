use crate::startup::AppState;
use axum::{extract::State, response::Html};

fn landing(heading: &str, production: bool) -> Html<String> {
    let mode = if production {
        "Production Mode"
    } else {
        "Development Mode"
    };
    Html(format!("<h1>{}</h1>\n<h2>{}</h2>\n", heading, mode))
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Html<String> {
    landing("Connected to the server", state.config.is_production())
}

/// `GET /recipes`
pub async fn recipes_root(State(state): State<AppState>) -> Html<String> {
    landing("Connected to the server/recipes", state.config.is_production())
}
