//! Search front end over HTTP.
//!
//! Serves a single-page HTML search form and a JSON API over the same
//! [`SearchService`]. Each request runs one query to completion; nothing is
//! kept between requests.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/?q=...` | HTML page: search box, result cards, debug panel |
//! | `GET`  | `/api/search?q=...` | JSON [`SearchOutcome`] |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! API errors use one body shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "intent classifier reply is not valid intent JSON: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400) for classifier replies that are not
//! intent JSON, `internal` (500) for everything else.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use bundle_search_core::intent::{Intent, IntentError};

use crate::config::Config;
use crate::search::{SearchOutcome, SearchService};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    search: Arc<SearchService>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// The embedding model, classifier client and connection pool are created
/// once here and shared by every request.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = SearchService::from_config(config).await?;
    let app = router(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "search server listening");
    println!("Search server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router around an existing service.
pub fn router(search: Arc<SearchService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_page))
        .route("/api/search", get(handle_api_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { search })
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map a pipeline failure to an HTTP error. Unparseable classifier output
/// is the caller's problem to retry; anything else is ours.
fn classify_search_error(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    if err.downcast_ref::<IntentError>().is_some() {
        bad_request(message)
    } else {
        error!(error = %message, "search failed");
        internal(message)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/search ============

async fn handle_api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchOutcome>, AppError> {
    let outcome = state
        .search
        .search(&params.q)
        .await
        .map_err(classify_search_error)?;
    Ok(Json(outcome))
}

// ============ GET / ============

async fn handle_page(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Html<String>) {
    match state.search.search(&params.q).await {
        Ok(outcome) => (StatusCode::OK, Html(render_page(&params.q, &outcome))),
        Err(err) => {
            let app_err = classify_search_error(err);
            (
                app_err.status,
                Html(render_error_page(&params.q, &app_err.message)),
            )
        }
    }
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Bundle Search</title>
<style>
body { font-family: sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; }
form input[type=text] { width: 80%; padding: .5rem; }
.card { border: 1px solid #ddd; border-radius: 6px; padding: 1rem; margin: 1rem 0; }
.card h2 { margin: 0 0 .25rem 0; font-size: 1.2rem; }
.author { color: #555; margin: 0 0 .5rem 0; }
.message { color: #a15c00; }
.error { color: #b00020; }
pre { background: #f6f6f6; padding: .75rem; overflow-x: auto; }
</style>
</head>
<body>
<h1>Bundle Search</h1>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";

fn render_form(query: &str) -> String {
    format!(
        "<form method=\"get\" action=\"/\">\n<input type=\"text\" name=\"q\" value=\"{}\" placeholder=\"Describe the bundle you are looking for\" autofocus>\n<button type=\"submit\">Search</button>\n</form>\n",
        escape_html(query)
    )
}

/// Render the full page for a completed search.
///
/// Bundle descriptions are stored HTML and are inserted unescaped; every
/// other value is escaped.
pub fn render_page(query: &str, outcome: &SearchOutcome) -> String {
    let mut html = String::from(PAGE_HEAD);
    html.push_str(&render_form(query));

    match outcome {
        SearchOutcome::Empty => {}
        SearchOutcome::Unsupported { message, .. } => {
            html.push_str(&format!(
                "<p class=\"message\">{}</p>\n",
                escape_html(message)
            ));
        }
        SearchOutcome::Results {
            intent,
            sql,
            params,
            hits,
        } => {
            if hits.is_empty() {
                html.push_str("<p>No results.</p>\n");
            }
            for hit in hits {
                let b = &hit.bundle;
                html.push_str("<div class=\"card\">\n");
                html.push_str(&format!("<h2>{}</h2>\n", escape_html(&b.human_name)));
                if !b.author.is_empty() {
                    html.push_str(&format!(
                        "<p class=\"author\">by {}</p>\n",
                        escape_html(&b.author)
                    ));
                }
                html.push_str(&format!("<div class=\"description\">{}</div>\n", b.description));
                html.push_str(&format!(
                    "<p><a href=\"{}\" target=\"_blank\" rel=\"noopener\">View bundle</a></p>\n",
                    escape_html(&hit.link)
                ));
                html.push_str("</div>\n");
            }
            let sql_block = format!("{}\n\n-- {}", sql, params.join(", "));
            html.push_str(&render_debug(intent, &sql_block));
        }
    }

    html.push_str(PAGE_TAIL);
    html
}

fn render_debug(intent: &Intent, sql: &str) -> String {
    let intent_json = serde_json::to_string_pretty(intent).unwrap_or_default();
    format!(
        "<details>\n<summary>Debug</summary>\n<h3>SQL</h3>\n<pre>{}</pre>\n<h3>Intent</h3>\n<pre>{}</pre>\n</details>\n",
        escape_html(sql),
        escape_html(&intent_json)
    )
}

fn render_error_page(query: &str, message: &str) -> String {
    let mut html = String::from(PAGE_HEAD);
    html.push_str(&render_form(query));
    html.push_str(&format!("<p class=\"error\">{}</p>\n", escape_html(message)));
    html.push_str(PAGE_TAIL);
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchHit;
    use bundle_search_core::intent::{Intent, IntentTarget};
    use bundle_search_core::models::BundleHit;
    use chrono::NaiveDate;

    fn intent(target: IntentTarget) -> Intent {
        Intent {
            target,
            query: "space games".to_string(),
            media_type: None,
            current: false,
        }
    }

    fn hit() -> SearchHit {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        SearchHit {
            bundle: BundleHit {
                machine_name: "space".to_string(),
                author: "Star & Co".to_string(),
                human_name: "Space <Bundle>".to_string(),
                description: "<p>Rockets</p>".to_string(),
                start_date: day.and_hms_opt(0, 0, 0).unwrap(),
                end_date: day.and_hms_opt(0, 0, 0).unwrap(),
                media_type: "game".to_string(),
                url: "/games/space".to_string(),
                distance: 0.5,
            },
            link: "https://www.humblebundle.com/games/space".to_string(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_results() {
        let outcome = SearchOutcome::Results {
            intent: intent(IntentTarget::Bundle),
            sql: "SELECT 1 WHERE a < 3".to_string(),
            params: vec!["$1 = vector(4)".to_string()],
            hits: vec![hit()],
        };
        let html = render_page("space <games>", &outcome);
        assert!(html.contains("value=\"space &lt;games&gt;\""));
        assert!(html.contains("<h2>Space &lt;Bundle&gt;</h2>"));
        assert!(html.contains("by Star &amp; Co"));
        // description is stored HTML
        assert!(html.contains("<p>Rockets</p>"));
        assert!(html.contains("href=\"https://www.humblebundle.com/games/space\""));
        assert!(html.contains("<details>"));
        assert!(html.contains("SELECT 1 WHERE a &lt; 3"));
        assert!(html.contains("&quot;intent&quot;: &quot;bundle&quot;"));
    }

    #[test]
    fn test_render_unsupported_message() {
        let outcome = SearchOutcome::Unsupported {
            intent: intent(IntentTarget::Charity),
            message: "Charity-specific queries are not supported yet".to_string(),
        };
        let html = render_page("charities for kids", &outcome);
        assert!(html.contains("Charity-specific queries are not supported yet"));
        assert!(!html.contains("class=\"card\""));
        assert!(!html.contains("<details>"));
        assert!(!html.contains("&quot;intent&quot;"));
    }

    #[test]
    fn test_render_empty_is_just_the_form() {
        let html = render_page("", &SearchOutcome::Empty);
        assert!(html.contains("<form"));
        assert!(!html.contains("<details>"));
        assert!(!html.contains("No results."));
    }

    #[test]
    fn test_intent_errors_are_bad_requests() {
        let parse_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err = anyhow::Error::new(IntentError::Malformed {
            source: parse_err,
            raw: "nope".to_string(),
        });
        let app = classify_search_error(err);
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.code, "bad_request");

        let app = classify_search_error(anyhow::anyhow!("connection refused"));
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code, "internal");
    }
}
