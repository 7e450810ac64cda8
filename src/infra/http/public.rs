use axum::{
    Extension, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{error, warn};

use crate::{
    application::{
        error::ErrorReport,
        identity::Identity,
        pages::{PageGenerator, ProfileOutcome},
    },
    cache::{CachedPage, PageKey, PageSource, RenderedPage},
    presentation::views::{render_feed_page, render_not_found, render_profile_page},
};

use super::HttpState;

const PAGE_SOURCE_HEADER: &str = "x-chirp-page";

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/", get(feed))
        .route("/_health", get(health))
        .fallback(profile)
}

async fn feed(State(state): State<HttpState>, Extension(identity): Extension<Identity>) -> Response {
    let page = state.pages.feed_page(&identity).await;
    match render_feed_page(&page, OffsetDateTime::now_utc()) {
        Ok(html) => {
            let mut response = html.into_response();
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
            response
        }
        Err(err) => err.into_response(),
    }
}

/// Profile pages live at `/@username`; every other unmatched path resolves
/// to a not-found page through the same state machine.
async fn profile(State(state): State<HttpState>, request: Request<Body>) -> Response {
    let path = request.uri().path().trim_end_matches('/').to_string();
    let slug = path.trim_start_matches('/').to_string();

    let generator = state.pages.clone();
    let key = PageKey::new(if path.is_empty() { "/" } else { &path });
    let (page, source) = state
        .page_cache
        .get_or_generate(key, async move { generate_profile(&generator, slug).await })
        .await;

    page_response(page, source)
}

async fn generate_profile(generator: &PageGenerator, slug: String) -> RenderedPage {
    let slug = Some(slug.as_str()).filter(|slug| !slug.is_empty());
    let outcome = match generator.profile_page(slug).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                target = "chirp::http::public",
                error = %err,
                cause = %err.source,
                "Profile generation failed"
            );
            return RenderedPage::uncached(plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unexpected error occurred",
            ));
        }
    };

    match outcome {
        ProfileOutcome::Ready(page) => match render_profile_page(&page, OffsetDateTime::now_utc()) {
            Ok(html) => {
                let rendered = CachedPage {
                    status: StatusCode::OK.as_u16(),
                    body: Bytes::from(html.0),
                    generated_at: OffsetDateTime::now_utc(),
                };
                if page.is_complete() {
                    RenderedPage::cacheable(rendered, page.deps())
                } else {
                    warn!(
                        target = "chirp::http::public",
                        username = %page.payload.props.username,
                        "Serving partially prefetched profile without caching"
                    );
                    RenderedPage::uncached(rendered)
                }
            }
            Err(err) => {
                let response = err.into_response();
                RenderedPage::uncached(plain(response.status(), "Template rendering failed"))
            }
        },
        ProfileOutcome::NotFound(reason) => {
            let body = match render_not_found(&reason) {
                Ok(html) => Bytes::from(html.0),
                Err(_) => Bytes::from_static(b"Not found"),
            };
            RenderedPage::uncached(CachedPage {
                status: StatusCode::NOT_FOUND.as_u16(),
                body,
                generated_at: OffsetDateTime::now_utc(),
            })
        }
    }
}

fn plain(status: StatusCode, message: &'static str) -> CachedPage {
    CachedPage {
        status: status.as_u16(),
        body: Bytes::from_static(message.as_bytes()),
        generated_at: OffsetDateTime::now_utc(),
    }
}

fn page_response(page: CachedPage, source: PageSource) -> Response {
    let status = StatusCode::from_u16(page.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "text/plain; charset=utf-8"
    } else {
        "text/html; charset=utf-8"
    };

    let mut response = Response::new(Body::from(page.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static(content_type),
    );
    headers.insert(
        PAGE_SOURCE_HEADER,
        HeaderValue::from_static(match source {
            PageSource::Cache => "cache",
            PageSource::Generated => "generated",
            PageSource::Joined => "joined",
        }),
    );

    if !status.is_success() {
        ErrorReport::from_message(
            "infra::http::public::profile",
            status,
            "profile page not served",
        )
        .attach(&mut response);
    }
    response
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
