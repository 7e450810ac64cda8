mod middleware;
mod public;
mod rpc;

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware};

use crate::application::{
    identity::IdentityProvider, pages::PageGenerator, procedures::ProcedureRouter,
};
use crate::cache::{InvalidationCoordinator, PageCache};

pub use middleware::RequestContext;

/// Shared state of every route.
#[derive(Clone)]
pub struct HttpState {
    pub pages: Arc<PageGenerator>,
    pub page_cache: Arc<PageCache>,
    pub procedures: Arc<ProcedureRouter>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Applied after each successful mutation served over the wire.
    pub coordinator: InvalidationCoordinator,
}

impl HttpState {
    pub fn new(
        pages: Arc<PageGenerator>,
        page_cache: Arc<PageCache>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let coordinator = InvalidationCoordinator::new().with_target(page_cache.clone());
        Self {
            procedures: pages.router().clone(),
            pages,
            page_cache,
            identity,
            coordinator,
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .merge(public::routes())
        .merge(rpc::routes())
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_identity,
        ))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}
