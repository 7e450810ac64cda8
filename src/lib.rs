//! Chirp: a server-rendered feed whose pages carry a resumable query-cache
//! snapshot.
//!
//! The server resolves procedures in-process while generating a page,
//! serializes the resulting query cache into the page, and the client adopts
//! that cache instead of refetching. Mutations invalidate the affected query
//! keys and rendered pages.

pub mod application;
pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
