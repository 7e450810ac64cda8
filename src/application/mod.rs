//! Application services: procedures, page generation, and the typed client.

pub mod error;
pub mod identity;
pub mod pages;
pub mod procedures;
pub mod rate_limit;
pub mod repos;
pub mod rpc;
