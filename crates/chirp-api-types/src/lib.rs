//! Shared procedure schema for the Chirp RPC surface.
//!
//! Every remote procedure is a zero-sized marker implementing [`Procedure`],
//! which fixes its path, kind, input and output types at compile time. The
//! server resolves procedures in-process or over HTTP; the client calls them
//! through the same markers so both sides agree on shapes without reflection.

mod models;
pub mod procedures;
mod wire;

pub use models::{Author, Post, PostWithAuthor};
pub use procedures::{Procedure, ProcedureKind};
pub use wire::{FieldErrors, RpcEnvelope, RpcErrorBody, RpcErrorCode, RpcResult};
