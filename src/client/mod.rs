//! Terminal client runtime.
//!
//! Stands in for the browser: fetches a rendered page, resumes the query
//! cache from the payload it carries, and talks to the server over the wire
//! procedure endpoint afterwards.

mod app;
mod composer;
mod transport;

pub use app::{BootError, ClientApp};
pub use composer::{GENERIC_FAILURE, Notification, PostComposer, SubmitOutcome};
pub use transport::{HttpTransport, TransportError};
