//! Typed inputs for the HTTP endpoints.
//!
//! Request bodies and query strings are deserialized into these before any
//! controller logic runs, so controllers only see well-formed values.

pub(crate) mod broadcast;
pub(crate) mod event_stream;
pub(crate) mod state;
