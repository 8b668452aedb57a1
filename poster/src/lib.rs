//! Single-sender publishing backend.
//!
//! Posts arrive as signed form submissions from one allowed sender, their
//! media is moved to an external host, and the result is stored and served
//! back as paginated HTML.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod form;
pub mod limit;
pub mod media;
pub mod model;
pub mod pagination;
pub mod render;
pub mod store;
