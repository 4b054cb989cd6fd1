//! streambox-db: SQLite persistence for the media library.
//!
//! Layout follows a pool/migrations/models/queries split:
//! - [`pool`] — r2d2 connection pooling with foreign keys enabled
//! - [`migrations`] — embedded SQL migrations, applied at boot
//! - [`models`] — row structs with `from_row` constructors
//! - [`queries`] — free functions over `&Connection`, one module per entity

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
