//! Query modules, one per entity. All functions take `&Connection` and
//! return `streambox_core::Result`.

pub mod media;
pub mod sources;
pub mod subtitles;
pub mod tv;
pub mod users;
pub mod watch;

pub(crate) fn db_err(e: rusqlite::Error) -> streambox_core::Error {
    streambox_core::Error::database(e.to_string())
}
