//! Periodic observation of published catalogs: extraction of canonical
//! records, structural change detection and an append-only change archive.

pub mod alert;
pub mod catalog;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod store;
