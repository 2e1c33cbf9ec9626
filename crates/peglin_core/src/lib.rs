//! Decoding, inspection and editing of Peglin save and stats files.
//!
//! The pipeline is: [`type_library`] supplies type metadata, [`graph`]
//! decodes the binary stream into an object graph, [`navigator`] finds
//! sections in it, [`runs`] turns the history section into
//! [`RunRecord`](core_api::RunRecord)s and [`editor`] writes changes back.
//! [`core_api`] wraps all of it behind `Engine` and `Session`.

pub mod core_api;
pub mod editor;
pub mod export;
pub mod graph;
pub mod navigator;
pub mod reader;
pub mod runs;
pub mod type_library;
