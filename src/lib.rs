//! Working-day Gantt scheduling.
//!
//! The engine (`calendar`, `timeline`, `highlight`, `ledger`, `interaction`,
//! `projection`) is pure and renderer-agnostic. `ui` and `document` are the
//! two renderers; `storage`, `schedules`, `config` and `logging` wire the
//! binary together.

pub mod calendar;
pub mod config;
pub mod document;
pub mod domain;
pub mod error;
pub mod highlight;
pub mod interaction;
pub mod ledger;
pub mod logging;
pub mod projection;
pub mod schedules;
pub mod storage;
pub mod timeline;
pub mod ui;
