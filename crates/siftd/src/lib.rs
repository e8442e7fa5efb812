pub mod api;
pub mod classify;
pub mod cli;
pub mod daemon;
pub mod logging;
pub mod report;
pub mod snapshot;
