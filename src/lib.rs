pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::Cli;
pub use config::EtlConfig;

pub use adapters::storage::{AdlsStorage, LocalStorage};
pub use app::pipelines::vidclub_to_adls::VidClubToAdls;
pub use core::etl::EtlEngine;
pub use domain::model::{Frame, IfEmpty};
pub use utils::error::{EtlError, Result};
