//! Material preparation daemon: collaborator clients, the pipeline
//! controller, composition polling and the HTTP API.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod keywords;
pub mod llm;
pub mod materials;
pub mod pipeline;
pub mod render;
pub mod sessions;
pub mod speech;
pub mod stock;

pub use config::DaemonConfig;
pub use error::{PrepError, PrepResult};
pub use pipeline::{PipelineController, PipelineEvent, PipelineSnapshot, PrepareRequest, Providers};
pub use sessions::SessionRegistry;
