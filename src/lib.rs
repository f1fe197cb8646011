pub mod bedrock;
pub mod config;
pub mod converse;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod server;
pub mod translate;

pub use bedrock::BedrockConverseClient;
pub use config::GatewayConfig;
pub use converse::ConverseClient;
pub use error::{BackendError, GatewayError, Result};
pub use gateway::Gateway;
pub use logging::SharedRequestLog;
pub use models::ModelResolver;
pub use server::{build_router, AppState};
