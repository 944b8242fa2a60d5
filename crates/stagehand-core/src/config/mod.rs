//! Configuration for a stagehand workspace
//!
//! A single `stagehand.toml` at the workspace root describes the project,
//! vault access, CI fallback, remote bootstrap and the deployment
//! environments of the remote stages.

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_stagehand_toml, parse_stagehand_toml_str, to_toml};
pub use paths::{CONFIG_FILE_NAME, STATE_DIR_NAME};
pub use schema::{
    BootstrapConfig, CiConfig, EnvironmentConfig, ExecutionConfig, ProjectConfig,
    StagehandConfig, VaultConfig,
};
pub use store::ConfigStore;
