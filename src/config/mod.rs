//! Agent configuration and on-disk layout.
//!
//! The agent reads an optional camelCase JSON file (`update-agent.json`).
//! Lookup order:
//!
//! 1. the path passed with `--config`
//! 2. the file named by `JUBILEE_UPDATE_CONFIG`
//! 3. `update-agent.json` in the data directory
//!
//! A missing file means defaults. The data directory itself comes from the
//! `dataDir` setting, `JUBILEE_UPDATE_DATA_DIR`, or the platform local data
//! directory, and [`AgentPaths`] derives every persisted file from it.

mod agent;
mod paths;

pub use agent::AgentConfig;
pub use paths::AgentPaths;
