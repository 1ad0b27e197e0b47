pub mod conductor_config;
pub mod config;
pub mod errors;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod ui;
pub mod util;
