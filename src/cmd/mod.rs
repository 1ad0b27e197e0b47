//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                                  |
//! |-----------|-------------------------------------------------------------------|
//! | `run`     | `Start`, `Resume`                                                 |
//! | `job`     | `Status`, `Validate`, `Phase`, `Agent`, `Subphase`, `Metric`, `Platform`, `Error`, `Complete` |
//! | `project` | `Init`, `Templates`                                               |
//! | `config`  | `Config`                                                          |

pub mod config;
pub mod job;
pub mod project;
pub mod run;

pub use config::cmd_config;
pub use job::{
    cmd_agent, cmd_complete, cmd_error, cmd_metric, cmd_phase, cmd_platform, cmd_status,
    cmd_subphase, cmd_validate,
};
pub use project::{cmd_init, cmd_templates};
pub use run::{cmd_resume, cmd_start};
