pub mod build;
pub mod config_cmd;
pub mod handoff;
pub mod session;
pub mod tokens;
