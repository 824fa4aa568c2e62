//! Webhook Receiver Library
//!
//! Authenticates signed push notifications and runs a deployment script for
//! pushes to the primary branch.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod server;
pub mod storage;
pub mod utils;
