//! Deployment module

pub mod event;
pub mod gate;
pub mod outcome;
pub mod script;
pub mod signature;
