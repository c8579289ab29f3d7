//! Command implementations

pub mod inspect;
pub mod rollout;
pub mod status;
