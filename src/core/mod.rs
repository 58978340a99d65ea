//! Core infrastructure shared by the runtime and the binary

pub mod error_handling;
pub mod logging;
pub mod shutdown;
pub mod sync;
pub mod threads;
pub mod version;
