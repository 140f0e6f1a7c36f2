// modsync - keep a dedicated server's workshop mods in sync and run it

pub mod commands;
pub mod error;
pub mod games;
pub mod launch;
pub mod mods;
pub mod paths;
pub mod steam;

pub use error::{SyncError, SyncResult};
