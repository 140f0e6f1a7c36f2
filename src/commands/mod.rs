pub mod games;
pub mod server;
