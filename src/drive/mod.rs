// 远程存储模块

pub mod backend;
pub mod client;
pub mod types;

pub use backend::RemoteBackend;
pub use client::DriveClient;
pub use types::*;
