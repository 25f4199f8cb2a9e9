// 账号池模块
//
// - Account: 单个配额受限的远程身份，缓存配额快照
// - AccountPool: 账号集合 + 懒加载 + 按可用空间选号
// - CredentialsProvider: 池为空时的账号来源

pub mod account;
pub mod credentials;
pub mod manager;

pub use account::Account;
pub use credentials::{CredentialsProvider, ServiceAccountProvider};
pub use manager::AccountPool;
