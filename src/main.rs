use anyhow::Context;
use chunkdrive::{
    config::LogConfig, logging, AppConfig, ServiceAccountProvider, UploadError, UploaderRegistry,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 默认配置文件路径
const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 配置文件路径，可通过 CHUNKDRIVE_CONFIG 覆盖
fn config_path() -> String {
    std::env::var("CHUNKDRIVE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// 在完整配置加载之前读取日志配置
async fn load_log_config(path: &str) -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path();

    // 🔥 初始化日志系统（必须保持 _log_guard 存活）
    let log_config = load_log_config(&config_path).await;
    let _log_guard = logging::init_logging(&log_config);

    info!("chunkdrive v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(&config_path).await;

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        warn!("没有指定要上传的文件，用法: chunkdrive <文件>...");
        return Ok(());
    }
    if config.accounts.is_empty() {
        anyhow::bail!("配置文件 {} 中没有服务账号", config_path);
    }

    let options = config.upload.to_options();
    let credentials = Arc::new(ServiceAccountProvider::new(
        config.accounts.clone(),
        config.drive.clone(),
        config.retry,
    ));

    let registry = UploaderRegistry::new();
    let identity = config.store.identity();
    let uploader = registry
        .get_or_open(&identity, credentials)
        .with_context(|| format!("打开元数据存储失败: {}", identity))?;

    let mut failed = 0usize;
    for path in &paths {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                error!("打开文件失败: {}, 错误: {}", path, e);
                failed += 1;
                continue;
            }
        };

        match uploader.upload_file(file, &options).await {
            Ok(record) => info!(
                "✓ {} -> file_id={}, type={}, 分片数={}",
                path,
                record.id,
                record.file_type,
                record.chunks.len()
            ),
            Err(UploadError::ChunkSequence {
                orphaned_chunk_ids,
                source,
                ..
            }) if !orphaned_chunk_ids.is_empty() => {
                error!(
                    "上传失败: {}, 错误: {}, 遗留分片: {:?}",
                    path, source, orphaned_chunk_ids
                );
                failed += 1;
            }
            Err(e) => {
                error!("上传失败: {}, 错误: {}", path, e);
                failed += 1;
            }
        }
    }

    registry.close_all().await?;

    if failed > 0 {
        anyhow::bail!("{}/{} 个文件上传失败", failed, paths.len());
    }
    info!("全部 {} 个文件上传完成", paths.len());
    Ok(())
}
