use jfsync_lib::logging::init_logging;
use jfsync_lib::AppConfig;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() {
    // 配置文件路径可由首个参数指定，默认当前目录下的 config.json
    let config_file = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    let config = match AppConfig::load(&config_file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("加载配置失败: {:#}", e);
            std::process::exit(1);
        }
    };

    // guard 持有到进程结束，保证文件日志完整落盘
    let _guard = init_logging(&config.log);

    let report = match jfsync_lib::sync_directory(
        &config,
        &config.remote_path,
        Path::new(&config.local_path),
        &config.ignore,
    )
    .await
    {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("同步无法启动: {:#}", e);
            std::process::exit(1);
        }
    };

    if report.first_error.is_some() {
        std::process::exit(1);
    }
}
