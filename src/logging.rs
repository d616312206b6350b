use crate::config::LogConfig;
use crate::core::PayError;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/**
 * 安装全局的 tracing subscriber
 * 配置了 file 时写入文件 (追加), 否则输出到 stdout
 * 已经有全局 subscriber 时什么都不做
 */
pub fn init(config: &LogConfig) -> Result<(), PayError> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.file.as_deref() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| PayError::InvalidConfig(format!("error opening log file {}: {}", path, e)))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()
        }
        None => registry.with(fmt::layer()).try_init(),
    };
    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_noop() {
        let path = std::env::temp_dir().join(format!("gateway_pay_{}.log", std::process::id()));
        let config = LogConfig {
            level: "debug".into(),
            file: Some(path.to_string_lossy().to_string()),
        };
        assert!(init(&config).is_ok());
        assert!(init(&LogConfig::default()).is_ok());
        assert!(path.exists());
        std::fs::remove_file(&path).ok();

        let bad = LogConfig {
            level: "warn".into(),
            file: Some("/nonexistent/dir/pay.log".into()),
        };
        assert!(matches!(init(&bad), Err(PayError::InvalidConfig(_))));
    }
}
