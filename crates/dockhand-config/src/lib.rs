//! dockhand デーモンの設定
//!
//! 設定は全フィールド省略可能な YAML ファイルから読み込む。
//! 以下の優先順位で設定ファイルを検索:
//! 1. 明示的なパス (デーモンの `--config` フラグ)
//! 2. 環境変数 DOCKHAND_CONFIG_PATH
//! 3. カレントディレクトリ: dockhand.yaml, .dockhand.yaml
//! 4. ~/.config/dockhand/config.yaml (グローバル設定)
//!
//! どれも無ければデフォルト値を使用する。

pub mod error;

pub use error::*;

use dockhand_core::DEFAULT_REGISTRY_URL_TEMPLATE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "DOCKHAND_CONFIG_PATH";

const LOCAL_CANDIDATES: [&str; 2] = ["dockhand.yaml", ".dockhand.yaml"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// HTTP サーバーの待ち受けアドレス
    pub listen: SocketAddr,
    /// 並列ビルド数
    pub workers: usize,
    /// ワーカー待ちのジョブ数上限。超えると投入は 503
    pub queue_capacity: usize,
    /// ビルド・プッシュ各フェーズの制限時間
    pub phase_timeout_secs: u64,
    /// 完了したジョブを照会できる期間
    pub result_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// 受け付けるリクエストボディの最大サイズ
    pub max_upload_bytes: usize,
    /// `{owner}` と `{repository}` を含むこと。デーモン起動時にチェックされる
    pub registry_url_template: String,
    /// ジョブごとのレジストリログインと一緒に送るサーバーアドレス
    pub registry_server: String,
    /// ジョブごとのビルドディレクトリの親。未設定ならシステムの一時ディレクトリ
    pub context_root: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8000)),
            workers: 4,
            queue_capacity: 64,
            phase_timeout_secs: 30 * 60,
            result_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
            max_upload_bytes: 64 * 1024 * 1024,
            registry_url_template: DEFAULT_REGISTRY_URL_TEMPLATE.to_string(),
            registry_server: "https://index.docker.io/v1/".to_string(),
            context_root: None,
        }
    }
}

impl DaemonConfig {
    /// YAML をパース。`origin` はエラー表示にのみ使う
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self> {
        // 空ファイルは全てデフォルトの設定として扱う
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content, path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.phase_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "phase_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// dockhand の設定ディレクトリ (~/.config/dockhand) を取得
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("dockhand"))
}

/// 設定ファイルを探す。見つからなければ `None`
pub fn find_config_file() -> Option<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("{} points at missing file {}", CONFIG_PATH_ENV, path.display());
    }

    // 2. カレントディレクトリで検索
    if let Ok(current_dir) = std::env::current_dir() {
        for filename in &LOCAL_CANDIDATES {
            let path = current_dir.join(filename);
            if path.exists() {
                return Some(path);
            }
        }
    }

    // 3. グローバル設定ファイル (~/.config/dockhand/config.yaml)
    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("config.yaml");
        if global_config.exists() {
            return Some(global_config);
        }
    }

    None
}

/// デーモン設定を読み込む
///
/// 明示的なパスは存在必須。それ以外は検索で見つかったファイル、
/// 無ければデフォルト値を使う。
pub fn load(explicit: Option<&Path>) -> Result<DaemonConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    match path {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            DaemonConfig::from_file(&path)
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(DaemonConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = f();
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.listen.to_string(), "127.0.0.1:8000");
        assert_eq!(config.workers, 4);
        assert_eq!(config.phase_timeout(), Duration::from_secs(1800));
        assert!(config.context_root.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = DaemonConfig::from_yaml(
            "listen: 0.0.0.0:9000\nworkers: 8\ncontext_root: /var/lib/dockhand\n",
            Path::new("test.yaml"),
        )
        .unwrap();

        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.workers, 8);
        assert_eq!(config.context_root, Some(PathBuf::from("/var/lib/dockhand")));
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.result_ttl_secs, 86400);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = DaemonConfig::from_yaml("\n", Path::new("empty.yaml")).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let result = DaemonConfig::from_yaml("workers: 0", Path::new("test.yaml"));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_template_default_and_override() {
        assert_eq!(
            DaemonConfig::default().registry_url_template,
            DEFAULT_REGISTRY_URL_TEMPLATE
        );

        let config = DaemonConfig::from_yaml(
            "registry_url_template: https://registry.example.com/{owner}/{repository}",
            Path::new("test.yaml"),
        )
        .unwrap();
        assert_eq!(
            config.registry_url_template,
            "https://registry.example.com/{owner}/{repository}"
        );
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let result = DaemonConfig::from_yaml("wokers: 2", Path::new("typo.yaml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_explicit_missing_path_is_a_read_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = load(Some(&temp_dir.path().join("nope.yaml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(".dockhand.yaml"), "workers: 2").unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = in_dir(temp_dir.path(), find_config_file).unwrap();
            assert!(found.ends_with(".dockhand.yaml"));

            let config = in_dir(temp_dir.path(), || load(None)).unwrap();
            assert_eq!(config.workers, 2);
        });
    }

    #[test]
    #[serial]
    fn test_visible_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        // dockhand.yaml と .dockhand.yaml の両方を作成
        fs::write(temp_dir.path().join("dockhand.yaml"), "workers: 3").unwrap();
        fs::write(temp_dir.path().join(".dockhand.yaml"), "workers: 5").unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = in_dir(temp_dir.path(), find_config_file).unwrap();
            assert!(found.ends_with("dockhand.yaml"));
            assert!(!found.ends_with(".dockhand.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_env_var_wins_over_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("dockhand.yaml"), "workers: 3").unwrap();
        let custom = temp_dir.path().join("custom.yaml");
        fs::write(&custom, "workers: 7").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(&custom), || {
            let config = in_dir(temp_dir.path(), || load(None)).unwrap();
            assert_eq!(config.workers, 7);
        });
    }

    #[test]
    #[serial]
    fn test_explicit_path_wins_over_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let from_env = temp_dir.path().join("env.yaml");
        let explicit = temp_dir.path().join("explicit.yaml");
        fs::write(&from_env, "workers: 7").unwrap();
        fs::write(&explicit, "workers: 9").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(&from_env), || {
            assert_eq!(load(Some(&explicit)).unwrap().workers, 9);
        });
    }

    #[test]
    fn test_config_dir_name() {
        if let Ok(dir) = get_config_dir() {
            assert!(dir.ends_with("dockhand"));
        }
    }
}
