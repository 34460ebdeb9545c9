//! レジストリ認証処理
//!
//! ジョブ自身のログインを最優先し、無ければデーモン実行ユーザーの
//! Docker config.json（`auths` または `credsStore` の credential helper）から
//! 認証情報を取得して Bollard の DockerCredentials に変換します。

use crate::engine::RegistryLogin;
use crate::error::{EngineError, EngineResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

const DOCKER_HUB: &str = "docker.io";
/// config.json で Docker Hub の認証情報が保存されうるキー
const DOCKER_HUB_KEYS: [&str; 3] = ["https://index.docker.io/v1/", "index.docker.io", DOCKER_HUB];

/// Docker config.json の構造
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    /// 認証情報 (レジストリ -> AuthEntry)
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// credential helper 名 (例: "osxkeychain", "desktop")
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// レジストリ認証を管理
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
    /// ジョブのログインと一緒に送るサーバーアドレス
    server_address: String,
}

impl RegistryAuth {
    /// 新しい RegistryAuth を作成
    ///
    /// `$DOCKER_CONFIG/config.json`、未設定なら ~/.docker/config.json を使用
    pub fn new(server_address: impl Into<String>) -> Self {
        let config_path = std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            })
            .join("config.json");

        Self::with_config_path(config_path, server_address)
    }

    /// 指定したパスの config.json を使用
    pub fn with_config_path(config_path: PathBuf, server_address: impl Into<String>) -> Self {
        Self {
            config_path,
            server_address: server_address.into(),
        }
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// ジョブのログインをエンジン用の認証情報に変換
    pub fn login_credentials(&self, login: &RegistryLogin) -> DockerCredentials {
        DockerCredentials {
            username: Some(login.username.clone()),
            password: Some(login.password.clone()),
            serveraddress: Some(self.server_address.clone()),
            ..Default::default()
        }
    }

    /// `image` のプッシュに使う認証情報を決定
    ///
    /// `Ok(None)` は認証なしでプッシュすることを意味する
    pub fn resolve(
        &self,
        image: &str,
        login: Option<&RegistryLogin>,
    ) -> EngineResult<Option<DockerCredentials>> {
        // ジョブのログインが最優先
        if let Some(login) = login {
            return Ok(Some(self.login_credentials(login)));
        }
        self.ambient_credentials(image)
    }

    /// config.json から `image` のレジストリの認証情報を取得
    pub fn ambient_credentials(&self, image: &str) -> EngineResult<Option<DockerCredentials>> {
        let registry = extract_registry(image);

        if !self.config_path.exists() {
            tracing::debug!("Docker config.json not found at {:?}", self.config_path);
            return Ok(None);
        }

        let config = self.load_docker_config()?;

        // 1. auths から直接取得
        for key in registry_keys(&registry) {
            if let Some(auth_entry) = config.auths.get(key)
                && let Some(auth_b64) = &auth_entry.auth
                && let Some(creds) = decode_auth(auth_b64, key)?
            {
                tracing::debug!("Found credentials in auths for {}", key);
                return Ok(Some(creds));
            }
        }

        // 2. credential helper から取得
        if let Some(helper) = &config.creds_store {
            tracing::debug!("Trying credential helper: {}", helper);
            for key in registry_keys(&registry) {
                if let Ok(Some(creds)) = self.get_from_helper(helper, key) {
                    return Ok(Some(creds));
                }
            }
        }

        tracing::debug!("No credentials found for {}", registry);
        Ok(None)
    }

    fn load_docker_config(&self) -> EngineResult<DockerConfig> {
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| EngineError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            })?;

        serde_json::from_str(&content).map_err(|e| EngineError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message: format!("Failed to parse config.json: {}", e),
        })
    }

    /// credential helper (docker-credential-*) から認証情報を取得
    fn get_from_helper(&self, helper: &str, registry: &str) -> EngineResult<Option<DockerCredentials>> {
        let helper_cmd = format!("docker-credential-{}", helper);

        let mut child = Command::new(&helper_cmd)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::AuthFailed {
                registry: registry.to_string(),
                message: format!("Failed to run {}: {}", helper_cmd, e),
            })?;

        // レジストリ名を stdin に渡す
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(registry.as_bytes()).ok();
        }

        let output = child
            .wait_with_output()
            .map_err(|e| EngineError::AuthFailed {
                registry: registry.to_string(),
                message: format!("Credential helper failed: {}", e),
            })?;

        if !output.status.success() {
            tracing::debug!(
                "Credential helper returned error for {}: {}",
                registry,
                String::from_utf8_lossy(&output.stderr)
            );
            return Ok(None);
        }

        let response: CredentialResponse =
            serde_json::from_slice(&output.stdout).map_err(|e| EngineError::AuthFailed {
                registry: registry.to_string(),
                message: format!("Failed to parse credential helper response: {}", e),
            })?;

        Ok(Some(DockerCredentials {
            username: Some(response.username),
            password: Some(response.secret),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
    }
}

/// イメージ名からレジストリを抽出
///
/// - `ghcr.io/org/app:tag` -> `ghcr.io`
/// - `alice/app:tag` -> `docker.io`
/// - `localhost:5000/app` -> `localhost:5000`
pub fn extract_registry(image: &str) -> String {
    let parts: Vec<&str> = image.split('/').collect();

    if parts.len() >= 2 {
        let first = parts[0];
        if first.contains('.') || first.contains(':') {
            return first.to_string();
        }
    }

    DOCKER_HUB.to_string()
}

/// レジストリの検索キー。Docker Hub は複数の表記がある
fn registry_keys(registry: &str) -> Vec<&str> {
    if registry == DOCKER_HUB {
        DOCKER_HUB_KEYS.to_vec()
    } else {
        vec![registry]
    }
}

/// Base64 の auth を DockerCredentials にデコード
fn decode_auth(auth_b64: &str, registry: &str) -> EngineResult<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .map_err(|e| EngineError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;

    let auth_str = String::from_utf8(decoded).map_err(|e| EngineError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    Ok(auth_str
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HUB: &str = "https://index.docker.io/v1/";

    #[test]
    fn test_extract_registry_docker_hub() {
        assert_eq!(extract_registry("alice/demo"), "docker.io");
        assert_eq!(extract_registry("alice/demo:latest"), "docker.io");
        assert_eq!(extract_registry("nginx:alpine"), "docker.io");
    }

    #[test]
    fn test_extract_registry_custom_hosts() {
        assert_eq!(extract_registry("ghcr.io/org/app:v1.0"), "ghcr.io");
        assert_eq!(extract_registry("localhost:5000/myapp"), "localhost:5000");
    }

    #[test]
    fn test_job_login_takes_priority() {
        let dir = tempdir().unwrap();
        let auth = RegistryAuth::with_config_path(dir.path().join("config.json"), HUB);

        let creds = auth
            .resolve("alice/demo:latest", Some(&RegistryLogin::new("alice", "s3cret")))
            .unwrap()
            .unwrap();

        assert_eq!(creds.username.as_deref(), Some("alice"));
        assert_eq!(creds.password.as_deref(), Some("s3cret"));
        assert_eq!(creds.serveraddress.as_deref(), Some(HUB));
    }

    #[test]
    fn test_missing_config_means_anonymous_push() {
        let dir = tempdir().unwrap();
        let auth = RegistryAuth::with_config_path(dir.path().join("config.json"), HUB);
        assert!(auth.resolve("alice/demo:latest", None).unwrap().is_none());
    }

    #[test]
    fn test_ambient_docker_hub_credentials() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.json");
        // "ci:token" base64
        std::fs::write(
            &config,
            r#"{"auths":{"https://index.docker.io/v1/":{"auth":"Y2k6dG9rZW4="}}}"#,
        )
        .unwrap();

        let auth = RegistryAuth::with_config_path(config, HUB);
        let creds = auth.resolve("alice/demo:latest", None).unwrap().unwrap();
        assert_eq!(creds.username.as_deref(), Some("ci"));
        assert_eq!(creds.password.as_deref(), Some("token"));
    }

    #[test]
    fn test_malformed_config_is_an_auth_error() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, "not json").unwrap();

        let auth = RegistryAuth::with_config_path(config, HUB);
        assert!(matches!(
            auth.resolve("alice/demo:latest", None),
            Err(EngineError::AuthFailed { .. })
        ));
    }

    #[test]
    fn test_docker_config_env_override() {
        let dir = tempdir().unwrap();
        temp_env::with_var("DOCKER_CONFIG", Some(dir.path()), || {
            let auth = RegistryAuth::new(HUB);
            assert_eq!(auth.config_path, dir.path().join("config.json"));
        });
    }
}
