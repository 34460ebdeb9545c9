//! Docker Engine API による [`ContainerEngine`] の実装

use crate::auth::RegistryAuth;
use crate::context::pack_directory;
use crate::engine::{BuiltImage, ContainerEngine, PushProgress, RegistryLogin};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{BuildInfo, PushImageInfo};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use http_body_util::{Either, Full};
use std::path::Path;

/// ローカルの Docker デーモンと通信するエンジン
///
/// `Docker` は軽量でスレッドセーフなハンドルなので、1つのエンジンを全ワーカーで共有する。
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
    auth: RegistryAuth,
}

impl DockerEngine {
    pub fn new(docker: Docker, auth: RegistryAuth) -> Self {
        Self { docker, auth }
    }

    /// `DOCKER_HOST` またはプラットフォーム既定のソケットで接続
    pub fn connect(auth: RegistryAuth) -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker, auth))
    }

    /// デーモンの応答確認
    pub async fn ping(&self) -> EngineResult<()> {
        self.docker.ping().await?;
        Ok(())
    }

    /// ビルド出力の処理
    fn handle_build_output(output: BuildInfo) -> EngineResult<()> {
        // ビルドステップの出力
        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::debug!("[build] {}", line);
            }
        }

        // エラーが発生した場合
        if let Some(error) = output.error {
            return Err(EngineError::BuildFailed(error));
        }

        // 詳細なエラー情報
        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(EngineError::BuildFailed(error_msg));
        }

        // ステータスメッセージ（pull等）
        if let Some(status) = output.status {
            tracing::debug!("[build] {}", status);
        }

        Ok(())
    }
}

impl From<PushImageInfo> for PushProgress {
    fn from(info: PushImageInfo) -> Self {
        Self {
            status: info.status,
            progress: info.progress,
            error: info.error,
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        reference: &str,
    ) -> EngineResult<BuiltImage> {
        // アーカイブ作成はブロッキング I/O
        let context_dir = context_dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || pack_directory(&context_dir))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile,
            t: reference,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            ..Default::default()
        };

        // ビルドストリームの開始
        let body = Full::new(Bytes::from(archive));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            Self::handle_build_output(msg?)?;
        }

        let image = self.docker.inspect_image(reference).await?;
        Ok(BuiltImage {
            id: image.id.unwrap_or_default(),
            tags: image.repo_tags.unwrap_or_default(),
        })
    }

    /// ログインの事前チェック
    ///
    /// 空のユーザー名・パスワードのみ拒否する。レジストリによる判定は
    /// `push` 時に行われ、拒否はプッシュストリームのエラーレコードとして届く。
    async fn authenticate(&self, login: &RegistryLogin) -> EngineResult<()> {
        if login.username.is_empty() || login.password.is_empty() {
            return Err(EngineError::AuthFailed {
                registry: self.auth.server_address().to_string(),
                message: "username and password are required".to_string(),
            });
        }
        tracing::debug!(
            "Pushing to {} as {}",
            self.auth.server_address(),
            login.username
        );
        Ok(())
    }

    fn push<'a>(
        &'a self,
        reference: &'a str,
        login: Option<&'a RegistryLogin>,
    ) -> BoxStream<'a, EngineResult<PushProgress>> {
        let credentials = match self.auth.resolve(reference, login) {
            Ok(credentials) => credentials,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        // プッシュオプション（タグは別指定）
        let (image, tag) = split_image_tag(reference);

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        #[allow(deprecated)]
        let pushed = self.docker.push_image(image, Some(options), credentials);
        pushed
            .map(|item| item.map(PushProgress::from).map_err(EngineError::from))
            .boxed()
    }
}

/// イメージ名とタグを分離
///
/// 末尾の `:port` はレジストリの一部として扱う。
///
/// - `alice/app:v1.0` -> `("alice/app", "v1.0")`
/// - `alice/app` -> `("alice/app", "latest")`
/// - `localhost:5000/app` -> `("localhost:5000/app", "latest")`
pub fn split_image_tag(image: &str) -> (&str, &str) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit()) {
            return (potential_image, potential_tag);
        }
    }

    (image, dockhand_core::DEFAULT_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildContext;
    use dockhand_core::JobDescriptor;
    use std::collections::BTreeMap;

    #[test]
    fn test_split_image_tag() {
        assert_eq!(
            split_image_tag("alice/demo:latest"),
            ("alice/demo", "latest")
        );
        assert_eq!(
            split_image_tag("alice/demo"),
            ("alice/demo", "latest")
        );
        assert_eq!(
            split_image_tag("localhost:5000/app"),
            ("localhost:5000/app", "latest")
        );
        assert_eq!(
            split_image_tag("localhost:5000/app:dev"),
            ("localhost:5000/app", "dev")
        );
    }

    #[test]
    fn test_build_error_records_fail_the_build() {
        let output = BuildInfo {
            error: Some("failed to solve: no such file".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            DockerEngine::handle_build_output(output),
            Err(EngineError::BuildFailed(message)) if message.contains("no such file")
        ));

        let output = BuildInfo {
            stream: Some("Step 1/1 : FROM scratch\n".to_string()),
            ..Default::default()
        };
        assert!(DockerEngine::handle_build_output(output).is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_incomplete_login() {
        // 接続は遅延されるのでデーモン不要
        let engine = DockerEngine::connect(RegistryAuth::new("https://index.docker.io/v1/")).unwrap();

        assert!(matches!(
            engine.authenticate(&RegistryLogin::new("alice", "")).await,
            Err(EngineError::AuthFailed { registry, .. }) if registry == "https://index.docker.io/v1/"
        ));
        assert!(engine.authenticate(&RegistryLogin::new("", "s3cret")).await.is_err());
        assert!(engine.authenticate(&RegistryLogin::new("alice", "s3cret")).await.is_ok());
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_build_simple_image() {
        let engine = DockerEngine::connect(RegistryAuth::new("https://index.docker.io/v1/")).unwrap();

        let descriptor = JobDescriptor::new(
            "dockhand",
            "smoke",
            Some("test"),
            b"FROM alpine:latest\nCMD echo 'test'".to_vec(),
            BTreeMap::new(),
            None,
        )
        .unwrap();
        let context = BuildContext::materialize(&descriptor, None).unwrap();

        let image = engine
            .build_image(context.path(), context.dockerfile(), "dockhand/smoke:test")
            .await
            .unwrap();
        assert!(image.tags.contains(&"dockhand/smoke:test".to_string()));

        engine
            .docker
            .remove_image(
                "dockhand/smoke:test",
                None::<bollard::query_parameters::RemoveImageOptions>,
                None,
            )
            .await
            .ok();
    }
}
