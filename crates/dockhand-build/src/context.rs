//! ビルドコンテキスト処理
//!
//! ジョブごとの一時ディレクトリに Dockerfile と補助ファイルを書き出します。

use crate::error::{BuildError, BuildResult};
use dockhand_core::names::{check_file_name, is_reserved_file_name};
use dockhand_core::{DOCKERFILE_NAME, JobDescriptor};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::path::Path;
use tar::Builder;
use tempfile::TempDir;

const DIR_PREFIX: &str = "dockhand-";
const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

/// 1ジョブ分の Dockerfile と補助ファイルを保持する専用ディレクトリ
///
/// drop 時にディレクトリごと削除される。フェーズの終わり方は問わない。
#[derive(Debug)]
pub struct BuildContext {
    dir: TempDir,
}

impl BuildContext {
    /// ジョブのファイルを `root` 配下の新しいディレクトリに書き出す
    ///
    /// `root` が未指定ならシステムの一時ディレクトリを使用
    pub fn materialize(descriptor: &JobDescriptor, root: Option<&Path>) -> BuildResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        // Dockerfileを "Dockerfile" として書き出し
        fs::write(
            dir.path().join(DOCKERFILE_NAME),
            descriptor.dockerfile().as_bytes(),
        )?;

        for (name, contents) in descriptor.auxiliary_files() {
            write_entry(dir.path(), name, contents.as_bytes())?;
        }

        tracing::debug!(
            "Materialized build context for {} at {} ({} auxiliary files)",
            descriptor.image_reference(),
            dir.path().display(),
            descriptor.auxiliary_files().len()
        );

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// コンテキスト内の Dockerfile 名
    pub fn dockerfile(&self) -> &'static str {
        DOCKERFILE_NAME
    }

    /// コンテキストをtar.gzアーカイブとして作成
    pub fn archive(&self) -> std::io::Result<Vec<u8>> {
        pack_directory(self.path())
    }
}

/// 補助ファイルを `dir` 直下に書き出す
fn write_entry(dir: &Path, name: &str, contents: &[u8]) -> BuildResult<()> {
    check_file_name(name).map_err(|reason| BuildError::InvalidFileName {
        name: name.to_string(),
        reason,
    })?;
    // Dockerfile を上書きさせない
    if is_reserved_file_name(name) {
        return Err(BuildError::InvalidFileName {
            name: name.to_string(),
            reason: "collides with the Dockerfile",
        });
    }

    fs::write(dir.join(name), contents)?;
    Ok(())
}

/// Docker ビルド API に渡す tar.gz アーカイブを作成
pub fn pack_directory(context_path: &Path) -> std::io::Result<Vec<u8>> {
    tracing::debug!("Creating build context from: {}", context_path.display());

    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);
        // コンテキストディレクトリを再帰的に追加
        tar.append_dir_all(".", context_path)?;
        tar.into_inner()?.finish()?;
    }

    tracing::debug!("Build context created: {} bytes", archive_data.len());

    // コンテキストサイズの警告
    if archive_data.len() > MAX_CONTEXT_SIZE {
        tracing::warn!(
            "Build context is large ({}MB); consider trimming the uploaded files",
            archive_data.len() / 1024 / 1024
        );
    }

    Ok(archive_data)
}
