// ============================================================================
// 过滤引擎缓存：由规则来源 + 广告拦截库版本推导 key，版本变化即失效
// ============================================================================

use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::services::layout::InstallLayout;
use crate::services::FILTER_LIST_SOURCE;
use crate::utils::error::AppResult;

/// 缓存文件名前缀
const CACHE_FILE_PREFIX: &str = "ghostery-engine-";

/// 拦截库 package.json（相对于共享 node_modules）
const BLOCKER_PACKAGE_JSON: &[&str] = &["@ghostery", "adblocker-electron", "package.json"];

/// package.json 中只关心 version 字段
#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

/// 编译后的过滤引擎在磁盘上的缓存位置
///
/// 缓存文件由打包后的应用在运行时读写，构建阶段只负责把路径写进注入代码，
/// 并在 key 变化后清理旧文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCache {
    key: String,
    path: PathBuf,
}

impl EngineCache {
    /// 根据安装布局解析缓存位置
    pub fn resolve(layout: &InstallLayout) -> Self {
        let version = read_blocker_version(&layout.node_modules());
        let key = cache_key(FILTER_LIST_SOURCE, &version);
        let path = layout
            .root()
            .join(format!("{}{}.bin", CACHE_FILE_PREFIX, key));
        Self { key, path }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 删除同目录下 key 不同的旧缓存文件，返回被删除的路径
    pub fn prune_stale(&self) -> AppResult<Vec<PathBuf>> {
        let dir = match self.path.parent() {
            Some(dir) if dir.is_dir() => dir,
            _ => return Ok(Vec::new()),
        };
        let mut removed = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_cache_file_name(&name) || entry.path() == self.path {
                continue;
            }
            std::fs::remove_file(entry.path())?;
            log::info!("[Cache] 已清理过期引擎缓存：{}", entry.path().display());
            removed.push(entry.path());
        }

        removed.sort();
        Ok(removed)
    }
}

/// sha256("<source>@<version>") 的前 16 位十六进制
fn cache_key(source: &str, version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"@");
    hasher.update(version.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// 形如 `ghostery-engine-<16 位十六进制>.bin` 的文件名
fn is_cache_file_name(name: &str) -> bool {
    name.strip_prefix(CACHE_FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(".bin"))
        .map(|key| key.len() == 16 && key.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// 读取共享仓库中拦截库的版本号，读不到时为 "unknown"
fn read_blocker_version(node_modules: &Path) -> String {
    let mut manifest_path = node_modules.to_path_buf();
    for part in BLOCKER_PACKAGE_JSON {
        manifest_path.push(part);
    }

    let version = std::fs::read_to_string(&manifest_path)
        .ok()
        .and_then(|raw| serde_json::from_str::<PackageManifest>(&raw).ok())
        .and_then(|manifest| manifest.version);

    match version {
        Some(v) => v,
        None => {
            log::debug!(
                "[Cache] 未能读取 {}，缓存 key 使用 unknown 版本",
                manifest_path.display()
            );
            "unknown".to_string()
        }
    }
}
