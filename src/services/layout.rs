// ============================================================================
// 安装目录布局：共享 node_modules 与引擎缓存所在的根目录
// ============================================================================

use std::path::{Path, PathBuf};

use crate::services::APP_RESOURCES_DIR;
use crate::utils::error::AppResult;

/// 环境变量：覆盖安装根目录
pub const HOME_ENV: &str = "NATIVEFIER_GHOSTERY_HOME";

/// 本工具的安装布局
///
/// 注入代码所需的 npm 包、nativefier 本身、以及过滤引擎缓存文件都位于这里，
/// 与具体某次构建的输出目录无关，多次构建共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 解析安装根目录：显式参数 > 可执行文件所在目录
    ///
    /// 环境变量 `NATIVEFIER_GHOSTERY_HOME` 由 CLI 层通过 clap 的 env 回退合并到 `explicit`。
    pub fn resolve(explicit: Option<&Path>) -> AppResult<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }
        let exe = std::env::current_exe()?;
        let root = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 共享依赖仓库：`<root>/node_modules`
    pub fn node_modules(&self) -> PathBuf {
        self.root.join("node_modules")
    }
}

/// 应用私有依赖目录：`<app>/resources/app/node_modules`
pub fn app_node_modules(app_path: &Path) -> PathBuf {
    let mut dir = app_path.to_path_buf();
    for part in APP_RESOURCES_DIR {
        dir.push(part);
    }
    dir.push("node_modules");
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_root_wins() {
        let layout = InstallLayout::resolve(Some(Path::new("/opt/tool"))).unwrap();
        assert_eq!(layout.root(), Path::new("/opt/tool"));
        assert_eq!(layout.node_modules(), Path::new("/opt/tool").join("node_modules"));
    }

    #[test]
    fn test_fallback_root_is_exe_dir() {
        let layout = InstallLayout::resolve(None).unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(layout.root(), exe.parent().unwrap());
    }

    #[test]
    fn test_app_node_modules_path() {
        let dest = app_node_modules(Path::new("out/Demo-linux-x64"));
        assert_eq!(
            dest,
            Path::new("out/Demo-linux-x64")
                .join("resources")
                .join("app")
                .join("node_modules")
        );
    }
}
