// ============================================================================
// 依赖复制服务：把注入代码需要的 npm 包复制进应用私有 node_modules
// 纯 Rust 函数，方便单元测试
// ============================================================================

use std::path::Path;

use crate::services::layout::app_node_modules;
use crate::utils::error::{AppError, AppResult};

/// 复制结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// 成功复制的包
    pub copied: Vec<String>,
    /// 源仓库中不存在、已跳过的包
    pub missing: Vec<String>,
}

/// 将白名单中的包从共享仓库复制到应用的 `resources/app/node_modules`
///
/// 源中不存在的包只记警告并跳过；已存在的包复制失败则整体失败。
/// 按列表顺序逐个复制。
pub fn copy_required_modules(
    source_node_modules: &Path,
    app_path: &Path,
    modules: &[&str],
) -> AppResult<MaterializeReport> {
    log::info!("[Copy] 开始复制依赖到应用目录...");

    let dest_node_modules = app_node_modules(app_path);
    std::fs::create_dir_all(&dest_node_modules).map_err(|e| AppError::CopyFailure {
        module: "node_modules".to_string(),
        message: format!("无法创建目录 {}: {}", dest_node_modules.display(), e),
    })?;

    let mut report = MaterializeReport::default();

    for &module_name in modules {
        let source = source_node_modules.join(module_name);
        let dest = dest_node_modules.join(module_name);

        if !source.exists() {
            log::warn!(
                "[Copy] 警告：{} 中不存在模块 {}，跳过复制",
                source_node_modules.display(),
                module_name
            );
            report.missing.push(module_name.to_string());
            continue;
        }

        log::info!("[Copy] 复制 {}...", module_name);
        copy_dir_recursive(&source, &dest)?;
        report.copied.push(module_name.to_string());
    }

    log::info!(
        "[Copy] 依赖复制完成：复制 {} 个，跳过 {} 个",
        report.copied.len(),
        report.missing.len()
    );

    Ok(report)
}

/// 复制失败统一归到源目录对应的模块名下
fn copy_failure(src: &Path, message: String) -> AppError {
    let module = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| src.display().to_string());
    AppError::CopyFailure { module, message }
}

/// 递归复制目录及其所有内容到目标路径，已存在的文件被覆盖
///
/// 符号链接在 Unix 上按链接重建，其他平台复制链接指向的内容。
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> AppResult<()> {
    std::fs::create_dir_all(dst)
        .map_err(|e| copy_failure(src, format!("无法创建目录 {}: {}", dst.display(), e)))?;

    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| copy_failure(src, format!("遍历目录失败: {}", e)))?;

        // 计算相对路径并拼接到目标路径
        let relative_path = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| copy_failure(src, format!("路径处理失败: {}", e)))?;
        let target_path = dst.join(relative_path);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target_path).map_err(|e| {
                copy_failure(src, format!("无法创建目录 {}: {}", target_path.display(), e))
            })?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target_path)
                .map_err(|message| copy_failure(src, message))?;
        } else {
            std::fs::copy(entry.path(), &target_path).map_err(|e| {
                copy_failure(
                    src,
                    format!(
                        "无法复制 {} 到 {}: {}",
                        entry.path().display(),
                        target_path.display(),
                        e
                    ),
                )
            })?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), String> {
    let target = std::fs::read_link(src)
        .map_err(|e| format!("读取链接 {} 失败: {}", src.display(), e))?;
    if dst.symlink_metadata().is_ok() {
        std::fs::remove_file(dst)
            .map_err(|e| format!("无法覆盖 {}: {}", dst.display(), e))?;
    }
    std::os::unix::fs::symlink(&target, dst)
        .map_err(|e| format!("无法创建链接 {}: {}", dst.display(), e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), String> {
    if src.is_dir() {
        let resolved = std::fs::canonicalize(src).map_err(|e| e.to_string())?;
        return copy_dir_recursive(&resolved, dst).map_err(|e| e.to_string());
    }
    std::fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| format!("无法复制 {} 到 {}: {}", src.display(), dst.display(), e))
}

// ============================================================================
// 单元测试
// ============================================================================
