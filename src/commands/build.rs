// ============================================================================
// 构建编排
// 负责：参数预检 → 打包 → 注入 → 复制依赖，任一步失败立即中止
// ============================================================================

use crate::models::dtos::{BuildRequest, BuildResult};
use crate::services::injector;
use crate::services::layout::InstallLayout;
use crate::services::materializer;
use crate::services::packager::{Packager, PackagerConfig};
use crate::services::MODULES_TO_COPY;
use crate::utils::error::{AppError, AppResult};

/// 预检：targetUrl、appName、outputDir 均不能为空
pub fn validate_build_request(request: &BuildRequest) -> AppResult<()> {
    let mut missing = Vec::new();
    if request.target_url.trim().is_empty() {
        missing.push("targetUrl");
    }
    if request.app_name.trim().is_empty() {
        missing.push("appName");
    }
    if request.output_dir.as_os_str().is_empty() {
        missing.push("outputDir");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::MissingRequiredField(missing.join(", ")))
    }
}

/// 构建应用并注入广告拦截
///
/// 预检在任何外部调用之前完成。之后依次执行打包、入口文件注入、依赖复制，
/// 每一步的错误原样向上返回，不做部分修复。
pub fn build(
    request: &BuildRequest,
    packager: &dyn Packager,
    layout: &InstallLayout,
) -> AppResult<BuildResult> {
    log::info!(
        "[Build] 开始构建 {} - 应用名称：{}",
        request.target_url,
        request.app_name
    );

    validate_build_request(request)?;

    run_pipeline(request, packager, layout).map_err(|e| {
        log::error!("[Build] 构建失败：{}", e);
        e
    })
}

fn run_pipeline(
    request: &BuildRequest,
    packager: &dyn Packager,
    layout: &InstallLayout,
) -> AppResult<BuildResult> {
    // 1. 合并配置并打包
    let config = PackagerConfig::from_request(request);
    let app_path = packager.package(&config)?;

    // 2. 注入入口文件
    log::info!("[Build] 开始注入代码...");
    let injected = injector::inject_code(&app_path, layout)?;

    // 3. 复制依赖
    log::info!("[Build] 开始复制依赖...");
    let copied =
        materializer::copy_required_modules(&layout.node_modules(), &app_path, MODULES_TO_COPY)?;

    log::info!(
        "[Build] {} 构建完成，应用位于：{}",
        request.app_name,
        app_path.display()
    );

    Ok(BuildResult {
        app_path,
        entry_script: injected.entry_script,
        anchor: injected.anchor.marker.to_string(),
        copied_modules: copied.copied,
        missing_modules: copied.missing,
    })
}

// ============================================================================
// 单元测试
// ============================================================================
