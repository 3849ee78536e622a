// ============================================================================
// [总线] 程序的组装车间
// ✅ 只能做：pub mod 暴露子模块、提供 run() 入口
// ⛔ 禁止：直接实现构建逻辑
// ============================================================================

pub mod commands;
pub mod models;
pub mod services;
pub mod utils;

use std::process::ExitCode;

pub use commands::build::build;
pub use models::dtos::{BuildRequest, BuildResult};
pub use services::layout::InstallLayout;
pub use services::packager::{NodePackager, Packager, PackagerConfig};
pub use utils::error::{AppError, AppResult};

// ============================================================================
// 应用入口
// ============================================================================

pub fn run() -> ExitCode {
    commands::cli::run(std::env::args().collect())
}
