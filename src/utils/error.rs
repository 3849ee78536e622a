// ============================================================================
// 统一错误类型定义
// 使用 thiserror 派生宏，每个构建阶段对应一类错误
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// 应用统一错误枚举
///
/// 构建流水线中任一阶段失败都会返回对应变体，由编排层原样向上传递，
/// 最终由 CLI 打印并以非零退出码结束。
#[derive(Debug, Error)]
pub enum AppError {
    /// 预检失败：targetUrl / appName / outputDir 为空
    #[error("缺少必填参数：{0}")]
    MissingRequiredField(String),

    /// 外部打包库（nativefier）报错，内容原样透传
    #[error("Nativefier 打包失败：{0}")]
    PackagerFailure(String),

    /// 所有候选位置都找不到主进程入口文件
    #[error("未找到入口文件：{} 下的候选路径均不存在", .0.display())]
    EntryScriptNotFound(PathBuf),

    /// 入口文件中既没有主锚点也没有备用锚点
    #[error("未找到注入锚点：{}", .0.display())]
    InjectionAnchorNotFound(PathBuf),

    /// 复制已存在的依赖包时发生 IO 错误
    #[error("复制依赖 {module} 失败：{message}")]
    CopyFailure { module: String, message: String },

    /// 文件系统 IO 错误
    #[error("IO 错误：{0}")]
    Io(#[from] std::io::Error),
}

/// 便捷类型别名，统一项目内的 Result 签名
pub type AppResult<T> = Result<T, AppError>;
