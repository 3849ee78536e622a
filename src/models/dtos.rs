// ============================================================================
// 数据传输对象（DTO）定义
// 构建请求与构建结果，仅包含字段定义和序列化派生
// ⛔ 禁止：包含复杂的业务逻辑方法
// ============================================================================

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 构建请求，由 CLI 组装后交给 `commands::build::build`
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    /// 要打包的网址
    pub target_url: String,
    /// 应用名称
    pub app_name: String,
    /// 构建输出目录
    pub output_dir: PathBuf,
    /// 透传给 nativefier 的覆盖项
    #[serde(default)]
    pub overrides: Map<String, Value>,
    /// 可选图标
    #[serde(default)]
    pub icon: Option<PathBuf>,
}

/// 构建结果
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// 构建出的应用根目录
    pub app_path: PathBuf,
    /// 被注入的入口文件
    pub entry_script: PathBuf,
    /// 命中的锚点文本
    pub anchor: String,
    /// 已复制进应用的依赖包
    pub copied_modules: Vec<String>,
    /// 共享仓库中缺失、已跳过的依赖包
    pub missing_modules: Vec<String>,
}
