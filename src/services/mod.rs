// ============================================================================
// 业务层：纯 Rust 核心逻辑
// ✅ 特点：不依赖 CLI 解析，保持纯净，方便写 #[test]
// ⛔ 禁止：直接打印到终端（统一走 log 宏）
// ============================================================================

pub mod engine_cache;
pub mod injector;
pub mod layout;
pub mod materializer;
pub mod packager;
pub mod snippets;

// ============================================================================
// 常量定义
// ============================================================================

/// 依赖白名单：注入代码运行时需要的 npm 包，整目录复制到应用的 node_modules
/// `@ghostery` 与 `@remusao` 为 scope 目录，整体复制
pub const MODULES_TO_COPY: &[&str] = &[
    "@ghostery",
    "cross-fetch",
    "tldts-experimental",
    "@remusao",
    "node-fetch",
    "whatwg-url",
    "webidl-conversions",
    "tr46",
];

/// 主进程入口文件候选路径（相对于应用根目录），按 nativefier 版本布局依次探测
pub const ENTRY_SCRIPT_CANDIDATES: &[&[&str]] = &[
    &["resources", "app", "lib", "main.js"],
    &["resources", "app", "main.js"],
];

/// 打包产物中的应用资源目录（相对于应用根目录）
pub const APP_RESOURCES_DIR: &[&str] = &["resources", "app"];

/// 默认 Electron 版本
pub const DEFAULT_ELECTRON_VERSION: &str = "35.2.2";

/// 过滤规则来源标识，参与引擎缓存 key 的计算
pub const FILTER_LIST_SOURCE: &str = "@ghostery/adblocker-electron#fullLists";

/// 注入代码在主窗口未就绪时的重试延迟（毫秒）
pub const MAIN_WINDOW_RETRY_DELAY_MS: u32 = 1500;
