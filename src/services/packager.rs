// ============================================================================
// 打包适配层：合并 nativefier 配置并调用外部打包库
// ============================================================================
//
// 使用 Packager trait 隔离外部打包库：
// - NodePackager: 通过 node 进程调用 nativefier 的 buildNativefierApp
// - 测试中可替换为记录调用次数的假实现
// ============================================================================

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::models::dtos::BuildRequest;
use crate::services::DEFAULT_ELECTRON_VERSION;
use crate::utils::error::{AppError, AppResult};

/// 环境变量：覆盖 node 可执行文件
pub const NODE_ENV: &str = "NATIVEFIER_GHOSTERY_NODE";

/// nativefier 配置中窗口选项的 key
const BROWSER_WINDOW_OPTIONS: &str = "browserwindowOptions";
const WEB_PREFERENCES: &str = "webPreferences";

// ============================================================================
// 配置合并
// ============================================================================

/// 最终传给 nativefier 的配置
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PackagerConfig(Map<String, Value>);

impl PackagerConfig {
    /// 默认配置 → 请求字段 → 调用方覆盖项，窗口选项两层按 key 合并
    pub fn from_request(request: &BuildRequest) -> Self {
        let defaults = default_options();
        let overrides = &request.overrides;

        let mut options = defaults.clone();
        options.insert("name".to_string(), json!(request.app_name));
        options.insert("targetUrl".to_string(), json!(request.target_url));
        // node 子进程的工作目录是安装根目录，相对路径须先按调用方工作目录展开
        options.insert(
            "out".to_string(),
            json!(absolute_path(&request.output_dir).to_string_lossy()),
        );
        for (key, value) in overrides {
            options.insert(key.clone(), value.clone());
        }

        // browserwindowOptions：默认值与覆盖项按 key 合并，而非整体替换
        let mut window_options = object_at(&defaults, BROWSER_WINDOW_OPTIONS);
        let override_window = object_at(overrides, BROWSER_WINDOW_OPTIONS);
        for (key, value) in &override_window {
            window_options.insert(key.clone(), value.clone());
        }

        // webPreferences 再下钻一层合并
        let mut web_preferences =
            object_at(&object_at(&defaults, BROWSER_WINDOW_OPTIONS), WEB_PREFERENCES);
        for (key, value) in object_at(&override_window, WEB_PREFERENCES) {
            web_preferences.insert(key, value);
        }
        window_options.insert(WEB_PREFERENCES.to_string(), Value::Object(web_preferences));
        options.insert(
            BROWSER_WINDOW_OPTIONS.to_string(),
            Value::Object(window_options),
        );

        if let Some(icon) = &request.icon {
            options.insert(
                "icon".to_string(),
                json!(absolute_path(icon).to_string_lossy()),
            );
            log::info!("[Build] 使用图标：{}", icon.display());
        }

        Self(options)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

/// 固定默认配置
fn default_options() -> Map<String, Value> {
    let value = json!({
        "overwrite": true,
        "electron-version": DEFAULT_ELECTRON_VERSION,
        "browserwindowOptions": {
            "webPreferences": {
                "contextIsolation": false,
                "nodeIntegration": false,
            },
        },
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// 相对路径按当前工作目录展开；无法获取工作目录时原样返回
fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// 取嵌套对象；不存在或不是对象时视为空
fn object_at(map: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match map.get(key) {
        Some(Value::Object(inner)) => inner.clone(),
        _ => Map::new(),
    }
}

// ============================================================================
// Packager Trait 定义
// ============================================================================

/// 外部打包库的抽象
pub trait Packager {
    /// 按配置构建应用，返回构建出的应用根目录
    fn package(&self, config: &PackagerConfig) -> AppResult<PathBuf>;
}

// ============================================================================
// node + nativefier 实现
// ============================================================================

/// 打包脚本输出应用路径时使用的行前缀
const APP_PATH_SENTINEL: &str = "__NATIVEFIER_APP_PATH__=";
/// 打包脚本输出 nativefier 错误信息时使用的行前缀
const ERROR_SENTINEL: &str = "__NATIVEFIER_ERROR__=";

/// 在 node 中执行的脚本：配置通过 argv 传入，结果路径或错误信息打印到 stdout
const NODE_BUILD_SCRIPT: &str = r#"
const { buildNativefierApp } = require('nativefier');
buildNativefierApp(JSON.parse(process.argv[1]))
  .then((appPath) => {
    if (appPath) {
      process.stdout.write(`\n__NATIVEFIER_APP_PATH__=${appPath}\n`);
    }
  })
  .catch((err) => {
    console.error(err && err.stack ? err.stack : String(err));
    const message = err && err.message ? err.message : String(err);
    process.stdout.write(`\n__NATIVEFIER_ERROR__=${message.replace(/\r?\n/g, ' ')}\n`, () => {
      process.exit(1);
    });
  });
"#;

/// 通过 node 子进程调用 nativefier
///
/// nativefier 从 `module_root/node_modules` 解析，子进程工作目录即 `module_root`。
#[derive(Debug, Clone)]
pub struct NodePackager {
    node: PathBuf,
    module_root: PathBuf,
}

impl NodePackager {
    pub fn new(node: impl Into<PathBuf>, module_root: impl Into<PathBuf>) -> Self {
        Self {
            node: node.into(),
            module_root: module_root.into(),
        }
    }
}

impl Packager for NodePackager {
    fn package(&self, config: &PackagerConfig) -> AppResult<PathBuf> {
        log::info!("[Build] 调用 Nativefier...");
        log::debug!("[Build] 最终 Nativefier 配置：{}", config.to_json());

        let mut child = Command::new(&self.node)
            .arg("-e")
            .arg(NODE_BUILD_SCRIPT)
            .arg(config.to_json())
            .current_dir(&self.module_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                AppError::PackagerFailure(format!(
                    "无法启动 {}: {}",
                    self.node.display(),
                    e
                ))
            })?;
        let stdout = child.stdout.take();

        // 读取 stdout 中途出错时结束子进程，避免遗留僵尸进程
        let guard = scopeguard::guard(child, |mut child| {
            let _ = child.kill();
            let _ = child.wait();
        });

        let mut app_path = None;
        let mut failure = None;
        if let Some(stdout) = stdout {
            for line in BufReader::new(stdout).split(b'\n') {
                let line = String::from_utf8_lossy(&line?).into_owned();
                match parse_stdout_line(&line) {
                    StdoutLine::AppPath(path) => app_path = Some(path),
                    StdoutLine::Error(message) => failure = Some(message),
                    StdoutLine::Log(text) => log::info!("[Nativefier] {}", text),
                    StdoutLine::Blank => {}
                }
            }
        }

        let mut child = scopeguard::ScopeGuard::into_inner(guard);
        let status = child.wait()?;
        if !status.success() {
            // 优先返回 nativefier 自身的错误信息
            return Err(AppError::PackagerFailure(failure.unwrap_or_else(|| {
                format!("nativefier 进程退出：{}", status)
            })));
        }

        let app_path = app_path.ok_or_else(|| {
            AppError::PackagerFailure(
                "nativefier 未返回应用路径（目标已存在且未开启 overwrite？）".to_string(),
            )
        })?;
        log::info!("[Build] Nativefier 完成，应用路径：{}", app_path.display());
        Ok(app_path)
    }
}

/// 打包脚本输出的一行
#[derive(Debug, PartialEq, Eq)]
enum StdoutLine {
    AppPath(PathBuf),
    Error(String),
    Log(String),
    Blank,
}

fn parse_stdout_line(line: &str) -> StdoutLine {
    let line = line.trim_end();
    if let Some(path) = parse_app_path(line) {
        return StdoutLine::AppPath(path);
    }
    if let Some(message) = line.strip_prefix(ERROR_SENTINEL) {
        return StdoutLine::Error(message.to_string());
    }
    if line.trim().is_empty() {
        StdoutLine::Blank
    } else {
        StdoutLine::Log(line.to_string())
    }
}

/// 从 stdout 行中解析应用路径
fn parse_app_path(line: &str) -> Option<PathBuf> {
    line.trim_end()
        .strip_prefix(APP_PATH_SENTINEL)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// 解析 node 可执行文件：显式参数 > PATH 中的 node
pub fn resolve_node(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("node"))
}

// ============================================================================
// 单元测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(overrides: Value) -> BuildRequest {
        BuildRequest {
            target_url: "https://example.com".to_string(),
            app_name: "Demo".to_string(),
            output_dir: PathBuf::from("./out"),
            overrides: match overrides {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            icon: None,
        }
    }

    #[test]
    fn test_defaults_and_request_fields() {
        let config = PackagerConfig::from_request(&request_with(json!({})));
        assert_eq!(config.get("name"), Some(&json!("Demo")));
        assert_eq!(config.get("targetUrl"), Some(&json!("https://example.com")));
        let out = std::path::absolute("./out").unwrap();
        assert_eq!(config.get("out"), Some(&json!(out.to_string_lossy())));
        assert_eq!(config.get("overwrite"), Some(&json!(true)));
        assert_eq!(config.get("electron-version"), Some(&json!("35.2.2")));
        assert_eq!(
            config.get(BROWSER_WINDOW_OPTIONS),
            Some(&json!({
                "webPreferences": { "contextIsolation": false, "nodeIntegration": false }
            }))
        );
        assert!(config.get("icon").is_none());
    }

    #[test]
    fn test_web_preferences_merged_key_wise() {
        let config = PackagerConfig::from_request(&request_with(json!({
            "browserwindowOptions": {
                "width": 1280,
                "webPreferences": { "nodeIntegration": true, "spellcheck": false }
            }
        })));
        assert_eq!(
            config.get(BROWSER_WINDOW_OPTIONS),
            Some(&json!({
                "width": 1280,
                "webPreferences": {
                    "contextIsolation": false,
                    "nodeIntegration": true,
                    "spellcheck": false
                }
            }))
        );
    }

    #[test]
    fn test_overrides_win_over_defaults_and_request() {
        let config = PackagerConfig::from_request(&request_with(json!({
            "electron-version": "30.0.0",
            "overwrite": false,
            "name": "Renamed",
            "singleInstance": true
        })));
        assert_eq!(config.get("electron-version"), Some(&json!("30.0.0")));
        assert_eq!(config.get("overwrite"), Some(&json!(false)));
        assert_eq!(config.get("name"), Some(&json!("Renamed")));
        assert_eq!(config.get("singleInstance"), Some(&json!(true)));
    }

    #[test]
    fn test_non_object_window_override_keeps_defaults() {
        let config = PackagerConfig::from_request(&request_with(json!({
            "browserwindowOptions": "not-an-object"
        })));
        assert_eq!(
            config.get(BROWSER_WINDOW_OPTIONS),
            Some(&json!({
                "webPreferences": { "contextIsolation": false, "nodeIntegration": false }
            }))
        );
    }

    #[test]
    fn test_icon_is_set() {
        let mut request = request_with(json!({}));
        request.icon = Some(PathBuf::from("icon.png"));
        let config = PackagerConfig::from_request(&request);
        let icon = std::env::current_dir().unwrap().join("icon.png");
        assert_eq!(config.get("icon"), Some(&json!(icon.to_string_lossy())));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let mut request = request_with(json!({}));
        request.output_dir = PathBuf::from("/srv/apps");
        request.icon = Some(PathBuf::from("/srv/icon.png"));
        let config = PackagerConfig::from_request(&request);
        assert_eq!(config.get("out"), Some(&json!("/srv/apps")));
        assert_eq!(config.get("icon"), Some(&json!("/srv/icon.png")));
    }

    #[test]
    fn test_parse_app_path() {
        assert_eq!(
            parse_app_path("__NATIVEFIER_APP_PATH__=/tmp/out/Demo-linux-x64\r"),
            Some(PathBuf::from("/tmp/out/Demo-linux-x64"))
        );
        assert_eq!(parse_app_path("Packaging app..."), None);
        assert_eq!(parse_app_path("__NATIVEFIER_APP_PATH__="), None);
    }

    #[test]
    fn test_parse_stdout_line() {
        assert_eq!(
            parse_stdout_line("__NATIVEFIER_ERROR__=getaddrinfo ENOTFOUND example.com\n"),
            StdoutLine::Error("getaddrinfo ENOTFOUND example.com".to_string())
        );
        assert_eq!(
            parse_stdout_line("Downloading Electron"),
            StdoutLine::Log("Downloading Electron".to_string())
        );
        assert_eq!(parse_stdout_line("  \r"), StdoutLine::Blank);
    }

    // ------------------------------------------------------------------------
    // 以下测试需要本机安装 node，未安装时跳过
    // ------------------------------------------------------------------------

    fn node_available() -> bool {
        Command::new("node")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// 在安装根目录下放一个假的 nativefier 包
    fn fake_nativefier(body: &str) -> tempfile::TempDir {
        let install = tempfile::TempDir::new().unwrap();
        let pkg = install.path().join("node_modules").join("nativefier");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(
            pkg.join("package.json"),
            r#"{"name":"nativefier","version":"0.0.0","main":"index.js"}"#,
        )
        .unwrap();
        std::fs::write(
            pkg.join("index.js"),
            format!("const path = require('path');\nexports.buildNativefierApp = {};\n", body),
        )
        .unwrap();
        install
    }

    #[test]
    fn test_relative_out_resolves_against_caller_cwd() {
        if !node_available() {
            return;
        }
        // 只返回路径，不在磁盘上创建任何东西
        let install = fake_nativefier(
            "async (o) => path.resolve(o.out, o.name + '-linux-x64')",
        );
        let config = PackagerConfig::from_request(&request_with(json!({})));

        let app = NodePackager::new("node", install.path()).package(&config).unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert!(app.starts_with(&cwd), "{} 不在 {} 下", app.display(), cwd.display());
        assert!(!app.starts_with(install.path()));
        assert!(app.ends_with(Path::new("out").join("Demo-linux-x64")));
    }

    #[test]
    fn test_nativefier_error_message_is_passed_through() {
        if !node_available() {
            return;
        }
        let install = fake_nativefier(
            "async () => { throw new Error('getaddrinfo ENOTFOUND example.com'); }",
        );
        let config = PackagerConfig::from_request(&request_with(json!({})));

        let result = NodePackager::new("node", install.path()).package(&config);
        match result {
            Err(AppError::PackagerFailure(message)) => {
                assert_eq!(message, "getaddrinfo ENOTFOUND example.com")
            }
            other => panic!("expected PackagerFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_non_utf8_output_does_not_abort() {
        if !node_available() {
            return;
        }
        let install = fake_nativefier(
            "async (o) => { process.stdout.write(Buffer.from([0xff, 0xfe, 0x0a])); return '/tmp/Demo-linux-x64'; }",
        );
        let config = PackagerConfig::from_request(&request_with(json!({})));

        let app = NodePackager::new("node", install.path()).package(&config).unwrap();
        assert_eq!(app, PathBuf::from("/tmp/Demo-linux-x64"));
    }

    #[test]
    fn test_missing_node_binary_is_packager_failure() {
        let packager = NodePackager::new("/nonexistent/bin/node", ".");
        let config = PackagerConfig::from_request(&request_with(json!({})));
        let result = packager.package(&config);
        assert!(matches!(result, Err(AppError::PackagerFailure(_))));
    }

    #[test]
    fn test_resolve_node_default() {
        assert_eq!(resolve_node(None), PathBuf::from("node"));
        assert_eq!(
            resolve_node(Some(Path::new("/usr/local/bin/node"))),
            PathBuf::from("/usr/local/bin/node")
        );
    }
}
