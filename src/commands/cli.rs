// ============================================================================
// 命令行入口
// 负责：解析已知参数（clap）、收集未知参数透传给 nativefier、初始化日志
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::commands::build;
use crate::models::dtos::BuildRequest;
use crate::services::layout::{InstallLayout, HOME_ENV};
use crate::services::packager::{resolve_node, NodePackager, NODE_ENV};

/// Build a Nativefier app with the Ghostery adblocker injected
#[derive(Parser, Debug)]
#[command(name = "nativefier-ghostery", version, about, long_about = None)]
pub struct Cli {
    /// URL to package as an Electron app
    pub target_url: String,

    /// Name of the application
    #[arg(short, long, default_value = "WebApp")]
    pub name: String,

    /// Output directory where app is built
    #[arg(short, long, default_value = "./built-app")]
    pub out: PathBuf,

    /// Electron version to use
    #[arg(long)]
    pub electron_version: Option<String>,

    /// Application icon
    #[arg(long)]
    pub icon: Option<PathBuf>,

    /// Install root holding node_modules and the engine cache
    #[arg(long, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    /// node executable used to run nativefier
    #[arg(long, env = NODE_ENV)]
    pub node: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// 组装构建请求：--electron-version 在前，未知参数在后（同名时未知参数覆盖）
    pub fn into_request(self, unknown: Map<String, Value>) -> BuildRequest {
        let mut overrides = Map::new();
        if let Some(version) = self.electron_version {
            overrides.insert("electron-version".to_string(), Value::String(version));
        }
        overrides.extend(unknown);

        BuildRequest {
            target_url: self.target_url,
            app_name: self.name,
            output_dir: self.out,
            overrides,
            icon: self.icon,
        }
    }
}

// ============================================================================
// 参数拆分
// ============================================================================

/// clap 认识的长参数：(名称, 是否带值)
const KNOWN_LONG_FLAGS: &[(&str, bool)] = &[
    ("name", true),
    ("out", true),
    ("electron-version", true),
    ("icon", true),
    ("home", true),
    ("node", true),
    ("verbose", false),
    ("help", false),
    ("version", false),
];

/// 带值的短参数
const SHORT_FLAGS_WITH_VALUE: &[&str] = &["-n", "-o"];

/// 把命令行拆成 (交给 clap 的参数, 未知的 `--` 参数)
///
/// 未知参数后紧跟的非 `--` 参数视为它的值，一并归入未知参数。
pub fn split_args(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut known = Vec::new();
    let mut unknown = Vec::new();
    let mut iter = args.into_iter().peekable();

    // 程序名
    if let Some(program) = iter.next() {
        known.push(program);
    }

    while let Some(arg) = iter.next() {
        if arg == "--" {
            known.push(arg);
            known.extend(iter.by_ref());
            break;
        }

        if let Some(flag) = arg.strip_prefix("--") {
            let (name, inline_value) = match flag.split_once('=') {
                Some((name, _)) => (name, true),
                None => (flag, false),
            };
            match KNOWN_LONG_FLAGS.iter().find(|(known_name, _)| *known_name == name) {
                Some((_, takes_value)) => {
                    let takes_next = *takes_value && !inline_value;
                    known.push(arg);
                    if takes_next {
                        if let Some(value) = iter.next() {
                            known.push(value);
                        }
                    }
                }
                None => {
                    let takes_next = !inline_value
                        && iter.peek().map(|next| !next.starts_with("--")).unwrap_or(false);
                    unknown.push(arg);
                    if takes_next {
                        if let Some(value) = iter.next() {
                            unknown.push(value);
                        }
                    }
                }
            }
            continue;
        }

        let takes_next = SHORT_FLAGS_WITH_VALUE.contains(&arg.as_str());
        known.push(arg);
        if takes_next {
            if let Some(value) = iter.next() {
                known.push(value);
            }
        }
    }

    (known, unknown)
}

/// kebab-case → camelCase，如 "electron-version" → "electronVersion"
pub fn kebab_to_camel(input: &str) -> String {
    let re = match Regex::new(r"-([a-z])") {
        Ok(r) => r,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &Captures<'_>| caps[1].to_uppercase())
        .into_owned()
}

/// 解析未知参数为覆盖项
///
/// - `--flag value` → flag: "value"
/// - `--flag=value` → flag: "value"
/// - `--flag` 后无值或紧跟另一个 `--` 参数 → flag: true
/// - 值是 JSON 对象/数组时按 JSON 解析
pub fn parse_unknown_args(args: &[String]) -> Map<String, Value> {
    let mut options = Map::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        i += 1;

        let Some(flag) = arg.strip_prefix("--") else {
            continue;
        };

        if let Some((name, value)) = flag.split_once('=') {
            options.insert(kebab_to_camel(name), parse_flag_value(value));
            continue;
        }

        let key = kebab_to_camel(flag);
        match args.get(i) {
            Some(next) if !next.starts_with("--") => {
                options.insert(key, parse_flag_value(next));
                i += 1;
            }
            _ => {
                options.insert(key, Value::Bool(true));
            }
        }
    }

    options
}

fn parse_flag_value(raw: &str) -> Value {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(raw) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

// ============================================================================
// 运行
// ============================================================================

fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}

/// 解析参数并执行构建，返回进程退出码
pub fn run(args: Vec<String>) -> ExitCode {
    let (known, unknown) = split_args(args);
    let cli = Cli::parse_from(known);
    init_logger(cli.verbose);

    log::info!("[CLI] 开始构建...");
    let unknown_options = parse_unknown_args(&unknown);
    log::debug!("[CLI] 透传参数：{:?}", unknown_options);

    let layout = match InstallLayout::resolve(cli.home.as_deref()) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("[CLI] 构建失败：{}", e);
            return ExitCode::FAILURE;
        }
    };
    let packager = NodePackager::new(resolve_node(cli.node.as_deref()), layout.root());
    let request = cli.into_request(unknown_options);
    log::debug!("[CLI] 构建请求：{:?}", request);

    match build::build(&request, &packager, &layout) {
        Ok(result) => {
            log::info!("[CLI] 构建成功");
            println!("{}", result.app_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("[CLI] 构建失败：{}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// 单元测试
// ============================================================================
