// ============================================================================
// 入口文件注入器
// ============================================================================
//
// 在 nativefier 生成的主进程入口文件中做基于锚点文本的插入：
// 1. 按候选路径定位入口文件（不同 nativefier 版本布局不同）
// 2. 按优先级选择锚点：首个 `mainWindow.loadURL`，否则最后一个 `mainWindow.on('closed'`
// 3. 在锚点前插入广告拦截块与禁止外部窗口块，文件顶部插入依赖声明
// 4. 覆盖写回（先写临时文件再 rename）
//
// 不保证幂等：对已注入过的文件再次执行会插入第二份代码，只支持对新构建的应用注入一次。
// ============================================================================

use std::path::{Path, PathBuf};

use crate::services::engine_cache::EngineCache;
use crate::services::layout::InstallLayout;
use crate::services::snippets;
use crate::services::{APP_RESOURCES_DIR, ENTRY_SCRIPT_CANDIDATES};
use crate::utils::error::{AppError, AppResult};

// ============================================================================
// 锚点定义
// ============================================================================

/// 锚点文本的查找方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSearch {
    /// 取第一次出现的位置
    First,
    /// 取最后一次出现的位置
    Last,
}

/// 注入锚点：插入代码放在该文本之前
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionAnchor {
    pub marker: &'static str,
    pub search: AnchorSearch,
}

impl InjectionAnchor {
    /// 返回锚点在文本中的字节偏移
    pub fn locate(&self, content: &str) -> Option<usize> {
        match self.search {
            AnchorSearch::First => content.find(self.marker),
            AnchorSearch::Last => content.rfind(self.marker),
        }
    }
}

/// 锚点优先级列表，按顺序取第一个命中的
pub const INJECTION_ANCHORS: &[InjectionAnchor] = &[
    InjectionAnchor {
        marker: "mainWindow.loadURL",
        search: AnchorSearch::First,
    },
    InjectionAnchor {
        marker: "mainWindow.on('closed'",
        search: AnchorSearch::Last,
    },
];

/// 选择锚点：返回命中的锚点及其偏移
pub fn select_anchor(content: &str) -> Option<(InjectionAnchor, usize)> {
    INJECTION_ANCHORS.iter().find_map(|anchor| {
        let offset = anchor.locate(content);
        if offset.is_none() {
            log::warn!("[Inject] 未找到锚点 '{}'，尝试下一个锚点", anchor.marker);
        }
        offset.map(|offset| (*anchor, offset))
    })
}

// ============================================================================
// 入口文件定位
// ============================================================================

/// 定位到的入口文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryScript {
    pub path: PathBuf,
    /// 从入口文件所在目录到应用 node_modules 的 require 前缀
    pub node_modules_prefix: String,
}

/// 按候选顺序探测入口文件，返回第一个存在的
pub fn find_entry_script(app_path: &Path) -> AppResult<EntryScript> {
    for candidate in ENTRY_SCRIPT_CANDIDATES {
        let mut path = app_path.to_path_buf();
        for part in *candidate {
            path.push(part);
        }
        if path.is_file() {
            log::info!("[Inject] 找到主进程入口文件：{}", path.display());
            return Ok(EntryScript {
                path,
                node_modules_prefix: node_modules_prefix(candidate),
            });
        }
    }

    Err(AppError::EntryScriptNotFound(app_path.to_path_buf()))
}

/// 计算 require 前缀：`resources/app/lib/main.js` → `../node_modules/`
fn node_modules_prefix(candidate: &[&str]) -> String {
    let depth = candidate
        .len()
        .saturating_sub(APP_RESOURCES_DIR.len())
        .saturating_sub(1);
    if depth == 0 {
        "./node_modules/".to_string()
    } else {
        format!("{}node_modules/", "../".repeat(depth))
    }
}

// ============================================================================
// 文本拼接
// ============================================================================

/// 一次注入所需的全部代码块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub header: String,
    pub bootstrap: String,
    pub guard: String,
}

impl Injection {
    pub fn compose(cache: &EngineCache, node_modules_prefix: &str) -> Self {
        Self {
            header: snippets::require_header(node_modules_prefix),
            bootstrap: snippets::content_filter_bootstrap(cache.path()),
            guard: snippets::window_guard(),
        }
    }

    /// 插入到锚点前的完整文本
    fn body(&self) -> String {
        format!("{}\n\n{}\n\n", self.bootstrap, self.guard)
    }
}

/// 注入后的源码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedSource {
    pub text: String,
    pub anchor: InjectionAnchor,
    /// 锚点在原文中的字节偏移
    pub offset: usize,
}

/// 纯文本注入：不读写文件，找不到锚点时返回 InjectionAnchorNotFound
pub fn patch_source(
    content: &str,
    injection: &Injection,
    entry_path: &Path,
) -> AppResult<PatchedSource> {
    let (anchor, offset) = select_anchor(content).ok_or_else(|| {
        log::error!(
            "[Inject] 主锚点与备用锚点都未在 {} 中找到，注入失败",
            entry_path.display()
        );
        AppError::InjectionAnchorNotFound(entry_path.to_path_buf())
    })?;

    let (before, after) = content.split_at(offset);
    let body = injection.body();
    let mut text =
        String::with_capacity(injection.header.len() + content.len() + body.len());
    text.push_str(&injection.header);
    text.push_str(before);
    text.push_str(&body);
    text.push_str(after);

    Ok(PatchedSource {
        text,
        anchor,
        offset,
    })
}

// ============================================================================
// 文件级注入
// ============================================================================

/// 注入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectReport {
    pub entry_script: PathBuf,
    pub anchor: InjectionAnchor,
    pub offset: usize,
}

/// 对已构建的应用执行注入
///
/// 读取入口文件 → 选锚点并拼接 → 覆盖写回。找不到锚点时文件保持原样。
pub fn inject_code(app_path: &Path, layout: &InstallLayout) -> AppResult<InjectReport> {
    log::info!("[Inject] 开始注入：{}", app_path.display());

    let entry = find_entry_script(app_path)?;
    let content = std::fs::read_to_string(&entry.path)?;

    let cache = EngineCache::resolve(layout);
    log::debug!("[Inject] 引擎缓存路径：{}", cache.path().display());

    let injection = Injection::compose(&cache, &entry.node_modules_prefix);
    let patched = patch_source(&content, &injection, &entry.path)?;

    write_replacing(&entry.path, &patched.text)?;
    log::info!(
        "[Inject] 已在 '{}' 之前注入广告拦截与窗口控制代码：{}",
        patched.anchor.marker,
        entry.path.display()
    );

    if let Err(e) = cache.prune_stale() {
        log::warn!("[Inject] 清理过期引擎缓存失败：{}", e);
    }

    Ok(InjectReport {
        entry_script: entry.path,
        anchor: patched.anchor,
        offset: patched.offset,
    })
}

/// 先写同目录临时文件再 rename 覆盖，失败时清理临时文件
fn write_replacing(path: &Path, content: &str) -> AppResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.ghostery-tmp", file_name));

    let guard = scopeguard::guard(tmp_path, |p| {
        let _ = std::fs::remove_file(p);
    });
    std::fs::write(&*guard, content)?;
    std::fs::rename(&*guard, path)?;
    scopeguard::ScopeGuard::into_inner(guard);

    Ok(())
}

// ============================================================================
// 单元测试
// ============================================================================
