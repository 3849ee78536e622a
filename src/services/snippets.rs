// ============================================================================
// 注入代码模板：运行在打包后应用的 Electron 主进程里
// ⛔ 注意：模板依赖 nativefier 主进程中的 `mainWindow` 变量名，
//    nativefier 改名后需同步修改
// ============================================================================

use std::path::Path;

use crate::services::MAIN_WINDOW_RETRY_DELAY_MS;

/// 依赖声明：插入到入口文件最顶部
const REQUIRE_HEADER: &str = "\
// --- Ghostery Dependencies START ---
const { ElectronBlocker: GhosteryElectronBlocker, fullLists: ghosteryFullLists } = require('__NODE_MODULES__@ghostery/adblocker-electron');
const ghosteryFetch = require('__NODE_MODULES__cross-fetch');
const ghosteryFs = require('node:fs');
const ghosteryPath = require('node:path');
const { app: ghosteryApp } = require('electron');
// --- Ghostery Dependencies END ---

";

/// 广告拦截初始化：构建引擎（带磁盘缓存）并挂到主窗口 session
const CONTENT_FILTER_BOOTSTRAP: &str = "
// --- Ghostery Adblocker Injection START ---
console.log('[Ghostery] Initializing blocker...');
GhosteryElectronBlocker.fromLists(
  ghosteryFetch,
  ghosteryFullLists,
  { enableCompression: true },
  {
    path: __CACHE_PATH__,
    read: ghosteryFs.promises.readFile,
    write: ghosteryFs.promises.writeFile,
  }
).then((blocker) => {
  let attached = false;
  const attach = (win) => {
    if (attached) {
      return true;
    }
    if (!win || !win.webContents || !win.webContents.session) {
      return false;
    }
    attached = true;
    blocker.enableBlockingInSession(win.webContents.session);
    blocker.on('request-blocked', (request) => {
      console.log('[Ghostery] blocked', request.tabId, request.url.substring(0, 80));
    });
    blocker.on('request-redirected', (request) => {
      console.log('[Ghostery] redirected', request.tabId, request.url.substring(0, 80));
    });
    console.log('[Ghostery] Blocker attached to session.');
    return true;
  };
  const currentWindow = () => (typeof mainWindow !== 'undefined' ? mainWindow : undefined);
  if (attach(currentWindow())) {
    return;
  }
  // mainWindow 尚未创建：等窗口创建事件，同时保留一次延迟重试
  // 事件在 BrowserWindow 构造期间触发，此时 mainWindow 尚未赋值，需延后比较
  const onWindowCreated = (_event, win) => {
    setImmediate(() => {
      if (win === currentWindow() && attach(win)) {
        ghosteryApp.removeListener('browser-window-created', onWindowCreated);
      }
    });
  };
  ghosteryApp.on('browser-window-created', onWindowCreated);
  setTimeout(() => {
    if (attach(currentWindow())) {
      ghosteryApp.removeListener('browser-window-created', onWindowCreated);
    } else {
      console.error('[Ghostery] mainWindow or session not found after delay, waiting for browser-window-created.');
    }
  }, __RETRY_DELAY__);
}).catch((err) => {
  console.error('[Ghostery] Error initializing blocker:', err);
});
// --- Ghostery Adblocker Injection END ---
";

/// 禁止外部新窗口：主窗口上的 window open 一律拒绝
const WINDOW_GUARD: &str = "
// --- Prevent External Windows START ---
(() => {
  let installed = false;
  const install = (win) => {
    if (installed) {
      return true;
    }
    if (!win || !win.webContents) {
      return false;
    }
    installed = true;
    win.webContents.setWindowOpenHandler(({ url }) => {
      console.log(`[Window Control] Denying new window/external navigation for: ${url.substring(0, 100)}...`);
      return { action: 'deny' };
    });
    console.log('[Window Control] New window handler set to deny external opening.');
    return true;
  };
  const currentWindow = () => (typeof mainWindow !== 'undefined' ? mainWindow : undefined);
  if (install(currentWindow())) {
    return;
  }
  const onWindowCreated = (_event, win) => {
    setImmediate(() => {
      if (win === currentWindow() && install(win)) {
        ghosteryApp.removeListener('browser-window-created', onWindowCreated);
      }
    });
  };
  ghosteryApp.on('browser-window-created', onWindowCreated);
  setTimeout(() => {
    if (install(currentWindow())) {
      ghosteryApp.removeListener('browser-window-created', onWindowCreated);
    } else {
      console.error('[Window Control] mainWindow or webContents not found after delay, waiting for browser-window-created.');
    }
  }, __RETRY_DELAY__);
})();
// --- Prevent External Windows END ---
";

/// 生成依赖声明块
///
/// `node_modules_prefix` 是从入口文件所在目录到应用 node_modules 的相对前缀，
/// 如 `../node_modules/`。
pub fn require_header(node_modules_prefix: &str) -> String {
    REQUIRE_HEADER.replace("__NODE_MODULES__", node_modules_prefix)
}

/// 生成广告拦截初始化块，缓存路径以 JS 字符串字面量写入
pub fn content_filter_bootstrap(cache_path: &Path) -> String {
    let literal = serde_json::Value::String(cache_path.to_string_lossy().to_string()).to_string();
    CONTENT_FILTER_BOOTSTRAP
        .replace("__CACHE_PATH__", &literal)
        .replace("__RETRY_DELAY__", &MAIN_WINDOW_RETRY_DELAY_MS.to_string())
}

/// 生成禁止外部新窗口块
pub fn window_guard() -> String {
    WINDOW_GUARD.replace("__RETRY_DELAY__", &MAIN_WINDOW_RETRY_DELAY_MS.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_header_uses_prefix() {
        let header = require_header("../node_modules/");
        assert!(header.contains("require('../node_modules/@ghostery/adblocker-electron')"));
        assert!(header.contains("require('../node_modules/cross-fetch')"));
        assert!(header.contains("require('electron')"));
        assert!(!header.contains("__NODE_MODULES__"));
        assert!(header.ends_with("\n\n"));
    }

    #[test]
    fn test_bootstrap_escapes_cache_path() {
        let block = content_filter_bootstrap(Path::new("C:\\tools\\ghostery \"x\".bin"));
        assert!(block.contains(r#"path: "C:\\tools\\ghostery \"x\".bin","#));
        assert!(block.contains("}, 1500);"));
        assert!(!block.contains("__CACHE_PATH__"));
        assert!(!block.contains("__RETRY_DELAY__"));
    }

    #[test]
    fn test_late_attach_only_targets_main_window() {
        for block in [content_filter_bootstrap(Path::new("/tmp/engine.bin")), window_guard()] {
            assert!(block.contains("win === currentWindow()"));
            assert!(block.contains("removeListener('browser-window-created', onWindowCreated)"));
            assert!(!block.contains("currentWindow() || win"));
            assert!(!block.contains("once('browser-window-created'"));
        }
    }

    #[test]
    fn test_window_guard_denies() {
        let block = window_guard();
        assert!(block.contains("setWindowOpenHandler"));
        assert!(block.contains("return { action: 'deny' };"));
        assert!(!block.contains("loadURL"));
        assert!(!block.contains("__RETRY_DELAY__"));
    }
}
