//! 计算口径版本
//!
//! 版本号优先读 `rules/latest.txt`，其次从最新规则文档里解析 `版本 vXXX`。
//! 都不可用时退回内置版本常量。

use anyhow::{bail, Context, Result};
use std::path::Path;

/// 内置计算口径版本
pub const DEFAULT_RULESET_VERSION: &str = "v2025-11-25R52";

/// 输出尾注（详细版与阻断报告共用）
pub fn version_note() -> String {
    format!("计算口径版本 {}｜阻断模式：Hard", DEFAULT_RULESET_VERSION)
}

/// 从仓库根目录解析规则版本
pub fn ruleset_version(repo_root: &Path) -> Result<String> {
    let latest_txt = repo_root.join("rules").join("latest.txt");
    if latest_txt.exists() {
        let version = std::fs::read_to_string(&latest_txt)
            .with_context(|| format!("读取 {} 失败", latest_txt.display()))?;
        let version = version.trim();
        if !version.is_empty() {
            return Ok(version.to_string());
        }
    }

    let latest_md = repo_root.join("rules").join("01_工资模块_latest.md");
    if !latest_md.exists() {
        bail!("未找到规则版本文件");
    }
    let content = std::fs::read_to_string(&latest_md)
        .with_context(|| format!("读取 {} 失败", latest_md.display()))?;
    for line in content.lines() {
        if let Some(version) = extract_version(line) {
            return Ok(version);
        }
    }
    bail!("规则文档中未找到版本号")
}

/// 行内形如 `版本 v2025-11-25R52` 的版本号
fn extract_version(line: &str) -> Option<String> {
    let pos = line.find("版本")?;
    let rest = line[pos..].strip_prefix("版本").unwrap_or(&line[pos..]);
    let token = rest
        .split_whitespace()
        .find(|token| token.starts_with('v'))?;
    Some(token.to_string())
}
