//! 配置文件管理模块
//!
//! data/当前/配置.txt 里只接受六个显示开关，形如 `show_checks: 1`。

use crate::core::models::DisplayOverrides;
use anyhow::Result;
use std::path::{Path, PathBuf};

const DISPLAY_KEYS: &[&str] = &[
    "verbose",
    "show_notes",
    "show_checks",
    "show_audit",
    "show_logs_in_compact",
    "show_logs_in_detail",
];

/// 默认的结算记录数据库路径
pub fn default_history_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "jiesuan", "Jiesuan")
        .map(|dirs| dirs.data_dir().join("runs.sqlite"))
        .unwrap_or_else(|| PathBuf::from("runs.sqlite"))
}

fn parse_flag_line(line: &str) -> Option<(&str, bool)> {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return None;
    }
    let (key, value) = stripped
        .split_once(':')
        .or_else(|| stripped.split_once('='))?;
    let key = key.trim();
    if !DISPLAY_KEYS.contains(&key) {
        return None;
    }
    let digit = value.trim().chars().next()?;
    if !digit.is_ascii_digit() {
        return None;
    }
    Some((key, digit != '0'))
}

/// 读显示开关；文件不存在时用默认值
pub fn load_display_overrides(config_path: &Path) -> Result<DisplayOverrides> {
    let mut display = DisplayOverrides::default();
    if !config_path.exists() {
        return Ok(display);
    }
    let content = std::fs::read_to_string(config_path)?;
    for line in content.lines() {
        let Some((key, value)) = parse_flag_line(line) else {
            continue;
        };
        match key {
            "verbose" => display.verbose = value,
            "show_notes" => display.show_notes = value,
            "show_checks" => display.show_checks = value,
            "show_audit" => display.show_audit = value,
            "show_logs_in_compact" => display.show_logs_in_compact = value,
            "show_logs_in_detail" => display.show_logs_in_detail = value,
            _ => {}
        }
    }
    Ok(display)
}
