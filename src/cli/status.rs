//! 状态盘点入口
//!
//! 出单前的自检报告：规则版本、数据目录扫描、模式判定、选表审计与最近结算记录。

use crate::core::ruleset::ruleset_version;
use crate::storage::history::HistoryDb;
use crate::storage::selector::{self, scan_csv_candidates};
use anyhow::Result;
use std::path::Path;

/// 状态盘点主流程
pub fn run(data_dir: &Path, history: Option<&HistoryDb>) -> Result<()> {
    println!("工资出单状态盘点/自检报告");

    println!("一、规则版本号");
    let repo_root = std::env::current_dir()?;
    let version = ruleset_version(&repo_root).unwrap_or_else(|_| "未知".to_string());
    println!("- 计算口径版本: {}", version);

    println!("二、数据目录扫描结果");
    let current_dir = data_dir.join("当前");
    let scan_dir = if current_dir.exists() {
        println!("- data/当前: {}", current_dir.display());
        current_dir.clone()
    } else {
        println!("- data/当前: (不存在)");
        current_dir.clone()
    };
    let command_file = scan_dir.join("口令.txt");
    println!(
        "- 口令.txt: {}",
        if command_file.exists() { "存在" } else { "不存在" }
    );
    let candidates = if scan_dir.exists() {
        scan_csv_candidates(&scan_dir)
    } else {
        Vec::new()
    };
    for line in selector::csv_scan_lines(&candidates) {
        println!("{}", line);
    }

    println!("三、运行模式判定");
    let (mode, reason) = selector::resolve_mode(&candidates);
    println!("- 模式: {}", mode);
    println!("- 依据: {}", reason);

    println!("四、选表审计");
    for line in selector::selection_audit_lines(&candidates) {
        println!("{}", line);
    }

    println!("五、最近结算记录");
    match history {
        Some(db) => {
            let records = db.recent(20)?;
            if records.is_empty() {
                println!("- 无记录");
            }
            for record in records {
                let status = if record.blocked {
                    format!("阻断[{}]", record.blocking_codes)
                } else {
                    format!("应付{}", record.payable)
                };
                println!(
                    "- {} {}｜{}｜{}",
                    record.created_at, record.person, record.project, status
                );
            }
        }
        None => println!("- 未启用结算记录库"),
    }

    Ok(())
}
