//! 项目批量结算入口

use crate::core::command::{parse_command, CommandMode};
use crate::core::models::ProjectNameSource;
use crate::core::project::settle_project;
use crate::storage::csv_loader;
use crate::storage::history::HistoryDb;
use crate::storage::selector::{self, CommandFile, Selection};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// 项目批量结算主流程
pub fn run(data_dir: &Path, out_dir: &Path, history: Option<&HistoryDb>) -> Result<()> {
    let command_path = match selector::find_command_file(data_dir) {
        CommandFile::Found(path) => path,
        CommandFile::Blocked { messages } => {
            for message in messages {
                println!("{}", message);
            }
            return Ok(());
        }
    };
    let command_text = std::fs::read_to_string(&command_path)
        .with_context(|| format!("读取口令失败: {}", command_path.display()))?;
    let command = parse_command(command_text.trim());
    if command.mode != Some(CommandMode::Project) {
        println!("口令非项目结算模式，请使用工资：开头或切换到项目结算：");
        return Ok(());
    }

    let (attendance_candidate, payment_candidate) = match selector::resolve_input_paths(data_dir) {
        Selection::Chosen {
            attendance,
            payment,
            audit,
        } => {
            for line in &audit {
                println!("{}", line);
            }
            (attendance, payment)
        }
        Selection::Blocked { messages } => {
            for message in messages {
                println!("{}", message);
            }
            return Ok(());
        }
    };
    let attendance_rows = csv_loader::read_rows(&attendance_candidate.path)?;
    let payment_rows = csv_loader::read_rows(&payment_candidate.path)?;

    let (project_name, source) = match &command.project_name {
        Some(name) => (name.clone(), ProjectNameSource::Command),
        None => match selector::derive_project_name(&attendance_candidate.path) {
            Some(derived) => {
                println!("项目名未显式指定，已使用兜底：{}", derived);
                (derived, ProjectNameSource::Derived)
            }
            None => {
                println!("未识别项目名，请在口令中指定 项目=XXX 后重试。");
                return Ok(());
            }
        },
    };

    let project_dir = out_dir.join(&project_name);
    let summary = settle_project(
        &attendance_rows,
        &payment_rows,
        &command,
        &project_name,
        source,
        &project_dir,
    )?;
    info!(
        project = project_name.as_str(),
        dir = %project_dir.display(),
        "工资单已写出"
    );

    if let Some(db) = history {
        for outcome in &summary.outcomes {
            db.record(
                &outcome.output.run_id,
                &outcome.name,
                &project_name,
                outcome.output.payable,
                outcome.output.blocked,
                &outcome.output.blocking_codes,
            )?;
        }
    }

    println!("{}", summary.summary_text);
    Ok(())
}
