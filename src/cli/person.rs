//! 单人结算入口
//!
//! 读口令、选表、展开团体口令后逐条工资命令出单。
//! 多条命令时详细版逐份打印，压缩版汇成合集便于转发。

use crate::core::command::{expand_passphrase, parse_command, Command, CommandMode};
use crate::core::models::{ProjectNameSource, RuntimeOverrides};
use crate::core::names::name_key;
use crate::core::settle::{settle_person, SettleOutput, SettleParams};
use crate::storage::config;
use crate::storage::csv_loader;
use crate::storage::history::HistoryDb;
use crate::storage::selector::{self, CommandFile, Selection};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// 读取并展开口令，返回 (工资命令行, 其余行)。阻断时打印原因并返回 None。
fn expanded_command_lines(
    command_text: &str,
    attendance_rows: &[crate::core::models::Row],
    payment_rows: &[crate::core::models::Row],
) -> Option<(Vec<String>, Vec<String>)> {
    let expansion = expand_passphrase(command_text, Some(attendance_rows), Some(payment_rows));
    if !expansion.errors.is_empty() {
        println!("【阻断｜口令】");
        for error in &expansion.errors {
            println!("- {}", error);
        }
        return None;
    }
    for line in &expansion.audit {
        println!("{}", line);
    }
    let mut wage_lines = Vec::new();
    let mut other_lines = Vec::new();
    for line in expansion.lines {
        if crate::core::command::detect_mode(&line) == Some(CommandMode::Single) {
            wage_lines.push(line);
        } else {
            other_lines.push(line);
        }
    }
    Some((wage_lines, other_lines))
}

fn build_overrides(command: &Command, data_dir: &Path) -> Result<RuntimeOverrides> {
    let display = config::load_display_overrides(&data_dir.join("当前").join("配置.txt"))?;
    Ok(RuntimeOverrides {
        road_passphrase: command.road_cmd.clone(),
        audit_notes: command.audit_notes.clone(),
        command_errors: command.command_errors.clone(),
        name_key_conflicts: command.name_key_conflicts.clone(),
        display,
        ..RuntimeOverrides::default()
    })
}

fn settle_one(
    command: &Command,
    attendance_rows: &[crate::core::models::Row],
    payment_rows: &[crate::core::models::Row],
    mut overrides: RuntimeOverrides,
    project_name: Option<&str>,
    project_name_source: Option<ProjectNameSource>,
    attendance_file: &str,
    payment_file: &str,
) -> SettleOutput {
    if let Some(person) = &command.person_name {
        if let Some(rate) = command.fixed_daily_rates.get(&name_key(person)) {
            overrides.daily_rate = Some(*rate);
        }
    }
    overrides.project_name_source = project_name_source;
    overrides.attendance_source = Some(attendance_file.to_string());
    overrides.payment_source = Some(payment_file.to_string());
    let params = SettleParams {
        person_name: command.person_name.as_deref(),
        role: command.role,
        project_ended: command.project_ended,
        project_name,
        overrides: &overrides,
    };
    settle_person(attendance_rows, payment_rows, &params)
}

fn record_run(
    history: Option<&HistoryDb>,
    output: &SettleOutput,
    person: &str,
    project: &str,
) -> Result<()> {
    if let Some(db) = history {
        db.record(
            &output.run_id,
            person,
            project,
            output.payable,
            output.blocked,
            &output.blocking_codes,
        )?;
    }
    Ok(())
}

/// 单人结算主流程
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
    let command_text = command_text.trim().to_string();

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

    let Some((wage_lines, other_lines)) =
        expanded_command_lines(&command_text, &attendance_rows, &payment_rows)
    else {
        return Ok(());
    };

    // 项目结算模式整体交给批量流程
    let full_command = parse_command(&command_text);
    if full_command.mode == Some(CommandMode::Project) {
        return crate::cli::project::run(data_dir, out_dir, history);
    }
    if wage_lines.is_empty() {
        println!("口令缺少工资命令，示例：工资：王怀宇 组长 项目已结束=是 项目=溧马一溧芜设标-凌云");
        return Ok(());
    }

    let mut outputs: Vec<(String, SettleOutput)> = Vec::new();
    for wage_line in &wage_lines {
        let per_text = if other_lines.is_empty() {
            wage_line.clone()
        } else {
            format!("{}\n{}", wage_line, other_lines.join("\n"))
        };
        let mut command = parse_command(&per_text);
        let mut overrides = build_overrides(&command, data_dir)?;

        let (project_name, source) = match command.project_name.take() {
            Some(name) => (Some(name), Some(ProjectNameSource::Command)),
            None => match selector::derive_project_name(&attendance_candidate.path) {
                Some(derived) => {
                    overrides
                        .push_audit_note(format!("项目名未显式指定，已使用兜底：{}", derived));
                    (Some(derived), Some(ProjectNameSource::Derived))
                }
                // 兜底也推不出项目名，按未识别处理
                None => (None, None),
            },
        };
        let person = command.person_name.clone().unwrap_or_default();
        let project_label = project_name.as_deref().unwrap_or("");
        info!(person = person.as_str(), project = project_label, "单人结算");

        let output = settle_one(
            &command,
            &attendance_rows,
            &payment_rows,
            overrides,
            project_name.as_deref(),
            source,
            &attendance_candidate.file_name(),
            &payment_candidate.file_name(),
        );
        record_run(history, &output, &person, project_name.as_deref().unwrap_or(""))?;
        outputs.push((person, output));
    }

    if outputs.len() == 1 {
        println!("{}", outputs[0].1.text());
        return Ok(());
    }
    for (_, output) in &outputs {
        println!("{}", output.detailed);
        println!();
    }
    println!("【压缩版合集】");
    for (_, output) in &outputs {
        if !output.blocked {
            println!("{}", output.compact);
            println!();
        }
    }
    Ok(())
}
