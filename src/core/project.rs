//! 项目批量结算
//!
//! 对项目内全部人员逐一结算，工资单逐人落盘，最后生成 汇总索引.txt。
//! 批量口径强制要求 项目已结束=是。

use crate::core::attendance::{collect_attendance_people, compute_attendance};
use crate::core::command::Command;
use crate::core::models::{Money, ProjectNameSource, Role, Row, RuntimeOverrides};
use crate::core::names::name_key;
use crate::core::payment::{collect_payment_people, PENDING_REASON_ORDER};
use crate::core::settle::{
    builtin_daily_wage, settle_person, RateSource, SettleOutput, SettleParams,
};
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 单人批量结算结果
#[derive(Debug)]
pub struct PersonOutcome {
    pub name: String,
    pub role: Role,
    pub role_source: &'static str,
    pub output: SettleOutput,
    pub file_path: PathBuf,
}

/// 项目批量结算结果
#[derive(Debug)]
pub struct ProjectSummary {
    pub project_name: String,
    pub outcomes: Vec<PersonOutcome>,
    pub summary_text: String,
    pub summary_path: PathBuf,
}

fn resolve_role(
    name: &str,
    table_roles: &HashMap<String, Role>,
    role_overrides: &HashMap<String, Role>,
) -> (Role, &'static str) {
    if let Some(role) = table_roles.get(name) {
        return (*role, "表");
    }
    if let Some(role) = role_overrides.get(name) {
        return (*role, "口令");
    }
    (Role::Member, "默认")
}

fn resolve_daily_wage(
    name: &str,
    fixed_daily_rates: &HashMap<String, Money>,
    role: Role,
    table_roles: &HashMap<String, Role>,
) -> (Money, RateSource) {
    let key = name_key(name);
    if let Some(rate) = fixed_daily_rates.get(&key) {
        return (*rate, RateSource::Command);
    }
    if let Some(rate) = builtin_daily_wage(&key) {
        return (rate, RateSource::Builtin);
    }
    if let Some(table_role) = table_roles.get(name) {
        return (table_role.base_daily_wage(), RateSource::Table);
    }
    (role.base_daily_wage(), RateSource::RoleDefault)
}

fn render_summary(
    project_name: &str,
    outcomes: &[PersonOutcome],
    fixed_rate_hits: &[(String, Money, RateSource)],
) -> Result<String> {
    let total = outcomes.len();
    let blocked = outcomes.iter().filter(|o| o.output.blocked).count();
    let success = total - blocked;
    let pending_people = outcomes
        .iter()
        .filter(|o| o.output.pending_count > 0)
        .count();
    let pending_items: usize = outcomes.iter().map(|o| o.output.pending_count).sum();
    let mut reason_people: BTreeMap<&str, usize> = BTreeMap::new();
    let mut reason_items: BTreeMap<&str, usize> = BTreeMap::new();
    for outcome in outcomes {
        for (reason, count) in &outcome.output.pending_summary {
            if *count == 0 {
                continue;
            }
            *reason_people.entry(reason.as_str()).or_default() += 1;
            *reason_items.entry(reason.as_str()).or_default() += count;
        }
    }
    if total != success + blocked {
        bail!("汇总人数不一致");
    }

    let mut lines = vec![
        "【汇总索引】".to_string(),
        format!("项目：{}", project_name),
        format!("总人数：{}", total),
        format!("成功：{}", success),
        format!("阻断：{}", blocked),
        format!("待确认人数：{}", pending_people),
        format!("待确认条数：{}", pending_items),
    ];

    if pending_people > 0 {
        lines.push("待确认原因汇总：".to_string());
        for reason in PENDING_REASON_ORDER {
            if let Some(count) = reason_items.get(reason) {
                lines.push(format!(
                    "- {}：人数{}｜条数{}",
                    reason, reason_people[reason], count
                ));
            }
        }
        for (reason, count) in &reason_items {
            if PENDING_REASON_ORDER.contains(reason) {
                continue;
            }
            lines.push(format!(
                "- {}：人数{}｜条数{}",
                reason, reason_people[reason], count
            ));
        }
        lines.push("待确认明细：".to_string());
        for outcome in outcomes {
            if outcome.output.pending_count > 0 {
                lines.push(format!(
                    "- {}: {}条",
                    outcome.name, outcome.output.pending_count
                ));
            }
        }
    }

    if blocked > 0 {
        lines.push("阻断原因列表：".to_string());
        for outcome in outcomes {
            if !outcome.output.blocked {
                continue;
            }
            let codes = if outcome.output.blocking_codes.is_empty() {
                "UNKNOWN".to_string()
            } else {
                outcome.output.blocking_codes.join(",")
            };
            lines.push(format!("- {}: {}", outcome.name, codes));
        }
    }

    if !fixed_rate_hits.is_empty() {
        lines.push("固定日薪命中：".to_string());
        for (name, rate, source) in fixed_rate_hits {
            lines.push(format!("- {}={}（来源：{}）", name, rate, source.label()));
        }
    }

    if !outcomes.is_empty() {
        lines.push("角色来源：".to_string());
        for outcome in outcomes {
            lines.push(format!(
                "- {}={}（来源：{}）",
                outcome.name, outcome.role, outcome.role_source
            ));
        }
    }

    Ok(lines.join("\n"))
}

/// 项目批量结算：逐人出单并写 汇总索引.txt
pub fn settle_project(
    attendance_rows: &[Row],
    payment_rows: &[Row],
    command: &Command,
    project_name: &str,
    project_name_source: ProjectNameSource,
    out_dir: &Path,
) -> Result<ProjectSummary> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("创建输出目录失败: {}", out_dir.display()))?;

    let attendance = compute_attendance(attendance_rows, Some(project_name), None);
    let table_roles = attendance.role_by_person;

    let mut people: BTreeSet<String> = collect_attendance_people(attendance_rows, Some(project_name));
    people.extend(collect_payment_people(payment_rows, Some(project_name)));
    info!(project = project_name, people = people.len(), "项目批量结算开始");

    let mut fixed_rate_hits: Vec<(String, Money, RateSource)> = Vec::new();
    let mut outcomes = Vec::new();

    for name in &people {
        let (role, role_source) = resolve_role(name, &table_roles, &command.role_overrides);
        let (daily_rate, rate_source) =
            resolve_daily_wage(name, &command.fixed_daily_rates, role, &table_roles);
        if matches!(rate_source, RateSource::Command | RateSource::Builtin) {
            fixed_rate_hits.push((name.clone(), daily_rate, rate_source));
        }

        let overrides = RuntimeOverrides {
            road_passphrase: command.road_cmd.clone(),
            daily_rate: Some(daily_rate),
            require_project_ended: true,
            project_name_source: Some(project_name_source),
            command_errors: command.command_errors.clone(),
            name_key_conflicts: command.name_key_conflicts.clone(),
            ..RuntimeOverrides::default()
        };
        let params = SettleParams {
            person_name: Some(name),
            role: Some(role),
            project_ended: command.project_ended,
            project_name: Some(project_name),
            overrides: &overrides,
        };
        let output = settle_person(attendance_rows, payment_rows, &params);

        let file_path = out_dir.join(format!("工资单_{}.txt", name));
        fs::write(&file_path, output.text())
            .with_context(|| format!("写入工资单失败: {}", file_path.display()))?;
        debug!(person = name.as_str(), blocked = output.blocked, "工资单已写出");

        outcomes.push(PersonOutcome {
            name: name.clone(),
            role,
            role_source,
            output,
            file_path,
        });
    }

    let summary_text = render_summary(project_name, &outcomes, &fixed_rate_hits)?;
    let summary_path = out_dir.join("汇总索引.txt");
    fs::write(&summary_path, &summary_text)
        .with_context(|| format!("写入汇总索引失败: {}", summary_path.display()))?;
    info!(
        total = outcomes.len(),
        blocked = outcomes.iter().filter(|o| o.output.blocked).count(),
        "项目批量结算完成"
    );

    Ok(ProjectSummary {
        project_name: project_name.to_string(),
        outcomes,
        summary_text,
        summary_path,
    })
}
