//! 单人结算
//!
//! 出勤与支付两条管道汇流后定价，先过校验闸门再渲染两段式输出：
//! 详细版（给杰对账）与压缩版（发员工）。任一 hard 校验失败改出阻断报告。

use crate::core::attendance::{compute_attendance, AttendanceResult};
use crate::core::checks::{run_checks, CheckContext, CheckResult};
use crate::core::command::{collect_project_counts, ROAD_CALC};
use crate::core::models::{Money, Role, Row, RuntimeOverrides};
use crate::core::names::name_key;
use crate::core::payment::{compute_payments, PaymentResult};
use crate::core::ruleset::version_note;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// 固定路补：200元/人/项目
pub const ROAD_ALLOWANCE: Money = Money::from_cents(20000);

/// 内置固定日薪名单（以元计，按归一键匹配）
const BUILTIN_DAILY_WAGES: &[(&str, i64)] = &[("余步云", 260)];

/// 按归一键查内置固定日薪
pub fn builtin_daily_wage(key: &str) -> Option<Money> {
    BUILTIN_DAILY_WAGES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, yuan)| Money::from_yuan(*yuan))
}

/// 日薪的确定来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// 口令固定日薪
    Command,
    /// 内置名单
    Builtin,
    /// 出勤表角色列
    Table,
    /// 口令角色默认价
    RoleDefault,
    /// 角色缺失，按 0 兜底
    Fallback,
}

impl RateSource {
    pub fn label(self) -> &'static str {
        match self {
            RateSource::Command => "口令",
            RateSource::Builtin => "系统",
            RateSource::Table => "表",
            RateSource::RoleDefault => "默认",
            RateSource::Fallback => "兜底",
        }
    }
}

/// 定价明细
#[derive(Debug, Clone)]
pub struct Pricing {
    pub daily_rate: Money,
    pub group_days: usize,
    pub single_days: usize,
    pub wage_total: Money,
    pub meal_total: Money,
    pub travel_total: Money,
    pub paid_total: Money,
    pub prepay_total: Money,
    pub payable: Money,
}

/// 单人结算入参
#[derive(Debug, Clone, Copy)]
pub struct SettleParams<'a> {
    pub person_name: Option<&'a str>,
    pub role: Option<Role>,
    pub project_ended: Option<bool>,
    pub project_name: Option<&'a str>,
    pub overrides: &'a RuntimeOverrides,
}

/// 单人结算输出
#[derive(Debug, Clone)]
pub struct SettleOutput {
    pub run_id: String,
    pub detailed: String,
    pub compact: String,
    pub blocked: bool,
    pub blocking_codes: Vec<String>,
    pub pending_count: usize,
    pub pending_summary: BTreeMap<String, usize>,
    pub payable: Money,
}

impl SettleOutput {
    /// 完整文本：详细版与压缩版之间恰好一个空行；阻断时只有阻断报告
    pub fn text(&self) -> String {
        if self.blocked {
            self.detailed.clone()
        } else {
            format!("{}\n\n{}", self.detailed, self.compact)
        }
    }
}

/// 审计用输入指纹：两表内容加数据源路径
fn input_hash(
    attendance_rows: &[Row],
    payment_rows: &[Row],
    overrides: &RuntimeOverrides,
) -> String {
    let mut hasher = Sha256::new();
    let payload = serde_json::to_vec(&(
        attendance_rows,
        payment_rows,
        &overrides.attendance_source,
        &overrides.payment_source,
    ))
    .unwrap_or_default();
    hasher.update(&payload);
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

fn resolve_daily_rate(params: &SettleParams<'_>) -> (Money, RateSource) {
    if let Some(rate) = params.overrides.daily_rate {
        return (rate, RateSource::Command);
    }
    if let Some(person) = params.person_name {
        if let Some(rate) = builtin_daily_wage(&name_key(person)) {
            return (rate, RateSource::Builtin);
        }
    }
    match params.role {
        Some(role) => (role.base_daily_wage(), RateSource::RoleDefault),
        None => (Money::ZERO, RateSource::Fallback),
    }
}

fn road_allowance(params: &SettleParams<'_>) -> Money {
    let enabled = params.overrides.road_passphrase.as_deref() == Some(ROAD_CALC);
    if enabled && params.project_ended == Some(true) {
        ROAD_ALLOWANCE
    } else {
        Money::ZERO
    }
}

fn wage_breakdown(pricing: &Pricing) -> String {
    match (pricing.group_days, pricing.single_days) {
        (_, 0) => format!("全组{}天", pricing.group_days),
        (0, single) => format!("单防撞{}天", single),
        (group, single) => format!("全组{}天｜单防撞{}天", group, single),
    }
}

fn push_date_set_line(lines: &mut Vec<String>, label: &str, dates: &[String]) {
    if !dates.is_empty() {
        lines.push(format!("{}：{}", label, dates.join("、")));
    }
}

fn top_projects(counter: &BTreeMap<String, usize>, limit: usize) -> Vec<String> {
    let mut items: Vec<(&String, &usize)> = counter.iter().collect();
    items.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    items
        .into_iter()
        .take(limit)
        .map(|(name, count)| format!("- {}({})", name, count))
        .collect()
}

fn fix_suggestions(hard_failures: &[CheckResult]) -> Vec<String> {
    let mut suggestions = Vec::new();
    let mut push = |text: &str| {
        let text = text.to_string();
        if !suggestions.contains(&text) {
            suggestions.push(text);
        }
    };
    for failure in hard_failures {
        match failure.code {
            "A" => push(
                "请检查CSV表头：出勤表需含 日期/姓名/是否施工，报销表需含 报销日期/报销金额/报销状态/报销类型/报销人员",
            ),
            "K" => push("请在口令.txt 写明：工资：姓名 角色 项目已结束=是/否"),
            "B" => push("请在口令中指定 项目=XXX"),
            "L" => push("请补充 项目已结束=是/否"),
            "L2" => push("项目未结束，批量结算要求 项目已结束=是"),
            "C" => push("请核对凭证号并去重后重试"),
            "G" | "S" | "T" => push("请修正表格中的异常取值后重试"),
            _ => {}
        }
    }
    suggestions
}

struct RenderContext<'a> {
    params: &'a SettleParams<'a>,
    attendance: &'a AttendanceResult,
    payment: &'a PaymentResult,
    pricing: &'a Pricing,
    run_id: &'a str,
    input_hash: &'a str,
    attendance_pool: &'a BTreeMap<String, usize>,
    payment_pool: &'a BTreeMap<String, usize>,
}

fn render_blocking_report(ctx: &RenderContext<'_>, hard_failures: &[CheckResult]) -> String {
    let mut lines = vec!["【阻断｜工资结算】".to_string()];
    let mut title = format!("对象: {}", ctx.params.person_name.unwrap_or("未知"));
    if let Some(project) = ctx.params.project_name {
        title.push_str(&format!("｜项目: {}", project));
    }
    lines.push(title);
    lines.push("阻断原因:".to_string());
    for failure in hard_failures {
        lines.push(format!("- [{}] {}: {}", failure.code, failure.name, failure.detail));
    }
    if hard_failures
        .iter()
        .any(|failure| failure.code == "B" && failure.detail.contains("项目池"))
    {
        lines.push("出勤表项目Top10:".to_string());
        lines.extend(top_projects(ctx.attendance_pool, 10));
        lines.push("支付表项目Top10:".to_string());
        lines.extend(top_projects(ctx.payment_pool, 10));
    }
    let mut missing = Vec::new();
    for field in &ctx.attendance.missing_fields {
        missing.push(format!("出勤表缺少字段：{}", field));
    }
    for field in &ctx.payment.missing_fields {
        missing.push(format!("报销表缺少字段：{}", field));
    }
    if !missing.is_empty() {
        lines.push("缺失项:".to_string());
        for item in missing {
            lines.push(format!("- {}", item));
        }
    }
    let invalid: Vec<&String> = ctx
        .attendance
        .invalid_dates
        .iter()
        .chain(&ctx.attendance.invalid_work_values)
        .chain(&ctx.payment.invalid_amounts)
        .chain(&ctx.payment.missing_type_candidates)
        .chain(&ctx.payment.voucher_duplicates)
        .chain(&ctx.payment.empty_voucher_duplicates)
        .collect();
    if !invalid.is_empty() {
        lines.push("异常项:".to_string());
        for item in invalid {
            lines.push(format!("- {}", item));
        }
    }
    let suggestions = fix_suggestions(hard_failures);
    if !suggestions.is_empty() {
        lines.push("修复建议:".to_string());
        for item in suggestions {
            lines.push(format!("- {}", item));
        }
    }
    if ctx.params.overrides.display.show_audit {
        lines.push("审计留痕:".to_string());
        lines.push(format!("- run_id: {}", ctx.run_id));
        lines.push(format!("- {}", version_note()));
        lines.push(format!("- input_hash: {}", ctx.input_hash));
        lines.push("- output_hash: (待生成)".to_string());
    }
    lines.join("\n")
}

fn render_detailed(ctx: &RenderContext<'_>, checks: &[CheckResult], pending_count: usize) -> String {
    let params = ctx.params;
    let pricing = ctx.pricing;
    let display = &params.overrides.display;
    let person = params.person_name.unwrap_or("未知");
    let role = params
        .role
        .map(|role| role.to_string())
        .unwrap_or_else(|| "未知".to_string());
    let project = params.project_name.unwrap_or("未知项目");

    let mut lines = vec![
        "【详细版（给杰对账）】".to_string(),
        format!("{}｜工资结算（{}｜{}）", project, person, role),
        format!(
            "项目已结束：{}",
            if params.project_ended == Some(true) { "是" } else { "否" }
        ),
        format!("出勤：全组{}天｜单防撞{}天", pricing.group_days, pricing.single_days),
    ];
    let sets = &ctx.attendance.date_sets;
    push_date_set_line(&mut lines, "全组｜出勤", &sets.group_worked);
    push_date_set_line(&mut lines, "全组｜未出勤", &sets.group_missed);
    push_date_set_line(&mut lines, "单防撞｜出勤", &sets.single_worked);
    push_date_set_line(&mut lines, "单防撞｜未出勤", &sets.single_missed);
    let wage_days = pricing.group_days + pricing.single_days;
    lines.push(format!(
        "工资：{}×{}={}（{}）",
        pricing.daily_rate,
        wage_days,
        pricing.wage_total,
        wage_breakdown(pricing)
    ));
    lines.push(format!("餐补：{}", pricing.meal_total));
    if pricing.travel_total.is_zero() {
        lines.push("路补：0".to_string());
    } else {
        lines.push(format!(
            "路补：{}（{}｜固定200元/人/项目）",
            pricing.travel_total, ROAD_CALC
        ));
    }
    lines.push(format!("已付合计：{}", pricing.paid_total));
    lines.push(format!("预支合计：{}", pricing.prepay_total));
    lines.push(format!("应付：{}", pricing.payable));
    if pending_count > 0 {
        lines.push(format!("待确认：{}条（不计入应付）", pending_count));
    }
    if display.show_notes || display.verbose {
        for note in &params.overrides.audit_notes {
            lines.push(format!("备注：{}", note));
        }
    }
    if display.show_logs_in_detail || display.verbose {
        for log in ctx
            .attendance
            .normalization_logs
            .iter()
            .chain(&ctx.attendance.conflict_logs)
            .chain(&ctx.attendance.auto_corrections)
        {
            lines.push(format!("日志：{}", log));
        }
    }
    if display.show_checks || display.verbose {
        for item in checks {
            lines.push(format!(
                "检查：[{}] {}: {}",
                item.code,
                item.name,
                item.detail
            ));
        }
    }
    if display.show_audit {
        lines.push("审计留痕:".to_string());
        lines.push(format!("- run_id: {}", ctx.run_id));
        lines.push(format!("- {}", version_note()));
        lines.push(format!("- input_hash: {}", ctx.input_hash));
        if let (Some(attendance), Some(payment)) = (
            &params.overrides.attendance_source,
            &params.overrides.payment_source,
        ) {
            lines.push(format!("- 数据源: 出勤={}｜报销={}", attendance, payment));
        }
    }
    lines.join("\n")
}

fn render_compact(ctx: &RenderContext<'_>, pending_count: usize) -> String {
    let params = ctx.params;
    let pricing = ctx.pricing;
    let person = params.person_name.unwrap_or("未知");
    let role = params
        .role
        .map(|role| role.to_string())
        .unwrap_or_else(|| "未知".to_string());
    let project = params.project_name.unwrap_or("未知项目");
    let mut lines = vec![
        "【压缩版（发员工）】".to_string(),
        format!("{}｜工资结算（{}｜{}）", project, person, role),
        format!(
            "应付{}＝工资{}＋餐补{}＋路补{}－已付{}－预支{}",
            pricing.payable,
            pricing.wage_total,
            pricing.meal_total,
            pricing.travel_total,
            pricing.paid_total,
            pricing.prepay_total
        ),
    ];
    if pending_count > 0 {
        lines.push(format!("待确认：{}条", pending_count));
    }
    if params.overrides.display.show_logs_in_compact {
        for log in &ctx.attendance.normalization_logs {
            lines.push(format!("日志：{}", log));
        }
    }
    lines.join("\n")
}

/// 结算单人工资
pub fn settle_person(
    attendance_rows: &[Row],
    payment_rows: &[Row],
    params: &SettleParams<'_>,
) -> SettleOutput {
    let run_id = Uuid::new_v4().to_string();
    let overrides = params.overrides;

    let attendance = compute_attendance(attendance_rows, params.project_name, params.person_name);
    let payment = compute_payments(payment_rows, params.project_name, params.person_name);

    let attendance_pool = collect_project_counts(attendance_rows);
    let payment_pool = collect_project_counts(payment_rows);
    let mut pool: std::collections::BTreeSet<&String> = attendance_pool.keys().collect();
    pool.extend(payment_pool.keys());
    let project_pool_issue = pool.len() >= 2;

    let (daily_rate, rate_source) = resolve_daily_rate(params);
    debug!(
        "日薪确定：{}（来源：{}）",
        daily_rate,
        rate_source.label()
    );
    let group_days = attendance.date_sets.group_worked.len();
    let single_days = attendance.date_sets.single_worked.len();
    let wage_total = daily_rate * (group_days + single_days) as i64;
    let meal_total = payment.meal_total();
    let paid_total = payment.paid_total();
    let prepay_total = payment.prepay_total();
    let travel_total = road_allowance(params);
    let payable = wage_total + meal_total + travel_total - paid_total - prepay_total;
    let pricing = Pricing {
        daily_rate,
        group_days,
        single_days,
        wage_total,
        meal_total,
        travel_total,
        paid_total,
        prepay_total,
        payable,
    };

    let note = version_note();
    let ctx = CheckContext {
        attendance: &attendance,
        payment: &payment,
        pricing: &pricing,
        person_name: params.person_name,
        role: params.role,
        command_errors: &overrides.command_errors,
        name_key_conflicts: &overrides.name_key_conflicts,
        project_name: params.project_name,
        project_pool_issue,
        project_name_source: overrides.project_name_source,
        project_ended: params.project_ended,
        require_project_ended: overrides.require_project_ended,
        date_sets_consistent: true,
        version_note: &note,
    };
    let (checks, hard_failures) = run_checks(&ctx);

    let hash = input_hash(attendance_rows, payment_rows, overrides);
    let render_ctx = RenderContext {
        params,
        attendance: &attendance,
        payment: &payment,
        pricing: &pricing,
        run_id: &run_id,
        input_hash: &hash,
        attendance_pool: &attendance_pool,
        payment_pool: &payment_pool,
    };

    let pending_count = payment.pending_count();
    let pending_summary = payment.pending_summary();

    if !hard_failures.is_empty() {
        let report = render_blocking_report(&render_ctx, &hard_failures);
        return SettleOutput {
            run_id,
            detailed: report,
            compact: String::new(),
            blocked: true,
            blocking_codes: hard_failures
                .iter()
                .map(|failure| failure.code.to_string())
                .collect(),
            pending_count,
            pending_summary,
            payable: Money::ZERO,
        };
    }

    let detailed = render_detailed(&render_ctx, &checks, pending_count);
    let compact = render_compact(&render_ctx, pending_count);
    SettleOutput {
        run_id,
        detailed,
        compact,
        blocked: false,
        blocking_codes: Vec::new(),
        pending_count,
        pending_summary,
        payable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProjectNameSource;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn attendance_rows() -> Vec<Row> {
        vec![
            row(&[("日期", "2025-11-01"), ("姓名", "王怀宇"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-01"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "王怀宇"), ("是否施工", "否"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "李四"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "赵五"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-03"), ("姓名", "王怀宇"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-03"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-03"), ("姓名", "李四"), ("是否施工", "是"), ("车辆", "防撞车")]),
        ]
    }

    fn payment_rows() -> Vec<Row> {
        vec![row(&[
            ("报销日期", "2025-11-04"),
            ("报销金额", "300"),
            ("报销状态", "已支付"),
            ("报销类型", "工资"),
            ("报销人员", "王怀宇"),
            ("项目", "测试项目"),
            ("上传凭证", "V001"),
        ])]
    }

    fn params<'a>(overrides: &'a RuntimeOverrides) -> SettleParams<'a> {
        SettleParams {
            person_name: Some("王怀宇"),
            role: Some(Role::Leader),
            project_ended: Some(true),
            project_name: Some("测试项目"),
            overrides,
        }
    }

    #[test]
    fn test_settle_person_outputs_two_segments() {
        let overrides = RuntimeOverrides::default();
        let output = settle_person(&attendance_rows(), &payment_rows(), &params(&overrides));
        let text = output.text();

        assert!(!output.blocked);
        assert!(text.contains("【详细版（给杰对账）】"));
        assert!(text.contains("【压缩版（发员工）】"));
        assert!(text.contains("计算口径版本 v2025-11-25R52｜阻断模式：Hard"));
        assert!(text.contains("测试项目｜工资结算（王怀宇｜组长）"));
        // 两段之间恰好一个空行
        assert_eq!(text.split("\n\n").count(), 2);
    }

    #[test]
    fn test_settle_person_wage_and_paid_lines() {
        let overrides = RuntimeOverrides::default();
        let output = settle_person(&attendance_rows(), &payment_rows(), &params(&overrides));

        // 11-01 单防撞出勤，11-03 全组出勤，日薪按组长350
        assert!(output.detailed.contains("工资：350×2=700（全组1天｜单防撞1天）"));
        assert!(output.detailed.contains("已付合计：300"));
        assert!(output.detailed.contains("应付：400"));
        assert!(output.compact.contains("应付400＝工资700＋餐补0＋路补0－已付300－预支0"));
    }

    #[test]
    fn test_settle_person_blocking_report_on_empty_input() {
        let overrides = RuntimeOverrides::default();
        let output = settle_person(&[], &[], &params(&overrides));
        let text = output.text();

        assert!(output.blocked);
        assert!(text.starts_with("【阻断｜工资结算】"));
        assert!(!text.contains("【详细版（给杰对账）】"));
        assert!(output.blocking_codes.contains(&"A".to_string()));
    }

    fn road_attendance() -> Vec<Row> {
        vec![
            row(&[("日期", "2025-11-01"), ("姓名", "王怀宇"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-01"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "王怀宇"), ("是否施工", "否"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "李四"), ("是否施工", "是"), ("车辆", "防撞车")]),
        ]
    }

    fn settle_with_road(project_ended: bool, road_cmd: &str) -> SettleOutput {
        let overrides = RuntimeOverrides {
            road_passphrase: Some(road_cmd.to_string()),
            ..RuntimeOverrides::default()
        };
        let params = SettleParams {
            person_name: Some("王怀宇"),
            role: Some(Role::Leader),
            project_ended: Some(project_ended),
            project_name: Some("测试项目"),
            overrides: &overrides,
        };
        settle_person(&road_attendance(), &[row(&[("报销日期", ""), ("报销金额", ""), ("报销状态", ""), ("报销类型", ""), ("报销人员", ""), ("上传凭证", "")])], &params)
    }

    #[test]
    fn test_road_allowance_fixed_200_when_enabled() {
        let output = settle_with_road(true, ROAD_CALC);
        let text = output.text();

        assert!(text.contains("路补：200"));
        assert!(text.contains("固定200元/人/项目"));
        let (detailed, compact) = text.split_once("\n\n").unwrap();
        assert!(detailed.contains("路补：200"));
        assert!(compact.contains("路补200"));
    }

    #[test]
    fn test_road_allowance_zero_when_disabled() {
        let output = settle_with_road(true, "无路补");
        assert!(output.text().contains("路补：0"));
    }

    #[test]
    fn test_road_allowance_zero_when_not_ended() {
        let output = settle_with_road(false, ROAD_CALC);
        assert!(output.text().contains("路补：0"));
    }

    #[test]
    fn test_builtin_daily_wage_by_name_key() {
        assert_eq!(builtin_daily_wage("余步云"), Some(Money::from_yuan(260)));
        assert_eq!(builtin_daily_wage("袁玉兵"), None);
    }

    #[test]
    fn test_fixed_daily_rate_name_key_match() {
        let attendance = vec![
            row(&[("日期", "2025-11-01"), ("姓名", "袁玉兵(P007)"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-01"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-01"), ("姓名", "李四"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "袁玉兵(P007)"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-02"), ("姓名", "李四"), ("是否施工", "是"), ("车辆", "防撞车")]),
        ];
        let payment = vec![row(&[
            ("报销日期", "2025-11-03"),
            ("报销金额", "0"),
            ("报销状态", "已支付"),
            ("报销类型", "工资"),
            ("报销人员", "袁玉兵(P007)"),
            ("上传凭证", "V200"),
        ])];
        let overrides = RuntimeOverrides::default();
        let params = SettleParams {
            person_name: Some("袁玉兵(P007)"),
            role: Some(Role::Member),
            project_ended: Some(true),
            project_name: Some("测试项目"),
            overrides: &overrides,
        };

        let output = settle_person(&attendance, &payment, &params);

        assert!(output.detailed.contains("工资：300×2=600（全组2天）"));
    }

    #[test]
    fn test_runtime_daily_rate_override() {
        let overrides = RuntimeOverrides {
            daily_rate: Some(Money::from_yuan(280)),
            ..RuntimeOverrides::default()
        };
        let params = SettleParams {
            person_name: Some("王怀宇"),
            role: Some(Role::Member),
            project_ended: Some(true),
            project_name: Some("测试项目"),
            overrides: &overrides,
        };
        let attendance = vec![
            row(&[("日期", "2025-11-01"), ("姓名", "王怀宇"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-01"), ("姓名", "余步云"), ("是否施工", "是"), ("车辆", "防撞车")]),
            row(&[("日期", "2025-11-01"), ("姓名", "张三"), ("是否施工", "是"), ("车辆", "防撞车")]),
        ];

        let output = settle_person(&attendance, &payment_rows(), &params);

        assert!(output.detailed.contains("工资：280×1=280"));
    }

    #[test]
    fn test_merged_table_settles_both_roles() {
        let combined = vec![
            row(&[
                ("日期", "2025-11-01"),
                ("实际出勤人员", "王怀宇、张三"),
                ("今天是否施工", "是"),
                ("车辆", "防撞车"),
                ("报销日期", ""),
                ("报销金额", ""),
                ("报销状态", ""),
                ("报销类型", ""),
                ("报销人员", ""),
                ("项目", ""),
                ("上传凭证", ""),
                ("备注", ""),
            ]),
            row(&[
                ("日期", ""),
                ("实际出勤人员", ""),
                ("今天是否施工", ""),
                ("车辆", ""),
                ("报销日期", "2025-11-02"),
                ("报销金额", "￥1,200 元"),
                ("报销状态", "已支付"),
                ("报销类型", "工资"),
                ("报销人员", "王怀宇"),
                ("项目", "测试项目"),
                ("上传凭证", "V-001"),
                ("备注", "工资支付"),
            ]),
        ];
        let overrides = RuntimeOverrides::default();
        let output = settle_person(&combined, &combined, &params(&overrides));
        let text = output.text();

        assert!(!output.blocked, "{}", text);
        assert!(text.contains("【详细版（给杰对账）】"));
        assert!(text.contains("已付合计：1200"));
    }

    #[test]
    fn test_invalid_work_value_blocks() {
        let attendance = vec![row(&[
            ("施工日期", "2026-01-02"),
            ("姓名", "张三"),
            ("是否施工", "未知"),
            ("项目", "项目A"),
        ])];
        let payment = vec![row(&[
            ("报销日期", "2026-01-04"),
            ("报销金额", "100"),
            ("报销状态", "已支付"),
            ("报销类型", "工资"),
            ("报销人员", "张三"),
            ("项目", "项目A"),
            ("上传凭证", "V001"),
        ])];
        let overrides = RuntimeOverrides::default();
        let params = SettleParams {
            person_name: Some("张三"),
            role: Some(Role::Member),
            project_ended: Some(true),
            project_name: Some("项目A"),
            overrides: &overrides,
        };

        let output = settle_person(&attendance, &payment, &params);
        let text = output.text();

        assert!(text.starts_with("【阻断｜工资结算】"));
        assert!(text.contains("是否施工取值异常"));
        assert!(text.contains("第1行"));
    }

    fn pool_rows() -> (Vec<Row>, Vec<Row>) {
        let attendance = vec![
            row(&[
                ("施工日期", "2026-01-02"),
                ("姓名", "张三"),
                ("是否施工", "是"),
                ("项目", "项目A"),
                ("出勤模式", "全组"),
            ]),
            row(&[
                ("施工日期", "2026-01-03"),
                ("姓名", "张三"),
                ("是否施工", "是"),
                ("项目", "项目B"),
                ("出勤模式", "全组"),
            ]),
        ];
        let payment = vec![
            row(&[
                ("报销日期", "2026-01-04"),
                ("报销金额", "100"),
                ("报销状态", "已支付"),
                ("报销类型", "工资"),
                ("报销人员", "张三"),
                ("项目", "项目A"),
                ("上传凭证", "V001"),
            ]),
            row(&[
                ("报销日期", "2026-01-05"),
                ("报销金额", "120"),
                ("报销状态", "已支付"),
                ("报销类型", "工资"),
                ("报销人员", "张三"),
                ("项目", "项目B"),
                ("上传凭证", "V002"),
            ]),
        ];
        (attendance, payment)
    }

    #[test]
    fn test_project_pool_blocks_without_command() {
        let (attendance, payment) = pool_rows();
        let overrides = RuntimeOverrides::default();
        let params = SettleParams {
            person_name: Some("张三"),
            role: Some(Role::Member),
            project_ended: Some(true),
            project_name: None,
            overrides: &overrides,
        };

        let output = settle_person(&attendance, &payment, &params);
        let text = output.text();

        assert!(text.starts_with("【阻断｜工资结算】"));
        assert!(text.contains("项目池包含多个项目"));
        assert!(text.contains("出勤表项目Top10"));
        assert!(text.contains("支付表项目Top10"));
    }

    #[test]
    fn test_project_pool_filters_with_command() {
        let (attendance, payment) = pool_rows();
        let overrides = RuntimeOverrides {
            project_name_source: Some(ProjectNameSource::Command),
            ..RuntimeOverrides::default()
        };
        let params = SettleParams {
            person_name: Some("张三"),
            role: Some(Role::Member),
            project_ended: Some(true),
            project_name: Some("项目A"),
            overrides: &overrides,
        };

        let output = settle_person(&attendance, &payment, &params);
        let text = output.text();

        assert!(!text.starts_with("【阻断｜工资结算】"), "{}", text);
        assert!(output.detailed.contains("已付合计：100"));
    }

    #[test]
    fn test_attendance_guard_hides_merged_payment_rows() {
        let combined = vec![
            row(&[
                ("日期", "2025-11-05"),
                ("姓名", "徐新亮"),
                ("是否施工", ""),
                ("报销类型", "工资"),
                ("金额", "2815"),
                ("报销状态", "已报销"),
                ("凭证", "V-2815"),
                ("项目", "测试项目"),
            ]),
            row(&[
                ("日期", "2025-11-06"),
                ("姓名", "测试工人"),
                ("是否施工", "是"),
                ("车辆", "防撞车"),
                ("报销类型", ""),
                ("金额", ""),
                ("报销状态", ""),
                ("凭证", ""),
                ("项目", "测试项目"),
            ]),
        ];
        let overrides = RuntimeOverrides::default();
        let params = SettleParams {
            person_name: Some("徐新亮"),
            role: Some(Role::Member),
            project_ended: Some(true),
            project_name: Some("测试项目"),
            overrides: &overrides,
        };

        let output = settle_person(&combined, &combined, &params);
        let text = output.text();

        assert!(!text.contains("[M]"), "{}", text);
    }
}
