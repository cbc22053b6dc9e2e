//! 结算前置校验
//!
//! 所有校验按固定顺序产出 `CheckResult`，任一 hard 失败即阻断出单。

use crate::core::attendance::AttendanceResult;
use crate::core::models::{NameKeyConflict, ProjectNameSource, Role};
use crate::core::payment::PaymentResult;
use crate::core::settle::Pricing;

/// 校验级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// 失败即阻断
    Hard,
    /// 仅提示
    Soft,
}

/// 单项校验结果
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub code: &'static str,
    pub name: &'static str,
    pub passed: bool,
    pub severity: Severity,
    pub detail: String,
}

fn check(code: &'static str, name: &'static str, passed: bool, detail: String) -> CheckResult {
    CheckResult {
        code,
        name,
        passed,
        severity: Severity::Hard,
        detail,
    }
}

fn soft_check(code: &'static str, name: &'static str, passed: bool, detail: String) -> CheckResult {
    CheckResult {
        code,
        name,
        passed,
        severity: Severity::Soft,
        detail,
    }
}

/// 校验所需的上下文快照
pub struct CheckContext<'a> {
    pub attendance: &'a AttendanceResult,
    pub payment: &'a PaymentResult,
    pub pricing: &'a Pricing,
    pub person_name: Option<&'a str>,
    pub role: Option<Role>,
    pub command_errors: &'a [String],
    pub name_key_conflicts: &'a [NameKeyConflict],
    pub project_name: Option<&'a str>,
    pub project_pool_issue: bool,
    pub project_name_source: Option<ProjectNameSource>,
    pub project_ended: Option<bool>,
    pub require_project_ended: bool,
    pub date_sets_consistent: bool,
    pub version_note: &'a str,
}

impl CheckContext<'_> {
    /// 口令指定了项目时，表里混入其他项目的行按已过滤处理
    fn project_mismatch_blocking(&self) -> bool {
        !(self.project_pool_issue
            && self.project_name_source == Some(ProjectNameSource::Command))
    }
}

/// 运行全部校验，返回（全部结果, hard 失败项）
pub fn run_checks(ctx: &CheckContext<'_>) -> (Vec<CheckResult>, Vec<CheckResult>) {
    let mut checks = Vec::new();

    let headers_ok =
        ctx.attendance.missing_fields.is_empty() && ctx.payment.missing_fields.is_empty();
    let detail = if headers_ok {
        "OK".to_string()
    } else {
        let mut missing = ctx.attendance.missing_fields.clone();
        missing.extend(ctx.payment.missing_fields.iter().cloned());
        format!("缺失: {}", missing.join(","))
    };
    checks.push(check("A", "表头映射成功", headers_ok, detail));

    let command_ok =
        ctx.person_name.is_some() && ctx.role.is_some() && ctx.command_errors.is_empty();
    let command_detail = if command_ok {
        "OK".to_string()
    } else {
        let mut parts = Vec::new();
        if ctx.person_name.is_none() || ctx.role.is_none() {
            parts.push("缺少姓名/角色".to_string());
        }
        if !ctx.command_errors.is_empty() {
            parts.push(ctx.command_errors.join("；"));
        }
        parts.join("；")
    };
    checks.push(check("K", "口令信息完整", command_ok, command_detail));

    let name_key_ok = ctx.name_key_conflicts.is_empty();
    let name_key_detail = if name_key_ok {
        "OK".to_string()
    } else {
        format!("name_key 冲突 {}条", ctx.name_key_conflicts.len())
    };
    checks.push(check("N", "姓名归一冲突", name_key_ok, name_key_detail));

    let project_requires_command = ctx.project_pool_issue
        && ctx.project_name_source != Some(ProjectNameSource::Command);
    let (project_ok, project_detail) = if project_requires_command {
        (false, "项目池包含多个项目，需口令指定项目=XXX".to_string())
    } else if ctx.project_name.is_some() || !ctx.project_pool_issue {
        (true, "OK".to_string())
    } else {
        (false, "未识别项目名".to_string())
    };
    checks.push(check("B", "项目名确定", project_ok, project_detail));

    let project_ended_ok = ctx.project_ended.is_some();
    checks.push(check(
        "L",
        "项目结束标识",
        project_ended_ok,
        if project_ended_ok {
            "OK".to_string()
        } else {
            "缺少项目已结束=是/否".to_string()
        },
    ));
    if ctx.require_project_ended {
        let require_ok = ctx.project_ended == Some(true);
        checks.push(check(
            "L2",
            "项目已结束=是",
            require_ok,
            if require_ok {
                "OK".to_string()
            } else {
                "项目未结束".to_string()
            },
        ));
    }

    let voucher_ok = ctx.payment.voucher_duplicates.is_empty()
        && ctx.payment.empty_voucher_duplicates.is_empty();
    let voucher_detail = if voucher_ok {
        "OK".to_string()
    } else {
        let mut parts = Vec::new();
        if !ctx.payment.voucher_duplicates.is_empty() {
            parts.push("凭证重复");
        }
        if !ctx.payment.empty_voucher_duplicates.is_empty() {
            parts.push("空凭证重复");
        }
        parts.join(";")
    };
    checks.push(check("C", "凭证唯一", voucher_ok, voucher_detail));

    let conflict_detail = if ctx.attendance.conflict_logs.is_empty() {
        "OK".to_string()
    } else {
        format!("冲突{}条已消解", ctx.attendance.conflict_logs.len())
    };
    checks.push(soft_check("D", "出勤冲突消解", true, conflict_detail));

    let recomputed = ctx.pricing.wage_total + ctx.pricing.meal_total + ctx.pricing.travel_total
        - ctx.pricing.paid_total
        - ctx.pricing.prepay_total;
    let payable_ok = recomputed == ctx.pricing.payable;
    checks.push(check(
        "E",
        "应付反算一致",
        payable_ok,
        if payable_ok {
            "OK".to_string()
        } else {
            "应付反算不一致".to_string()
        },
    ));

    checks.push(check("F", "模式不混合", true, "OK".to_string()));

    let amount_ok = ctx.payment.invalid_amounts.is_empty();
    let amount_detail = if amount_ok {
        "OK".to_string()
    } else {
        format!("金额格式异常: {}", ctx.payment.invalid_amounts.join("; "))
    };
    checks.push(check("G", "金额数值化", amount_ok, amount_detail));

    let type_ok = ctx.payment.missing_type_candidates.is_empty();
    let type_detail = if type_ok {
        "OK".to_string()
    } else {
        format!(
            "支付行类型缺失（必填）：请补‘报销类型/费用类型/科目/类别’；{}",
            ctx.payment.missing_type_candidates.join("; ")
        )
    };
    checks.push(check("T", "支付行类型必填", type_ok, type_detail));

    checks.push(check(
        "H",
        "两版日期集合一致",
        ctx.date_sets_consistent,
        if ctx.date_sets_consistent {
            "OK".to_string()
        } else {
            "日期集合不一致".to_string()
        },
    ));

    let (single_ok, single_detail) = if !ctx.attendance.date_sets.has_single_days() {
        (true, "OK".to_string())
    } else if ctx.attendance.has_vehicle_field {
        (true, "OK".to_string())
    } else if ctx.attendance.has_explicit_mode {
        (true, "OK(出勤模式)".to_string())
    } else {
        (false, "缺少车辆字段/出勤模式".to_string())
    };
    checks.push(check("M", "单防撞必要字段满足", single_ok, single_detail));

    let pending_total = ctx.payment.pending_count();
    let mut pending_detail = format!("待确认{}条", pending_total);
    if !ctx.payment.missing_amount_candidates.is_empty() {
        pending_detail.push_str(&format!(
            "(金额缺失{}条)",
            ctx.payment.missing_amount_candidates.len()
        ));
    }
    checks.push(soft_check("P", "待确认条数提示", true, pending_detail));

    let version_ok = !ctx.version_note.is_empty();
    checks.push(check(
        "V",
        "版本尾注存在",
        version_ok,
        if version_ok {
            "OK".to_string()
        } else {
            "缺少版本尾注".to_string()
        },
    ));

    let mismatch_blocking = ctx.project_mismatch_blocking();
    let has_mismatch = !ctx.attendance.project_mismatches.is_empty()
        || !ctx.payment.project_mismatches.is_empty();
    let schema_ok = ctx.attendance.invalid_dates.is_empty()
        && ctx.attendance.invalid_work_values.is_empty()
        && ctx.payment.invalid_amounts.is_empty()
        && !(has_mismatch && mismatch_blocking);
    let schema_detail = if schema_ok {
        "OK".to_string()
    } else {
        let mut parts = Vec::new();
        if !ctx.attendance.invalid_dates.is_empty() {
            parts.push("日期格式异常");
        }
        if !ctx.attendance.invalid_work_values.is_empty() {
            parts.push("是否施工取值异常");
        }
        if has_mismatch && mismatch_blocking {
            parts.push("项目不匹配");
        }
        if !ctx.payment.invalid_amounts.is_empty() {
            parts.push("金额格式异常");
        }
        parts.join(";")
    };
    checks.push(check("S", "schema校验", schema_ok, schema_detail));

    let hard_failures = checks
        .iter()
        .filter(|item| !item.passed && item.severity == Severity::Hard)
        .cloned()
        .collect();
    (checks, hard_failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attendance::compute_attendance;
    use crate::core::models::Money;
    use crate::core::payment::compute_payments;
    use crate::core::settle::Pricing;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, &str)]) -> crate::core::models::Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn pricing() -> Pricing {
        Pricing {
            daily_rate: Money::from_yuan(300),
            group_days: 1,
            single_days: 0,
            wage_total: Money::from_yuan(300),
            meal_total: Money::ZERO,
            travel_total: Money::ZERO,
            paid_total: Money::ZERO,
            prepay_total: Money::ZERO,
            payable: Money::from_yuan(300),
        }
    }

    fn base_rows() -> (Vec<crate::core::models::Row>, Vec<crate::core::models::Row>) {
        let attendance = vec![row(&[
            ("日期", "2025-11-01"),
            ("姓名", "张三"),
            ("是否施工", "是"),
            ("车辆", "防撞车"),
        ])];
        let payment = vec![row(&[
            ("报销日期", "2025-11-02"),
            ("报销金额", "100"),
            ("报销状态", "已支付"),
            ("报销类型", "工资"),
            ("报销人员", "张三"),
            ("上传凭证", "V001"),
        ])];
        (attendance, payment)
    }

    #[test]
    fn test_all_checks_pass_on_clean_input() {
        let (attendance_rows, payment_rows) = base_rows();
        let attendance = compute_attendance(&attendance_rows, None, Some("张三"));
        let payment = compute_payments(&payment_rows, None, Some("张三"));
        let pricing = pricing();
        let ctx = CheckContext {
            attendance: &attendance,
            payment: &payment,
            pricing: &pricing,
            person_name: Some("张三"),
            role: Some(Role::Member),
            command_errors: &[],
            name_key_conflicts: &[],
            project_name: Some("测试项目"),
            project_pool_issue: false,
            project_name_source: Some(ProjectNameSource::Command),
            project_ended: Some(true),
            require_project_ended: false,
            date_sets_consistent: true,
            version_note: "计算口径版本 v2025-11-25R52｜阻断模式：Hard",
        };

        let (checks, hard_failures) = run_checks(&ctx);

        assert!(hard_failures.is_empty(), "{:?}", hard_failures);
        assert!(checks.iter().any(|c| c.code == "A" && c.passed));
        assert!(!checks.iter().any(|c| c.code == "L2"));
    }

    #[test]
    fn test_empty_tables_fail_header_check() {
        let attendance = compute_attendance(&[], None, Some("张三"));
        let payment = compute_payments(&[], None, Some("张三"));
        let pricing = pricing();
        let ctx = CheckContext {
            attendance: &attendance,
            payment: &payment,
            pricing: &pricing,
            person_name: Some("张三"),
            role: Some(Role::Member),
            command_errors: &[],
            name_key_conflicts: &[],
            project_name: Some("测试项目"),
            project_pool_issue: false,
            project_name_source: None,
            project_ended: Some(true),
            require_project_ended: false,
            date_sets_consistent: true,
            version_note: "v",
        };

        let (_, hard_failures) = run_checks(&ctx);

        assert!(hard_failures.iter().any(|c| c.code == "A"));
    }

    #[test]
    fn test_project_pool_requires_command() {
        let (attendance_rows, payment_rows) = base_rows();
        let attendance = compute_attendance(&attendance_rows, None, Some("张三"));
        let payment = compute_payments(&payment_rows, None, Some("张三"));
        let pricing = pricing();
        let mut ctx = CheckContext {
            attendance: &attendance,
            payment: &payment,
            pricing: &pricing,
            person_name: Some("张三"),
            role: Some(Role::Member),
            command_errors: &[],
            name_key_conflicts: &[],
            project_name: Some("项目A"),
            project_pool_issue: true,
            project_name_source: Some(ProjectNameSource::Derived),
            project_ended: Some(true),
            require_project_ended: false,
            date_sets_consistent: true,
            version_note: "v",
        };

        let (_, hard_failures) = run_checks(&ctx);
        assert!(hard_failures
            .iter()
            .any(|c| c.code == "B" && c.detail.contains("项目池包含多个项目")));

        ctx.project_name_source = Some(ProjectNameSource::Command);
        let (_, hard_failures) = run_checks(&ctx);
        assert!(!hard_failures.iter().any(|c| c.code == "B"));

        // 项目名推导失败（None）时不能放行
        ctx.project_name = None;
        let (_, hard_failures) = run_checks(&ctx);
        assert!(hard_failures
            .iter()
            .any(|c| c.code == "B" && c.detail == "未识别项目名"));
    }

    #[test]
    fn test_require_project_ended_gate() {
        let (attendance_rows, payment_rows) = base_rows();
        let attendance = compute_attendance(&attendance_rows, None, Some("张三"));
        let payment = compute_payments(&payment_rows, None, Some("张三"));
        let pricing = pricing();
        let ctx = CheckContext {
            attendance: &attendance,
            payment: &payment,
            pricing: &pricing,
            person_name: Some("张三"),
            role: Some(Role::Member),
            command_errors: &[],
            name_key_conflicts: &[],
            project_name: Some("测试项目"),
            project_pool_issue: false,
            project_name_source: Some(ProjectNameSource::Command),
            project_ended: Some(false),
            require_project_ended: true,
            date_sets_consistent: true,
            version_note: "v",
        };

        let (_, hard_failures) = run_checks(&ctx);

        assert!(hard_failures
            .iter()
            .any(|c| c.code == "L2" && c.detail == "项目未结束"));
    }

    #[test]
    fn test_payable_recompute_mismatch_fails() {
        let (attendance_rows, payment_rows) = base_rows();
        let attendance = compute_attendance(&attendance_rows, None, Some("张三"));
        let payment = compute_payments(&payment_rows, None, Some("张三"));
        let mut pricing = pricing();
        pricing.payable = Money::from_yuan(1);
        let ctx = CheckContext {
            attendance: &attendance,
            payment: &payment,
            pricing: &pricing,
            person_name: Some("张三"),
            role: Some(Role::Member),
            command_errors: &[],
            name_key_conflicts: &[],
            project_name: Some("测试项目"),
            project_pool_issue: false,
            project_name_source: Some(ProjectNameSource::Command),
            project_ended: Some(true),
            require_project_ended: false,
            date_sets_consistent: true,
            version_note: "v",
        };

        let (_, hard_failures) = run_checks(&ctx);

        assert!(hard_failures.iter().any(|c| c.code == "E"));
    }

    #[test]
    fn test_pending_counter_is_soft() {
        let (attendance_rows, mut payment_rows) = base_rows();
        payment_rows.push(row(&[
            ("报销日期", "2025-11-03"),
            ("报销金额", "50"),
            ("报销状态", "待审核"),
            ("报销类型", "工资"),
            ("报销人员", "张三"),
            ("上传凭证", "V002"),
        ]));
        let attendance = compute_attendance(&attendance_rows, None, Some("张三"));
        let payment = compute_payments(&payment_rows, None, Some("张三"));
        let pricing = pricing();
        let ctx = CheckContext {
            attendance: &attendance,
            payment: &payment,
            pricing: &pricing,
            person_name: Some("张三"),
            role: Some(Role::Member),
            command_errors: &[],
            name_key_conflicts: &[],
            project_name: Some("测试项目"),
            project_pool_issue: false,
            project_name_source: Some(ProjectNameSource::Command),
            project_ended: Some(true),
            require_project_ended: false,
            date_sets_consistent: true,
            version_note: "v",
        };

        let (checks, hard_failures) = run_checks(&ctx);

        assert!(hard_failures.is_empty());
        let pending = checks.iter().find(|c| c.code == "P").unwrap();
        assert!(pending.detail.contains("待确认1条"));
        let summary: BTreeMap<String, usize> = payment.pending_summary();
        assert_eq!(summary["状态无效"], 1);
    }
}
