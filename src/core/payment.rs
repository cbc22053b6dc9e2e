//! 支付（报销）管道
//!
//! 从报销表（或合并表）筛出目标人员的支付记录，按类别分桶。
//! 路费类（油费/ETC/路费）属于项目开销，不进入个人结算，也不参与个人校验。

use crate::core::models::{cell, Money, Row};
use crate::core::names::name_key;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

const DATE_HEADERS: &[&str] = &["报销日期", "支付日期", "打款日期", "日期"];
const AMOUNT_HEADERS: &[&str] = &["报销金额", "金额", "支付金额", "实付金额"];
const STATUS_HEADERS: &[&str] = &["报销状态", "状态", "付款状态"];
const TYPE_HEADERS: &[&str] = &["报销类型", "费用类型", "费用类别", "类别", "类型", "科目"];
const NAME_HEADERS: &[&str] = &["报销人员", "姓名", "收款人", "人员"];
const PROJECT_HEADERS: &[&str] = &["项目", "项目名称"];
const VOUCHER_HEADERS: &[&str] = &["上传凭证", "凭证号", "凭证", "票据号", "流水号", "订单号"];
const REMARK_HEADERS: &[&str] = &["备注", "说明", "报销备注", "报销说明", "用途"];

const CANDIDATE_AMOUNT_HEADERS: &[&str] = &["金额", "报销金额", "支付金额", "实付金额"];
const CANDIDATE_TEXT_HEADERS: &[&str] = &[
    "报销类型",
    "费用类型",
    "类型",
    "类别",
    "科目",
    "报销状态",
    "状态",
    "付款状态",
    "凭证号",
    "上传凭证",
    "票据号",
    "流水号",
    "订单号",
    "备注",
    "用途",
    "说明",
    "报销说明",
];

const STATUS_WHITELIST: &[&str] = &[
    "已支付",
    "已转账",
    "已报销",
    "完成",
    "通过",
    "成功",
    "已结清",
    "OK",
    "已打款",
    "审核通过",
];

/// 支付类别（按报销类型关键词识别）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// 工资
    Wage,
    /// 餐补
    Meal,
    /// 预支
    Prepay,
    /// 路补（个人）
    Road,
    /// 路费（项目开销）
    Expense,
    /// 其他
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Wage => "工资",
            Category::Meal => "餐补",
            Category::Prepay => "预支",
            Category::Road => "路补",
            Category::Expense => "路费",
            Category::Other => "其他",
        };
        write!(f, "{}", label)
    }
}

/// 预支关键词先于工资判断，否则「工资预支」会被错归成工资
fn categorize(raw_type: &str) -> Category {
    let text = raw_type.trim();
    if ["预支", "借支", "预发"].iter().any(|k| text.contains(k)) {
        Category::Prepay
    } else if text.contains("工资") {
        Category::Wage
    } else if ["餐补", "伙食", "盒饭", "工作餐"].iter().any(|k| text.contains(k)) {
        Category::Meal
    } else if ["油费", "ETC", "路费"].iter().any(|k| text.contains(k)) {
        Category::Expense
    } else if ["路补", "顺风车", "拼车", "打车", "滴滴"]
        .iter()
        .any(|k| text.contains(k))
    {
        Category::Road
    } else {
        Category::Other
    }
}

/// 一条支付记录
#[derive(Debug, Clone)]
pub struct PaymentItem {
    pub date: String,
    pub name: String,
    pub project: String,
    pub amount: Money,
    pub category: Category,
    pub status: String,
    pub voucher: String,
    pub raw_type: String,
}

/// 待确认原因（汇总时按固定顺序输出）
pub const PENDING_REASON_ORDER: &[&str] = &[
    "状态缺失",
    "通过但状态缺失",
    "未通过",
    "状态无效",
    "类别待确认",
    "金额缺失",
];

/// 带原因的待确认记录
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub reason: &'static str,
    pub item: PaymentItem,
}

/// 支付管道输出
#[derive(Debug, Clone, Default)]
pub struct PaymentResult {
    /// 已支付的工资
    pub paid_items: Vec<PaymentItem>,
    /// 已支付的餐补
    pub meal_items: Vec<PaymentItem>,
    pub prepay_items: Vec<PaymentItem>,
    pub road_allowance_items: Vec<PaymentItem>,
    pub project_expense_items: Vec<PaymentItem>,
    pub pending_items: Vec<PendingItem>,
    pub invalid_status_items: Vec<PaymentItem>,
    pub missing_fields: Vec<String>,
    pub invalid_amounts: Vec<String>,
    pub missing_amount_candidates: Vec<String>,
    pub missing_type_candidates: Vec<String>,
    pub project_mismatches: Vec<String>,
    pub voucher_duplicates: Vec<String>,
    pub empty_voucher_duplicates: Vec<String>,
}

impl PaymentResult {
    pub fn paid_total(&self) -> Money {
        self.paid_items.iter().map(|item| item.amount).sum()
    }

    pub fn meal_total(&self) -> Money {
        self.meal_items.iter().map(|item| item.amount).sum()
    }

    pub fn prepay_total(&self) -> Money {
        self.prepay_items.iter().map(|item| item.amount).sum()
    }

    /// 待确认总条数（含金额缺失的疑似支付行）
    pub fn pending_count(&self) -> usize {
        self.pending_items.len() + self.missing_amount_candidates.len()
    }

    /// 按原因归并的待确认条数
    pub fn pending_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for pending in &self.pending_items {
            *summary.entry(pending.reason.to_string()).or_insert(0) += 1;
        }
        if !self.missing_amount_candidates.is_empty() {
            summary.insert("金额缺失".to_string(), self.missing_amount_candidates.len());
        }
        summary
    }
}

fn clean_amount_text(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ',' | '¥' | '￥' | '元' | ' ' | '\u{a0}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// 合并表守卫：该行是否携带支付信号
pub fn is_payment_candidate(row: &Row) -> bool {
    for header in CANDIDATE_AMOUNT_HEADERS {
        if !clean_amount_text(cell(row, header)).is_empty() {
            return true;
        }
    }
    CANDIDATE_TEXT_HEADERS
        .iter()
        .any(|header| !cell(row, header).trim().is_empty())
}

fn find_header<'a>(headers: &BTreeSet<String>, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .find(|candidate| headers.contains(**candidate))
        .copied()
}

fn collect_headers(rows: &[Row]) -> BTreeSet<String> {
    rows.iter()
        .flat_map(|row| row.keys())
        .map(|key| key.trim().to_string())
        .collect()
}

fn status_whitelisted(status: &str) -> bool {
    STATUS_WHITELIST.contains(&status)
}

/// 状态不在白名单时的待确认原因
fn pending_reason(status: &str, remark: &str) -> &'static str {
    if status.is_empty() {
        if remark.contains("通过") {
            "通过但状态缺失"
        } else {
            "状态缺失"
        }
    } else if ["未通过", "驳回", "拒绝"].iter().any(|k| status.contains(k)) {
        "未通过"
    } else {
        "状态无效"
    }
}

fn sort_items(items: &mut [PaymentItem]) {
    items.sort_by(|a, b| a.date.cmp(&b.date).then(a.amount.cmp(&b.amount)));
}

/// 计算支付结果。目标人员与项目按归一键/原文匹配，不命中的行跳过。
pub fn compute_payments(
    rows: &[Row],
    project_name: Option<&str>,
    target_person: Option<&str>,
) -> PaymentResult {
    let headers = collect_headers(rows);
    let date_key = find_header(&headers, DATE_HEADERS);
    let amount_key = find_header(&headers, AMOUNT_HEADERS);
    let status_key = find_header(&headers, STATUS_HEADERS);
    let type_key = find_header(&headers, TYPE_HEADERS);
    let person_key = find_header(&headers, NAME_HEADERS);
    let project_key = find_header(&headers, PROJECT_HEADERS);
    let voucher_key = find_header(&headers, VOUCHER_HEADERS);
    let remark_key = find_header(&headers, REMARK_HEADERS);

    let mut result = PaymentResult::default();
    for (key, label) in [
        (date_key, "日期"),
        (amount_key, "金额"),
        (status_key, "状态"),
        (type_key, "类型"),
        (person_key, "姓名"),
    ] {
        if key.is_none() {
            result.missing_fields.push(label.to_string());
        }
    }

    let target_key = target_person.map(name_key);
    let mut voucher_seen: HashSet<(String, String, i64)> = HashSet::new();
    let mut empty_voucher_seen: HashSet<(String, String, String, i64, String)> = HashSet::new();

    for (index, row) in rows.iter().enumerate() {
        let line_no = index + 1;
        if !is_payment_candidate(row) {
            continue;
        }
        let (
            Some(date_key),
            Some(amount_key),
            Some(status_key),
            Some(type_key),
            Some(person_key),
        ) = (date_key, amount_key, status_key, type_key, person_key)
        else {
            break;
        };
        let date = cell(row, date_key).trim().to_string();
        let amount_raw = cell(row, amount_key);
        let status = cell(row, status_key).trim().to_string();
        let raw_type = cell(row, type_key).trim().to_string();
        let name = cell(row, person_key).trim().to_string();
        let project = project_key.map(|key| cell(row, key).trim()).unwrap_or("").to_string();
        let voucher = voucher_key.map(|key| cell(row, key).trim()).unwrap_or("").to_string();
        let remark = remark_key.map(|key| cell(row, key).trim()).unwrap_or("").to_string();

        let category = categorize(&raw_type);
        if category == Category::Expense {
            // 项目开销行不阻断个人结算，无效的直接丢弃
            if project_name.is_some()
                && !project.is_empty()
                && Some(project.as_str()) != project_name
            {
                continue;
            }
            let cleaned = clean_amount_text(amount_raw);
            if let Some(amount) = Money::parse(&cleaned) {
                if status_whitelisted(&status) {
                    result.project_expense_items.push(PaymentItem {
                        date,
                        name,
                        project,
                        amount,
                        category,
                        status,
                        voucher,
                        raw_type,
                    });
                }
            }
            continue;
        }

        let cleaned = clean_amount_text(amount_raw);
        let amount = if cleaned.is_empty() {
            result.missing_amount_candidates.push(format!(
                "第{}行 疑似支付行但金额缺失: {}='{}'",
                line_no,
                amount_key,
                amount_raw.trim()
            ));
            continue;
        } else {
            match Money::parse(&cleaned) {
                Some(amount) => amount,
                None => {
                    result
                        .invalid_amounts
                        .push(format!("第{}行 金额='{}'", line_no, amount_raw.trim()));
                    continue;
                }
            }
        };

        if let Some(target_key) = &target_key {
            if !name.is_empty() && &name_key(&name) != target_key {
                continue;
            }
        }
        if let Some(wanted) = project_name {
            if !project.is_empty() && project != wanted {
                result
                    .project_mismatches
                    .push(format!("{}@{}: {}", name, date, project));
                continue;
            }
        }

        if raw_type.is_empty() {
            result.missing_type_candidates.push(format!(
                "第{}行 {}@{} 金额={}",
                line_no, name, date, amount
            ));
            continue;
        }

        let item = PaymentItem {
            date: date.clone(),
            name: name.clone(),
            project: project.clone(),
            amount,
            category,
            status: status.clone(),
            voucher: voucher.clone(),
            raw_type: raw_type.clone(),
        };

        let voucher_id = if voucher.is_empty() {
            "TEMP".to_string()
        } else {
            voucher.clone()
        };
        if !voucher_seen.insert((voucher_id.clone(), date.clone(), amount.cents())) {
            result
                .voucher_duplicates
                .push(format!("{}@{}:{}", voucher_id, date, amount));
        }
        if voucher.is_empty()
            && !empty_voucher_seen.insert((
                name.clone(),
                project.clone(),
                date.clone(),
                amount.cents(),
                raw_type.clone(),
            ))
        {
            result
                .empty_voucher_duplicates
                .push(format!("{}@{}@{}:{}", name, project, date, amount));
        }

        if !status_whitelisted(&status) {
            result.invalid_status_items.push(item.clone());
            result.pending_items.push(PendingItem {
                reason: pending_reason(&status, &remark),
                item,
            });
            continue;
        }

        match category {
            Category::Wage => result.paid_items.push(item),
            Category::Meal => result.meal_items.push(item),
            Category::Prepay => result.prepay_items.push(item),
            Category::Road => result.road_allowance_items.push(item),
            Category::Other => result.pending_items.push(PendingItem {
                reason: "类别待确认",
                item,
            }),
            Category::Expense => unreachable!(),
        }
    }

    sort_items(&mut result.paid_items);
    sort_items(&mut result.meal_items);
    sort_items(&mut result.prepay_items);
    sort_items(&mut result.road_allowance_items);
    sort_items(&mut result.project_expense_items);
    sort_items(&mut result.invalid_status_items);
    result.pending_items.sort_by(|a, b| {
        a.item
            .date
            .cmp(&b.item.date)
            .then(a.item.amount.cmp(&b.item.amount))
    });

    result
}

/// 收集支付表中出现过的所有人员（按项目过滤）
pub fn collect_payment_people(rows: &[Row], project_name: Option<&str>) -> BTreeSet<String> {
    let headers = collect_headers(rows);
    let Some(person_key) = find_header(&headers, NAME_HEADERS) else {
        return BTreeSet::new();
    };
    let project_key = find_header(&headers, PROJECT_HEADERS);
    let mut people = BTreeSet::new();
    for row in rows {
        if !is_payment_candidate(row) {
            continue;
        }
        let name = cell(row, person_key).trim();
        if name.is_empty() {
            continue;
        }
        let raw_project = project_key.map(|key| cell(row, key).trim()).unwrap_or("");
        if let Some(project) = project_name {
            if !raw_project.is_empty() && raw_project != project {
                continue;
            }
        }
        people.insert(name.to_string());
    }
    people
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn payment_row(date: &str, amount: &str, status: &str, kind: &str, voucher: &str) -> Row {
        row(&[
            ("报销日期", date),
            ("报销金额", amount),
            ("报销状态", status),
            ("报销类型", kind),
            ("报销人员", "王怀宇"),
            ("项目", "测试项目"),
            ("上传凭证", voucher),
        ])
    }

    #[test]
    fn test_categorize_prepay_before_wage() {
        assert_eq!(categorize("工资预支"), Category::Prepay);
        assert_eq!(categorize("工资"), Category::Wage);
        assert_eq!(categorize("餐补"), Category::Meal);
        assert_eq!(categorize("油费"), Category::Expense);
        assert_eq!(categorize("路费"), Category::Expense);
        assert_eq!(categorize("顺风车"), Category::Road);
        assert_eq!(categorize("不明"), Category::Other);
    }

    #[test]
    fn test_wage_only_filters_non_wage() {
        let rows = vec![
            payment_row("2025-11-04", "300", "已支付", "工资", "V001"),
            payment_row("2025-11-04", "120", "已支付", "工资预支", "V002"),
            payment_row("2025-11-05", "80", "已支付", "餐补", "M001"),
            payment_row("2025-11-06", "60", "状态无效", "路费", "R001"),
            payment_row("2025-11-07", "ABC", "已支付", "油费", "O001"),
        ];

        let result = compute_payments(&rows, Some("测试项目"), Some("王怀宇"));

        assert_eq!(result.paid_items.len(), 1);
        assert_eq!(result.paid_items[0].category, Category::Wage);
        assert_eq!(result.prepay_items.len(), 1);
        assert_eq!(result.prepay_total(), Money::from_yuan(120));
        assert_eq!(result.meal_items.len(), 1);
        assert!(result.pending_items.is_empty());
        assert!(result.missing_amount_candidates.is_empty());
        assert!(result.invalid_amounts.is_empty());
        assert!(result.invalid_status_items.is_empty());
    }

    #[test]
    fn test_merged_table_skips_attendance_rows() {
        let mut rows: Vec<Row> = (1..=50)
            .map(|day| {
                row(&[
                    ("施工日期", format!("2025-11-{:02}", day.min(30)).as_str()),
                    ("施工人员", "工人"),
                    ("是否施工", "是"),
                    ("报销日期", ""),
                    ("报销金额", ""),
                    ("报销状态", ""),
                    ("报销类型", ""),
                    ("报销人员", ""),
                    ("项目", ""),
                    ("上传凭证", ""),
                ])
            })
            .collect();
        rows.push(payment_row("2025-11-20", "2000", "已支付", "工资", "V200"));
        rows.push(payment_row("2025-11-21", "500", "已支付", "预支", "V201"));

        let result = compute_payments(&rows, Some("测试项目"), Some("王怀宇"));

        assert!(result.missing_amount_candidates.is_empty());
        assert_eq!(result.paid_items.len(), 1);
        assert_eq!(result.prepay_items.len(), 1);
    }

    #[test]
    fn test_amount_cleanup_and_totals() {
        let rows = vec![payment_row("2025-11-02", "￥1,200 元", "已支付", "工资", "V-001")];

        let result = compute_payments(&rows, Some("测试项目"), Some("王怀宇"));

        assert_eq!(result.paid_total(), Money::from_yuan(1200));
    }

    #[test]
    fn test_invalid_amount_collected() {
        let rows = vec![payment_row("2025-11-02", "12x0", "已支付", "工资", "V-001")];

        let result = compute_payments(&rows, None, None);

        assert_eq!(result.invalid_amounts, vec!["第1行 金额='12x0'"]);
        assert!(result.paid_items.is_empty());
    }

    #[test]
    fn test_missing_amount_candidate() {
        let rows = vec![payment_row("2025-11-02", "", "已支付", "工资", "V-001")];

        let result = compute_payments(&rows, None, None);

        assert_eq!(result.missing_amount_candidates.len(), 1);
        assert!(result.missing_amount_candidates[0].contains("第1行"));
    }

    #[test]
    fn test_voucher_duplicates() {
        let rows = vec![
            payment_row("2025-11-02", "100", "已支付", "工资", "V001"),
            payment_row("2025-11-02", "100", "已支付", "工资", "V001"),
            payment_row("2025-11-03", "50", "已支付", "餐补", ""),
            payment_row("2025-11-03", "50", "已支付", "餐补", ""),
        ];

        let result = compute_payments(&rows, None, None);

        assert_eq!(result.voucher_duplicates, vec!["V001@2025-11-02:100"]);
        assert_eq!(result.empty_voucher_duplicates.len(), 1);
    }

    #[test]
    fn test_pending_reasons() {
        let rows = vec![
            payment_row("2025-11-02", "100", "", "工资", "V001"),
            payment_row("2025-11-03", "100", "未通过", "工资", "V002"),
            payment_row("2025-11-04", "100", "待审核", "工资", "V003"),
            payment_row("2025-11-05", "100", "已支付", "杂项", "V004"),
        ];

        let result = compute_payments(&rows, None, None);

        let summary = result.pending_summary();
        assert_eq!(summary["状态缺失"], 1);
        assert_eq!(summary["未通过"], 1);
        assert_eq!(summary["状态无效"], 1);
        assert_eq!(summary["类别待确认"], 1);
        assert_eq!(result.pending_count(), 4);
        assert_eq!(result.invalid_status_items.len(), 3);
    }

    #[test]
    fn test_target_person_name_key_match() {
        let rows = vec![row(&[
            ("报销日期", "2025-11-03"),
            ("报销金额", "90"),
            ("报销状态", "已支付"),
            ("报销类型", "工资"),
            ("报销人员", "袁玉兵(P007)"),
            ("上传凭证", "V200"),
        ])];

        let result = compute_payments(&rows, None, Some("袁玉兵"));

        assert_eq!(result.paid_items.len(), 1);
    }

    #[test]
    fn test_collect_payment_people() {
        let rows = vec![
            payment_row("2025-11-02", "100", "已支付", "工资", "V001"),
            row(&[("报销人员", ""), ("报销金额", "")]),
        ];

        let people = collect_payment_people(&rows, Some("测试项目"));

        assert_eq!(people.into_iter().collect::<Vec<_>>(), vec!["王怀宇"]);
    }
}
