//! 选表模块
//!
//! 扫描数据目录下的CSV，按表头锚点打分识别出勤表/报销表/合并表，
//! 并在歧义时给出阻断说明。归档目录不参与扫描。

use crate::storage::csv_loader::{self, LoadError};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub const ATTENDANCE_KEYWORDS: &[&str] = &[
    "日期",
    "施工日期",
    "工作日期",
    "姓名",
    "施工人员",
    "实际出勤人员",
    "项目名",
    "项目",
    "项目名称",
    "是否施工",
    "出勤模式",
    "车辆",
    "车牌",
];
pub const ATTENDANCE_STRONG_KEYWORDS: &[&str] = &[
    "是否施工",
    "出勤模式",
    "车辆",
    "车牌",
    "施工人员",
    "实际出勤人员",
];
pub const PAYMENT_KEYWORDS: &[&str] = &[
    "报销类型",
    "费用类型",
    "报销人员",
    "姓名",
    "报销日期",
    "日期",
    "报销金额",
    "金额",
    "报销状态",
    "状态",
    "上传凭证",
    "凭证号",
    "报销说明",
    "备注",
    "项目",
    "项目名",
];
pub const PAYMENT_STRONG_KEYWORDS: &[&str] = &[
    "报销类型",
    "费用类型",
    "报销金额",
    "报销状态",
    "上传凭证",
    "凭证号",
    "报销说明",
];

/// 状态盘点用的模式提示词
pub const ONLY_MODE_HINTS: &[&str] = &["ONLY", "极简", "00_出勤", "99_报销"];
pub const PROJECT_POOL_HINTS: &[&str] = &["2026年-项目池_施工表", "2026年-项目池_报销表"];

const COMMON_SUFFIXES: &[&str] = &[
    "出勤表",
    "施工表",
    "考勤表",
    "报销表",
    "支付表",
    "付款表",
    "支付记录",
    "_数据表_数据",
    "_表格",
    "_问卷",
    "_收集结果",
];

const ATTENDANCE_FIELD_CANDIDATES: &[(&str, &[&str])] = &[
    ("日期", &["施工日期", "日期", "工作日期", "出勤日期"]),
    (
        "姓名",
        &["实际出勤人员", "施工人员", "出勤人员", "实际施工人员", "实际人员", "姓名"],
    ),
    ("项目", &["项目", "项目名称"]),
    ("是否施工", &["是否施工", "今天是否施工", "是否施工?", "是否施工？"]),
    (
        "出勤模式",
        &["出勤模式", "出勤模式(填表用)", "配置出勤模式(引用)"],
    ),
];
const PAYMENT_FIELD_CANDIDATES: &[(&str, &[&str])] = &[
    ("日期", &["报销日期", "支付日期", "打款日期", "日期"]),
    ("姓名", &["报销人员", "姓名", "收款人", "人员"]),
    ("项目", &["项目", "项目名称"]),
    ("类型", &["报销类型", "类型", "费用类型", "科目", "类别", "费用类别"]),
    ("金额", &["报销金额", "金额", "支付金额", "实付金额"]),
    ("状态", &["报销状态", "状态", "付款状态"]),
    ("凭证", &["上传凭证", "凭证号", "凭证", "票据号", "流水号", "订单号"]),
];

const SCORE_THRESHOLD: usize = 2;

/// CSV候选与锚点命中分
#[derive(Debug, Clone)]
pub struct CsvCandidate {
    pub path: PathBuf,
    pub attendance_score: usize,
    pub attendance_strong_hits: usize,
    pub payment_score: usize,
    pub payment_strong_hits: usize,
    pub cleaned_headers: Vec<String>,
}

impl CsvCandidate {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn is_combined(&self) -> bool {
        self.attendance_score >= SCORE_THRESHOLD && self.payment_score >= SCORE_THRESHOLD
    }
}

/// 选表结果
#[derive(Debug)]
pub enum Selection {
    /// (出勤表, 报销表)；合并表时两者相同
    Chosen {
        attendance: CsvCandidate,
        payment: CsvCandidate,
        audit: Vec<String>,
    },
    /// 阻断，附给用户的完整说明
    Blocked { messages: Vec<String> },
}

/// 表头清洗：去BOM、全角括号与全角空格归一、空白折叠
pub fn clean_header(text: &str) -> String {
    let replaced = text
        .replace('\u{feff}', "")
        .replace('（', "(")
        .replace('）', ")")
        .replace('\u{3000}', " ");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn score_headers(headers: &[String], keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|keyword| headers.iter().any(|header| header.contains(*keyword)))
        .count()
}

/// 读表头并打分
pub fn detect_table_role(path: &Path) -> Result<CsvCandidate, LoadError> {
    let cleaned_headers: Vec<String> = csv_loader::read_headers(path)?
        .iter()
        .map(|header| clean_header(header))
        .collect();
    Ok(CsvCandidate {
        path: path.to_path_buf(),
        attendance_score: score_headers(&cleaned_headers, ATTENDANCE_KEYWORDS),
        attendance_strong_hits: score_headers(&cleaned_headers, ATTENDANCE_STRONG_KEYWORDS),
        payment_score: score_headers(&cleaned_headers, PAYMENT_KEYWORDS),
        payment_strong_hits: score_headers(&cleaned_headers, PAYMENT_STRONG_KEYWORDS),
        cleaned_headers,
    })
}

fn in_archive(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str().to_string_lossy().contains("归档"))
}

/// 递归扫描目录下的CSV候选（路径含「归档」的跳过）
pub fn scan_csv_candidates(data_dir: &Path) -> Vec<CsvCandidate> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(data_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() || in_archive(path) {
            continue;
        }
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            continue;
        }
        match detect_table_role(path) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => warn!(path = %path.display(), error = %err, "跳过无法读取的CSV"),
        }
    }
    candidates
}

/// 从候选中选出 (出勤表, 报销表)
///
/// 合并表唯一时直接选中；两份CSV按差值分正向配对；
/// 更多候选时要求两侧各有唯一的达标最高分。
pub fn select_input_paths(candidates: &[CsvCandidate]) -> Option<(CsvCandidate, CsvCandidate)> {
    let combined: Vec<&CsvCandidate> = candidates
        .iter()
        .filter(|candidate| candidate.is_combined())
        .collect();
    if !combined.is_empty() {
        if combined.len() == 1 {
            let candidate = combined[0].clone();
            return Some((candidate.clone(), candidate));
        }
        return None;
    }
    if candidates.is_empty() {
        return None;
    }

    if candidates.len() == 2 {
        let attendance_best = candidates.iter().max_by_key(|candidate| {
            candidate.attendance_score as i64 - candidate.payment_score as i64
        })?;
        let payment_best = candidates.iter().max_by_key(|candidate| {
            candidate.payment_score as i64 - candidate.attendance_score as i64
        })?;
        let attendance_delta =
            attendance_best.attendance_score as i64 - attendance_best.payment_score as i64;
        let payment_delta =
            payment_best.payment_score as i64 - payment_best.attendance_score as i64;
        if attendance_delta > 0 && payment_delta > 0 && attendance_best.path != payment_best.path {
            return Some((attendance_best.clone(), payment_best.clone()));
        }
        return None;
    }

    let mut by_attendance: Vec<&CsvCandidate> = candidates.iter().collect();
    by_attendance.sort_by(|a, b| b.attendance_score.cmp(&a.attendance_score));
    let mut by_payment: Vec<&CsvCandidate> = candidates.iter().collect();
    by_payment.sort_by(|a, b| b.payment_score.cmp(&a.payment_score));

    let attendance_best = by_attendance[0];
    let payment_best = by_payment[0];
    if attendance_best.attendance_score < SCORE_THRESHOLD
        || payment_best.payment_score < SCORE_THRESHOLD
    {
        return None;
    }
    if by_attendance.len() > 1 && by_attendance[1].attendance_score == attendance_best.attendance_score
    {
        return None;
    }
    if by_payment.len() > 1 && by_payment[1].payment_score == payment_best.payment_score {
        return None;
    }
    Some((attendance_best.clone(), payment_best.clone()))
}

fn summarize_headers(headers: &[String]) -> String {
    const LIMIT: usize = 30;
    if headers.is_empty() {
        return "(空表头)".to_string();
    }
    if headers.len() <= LIMIT {
        return headers.join("｜");
    }
    format!("{}...(共{}列)", headers[..LIMIT].join("｜"), headers.len())
}

fn format_mtime(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|time| {
            DateTime::<Local>::from(time)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| "(未知)".to_string())
}

fn relative_display(path: &Path, base_dir: &Path) -> String {
    path.strip_prefix(base_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn match_header<'a>(cleaned_headers: &'a [String], candidates: &[&str]) -> Option<&'a str> {
    for candidate in candidates {
        let candidate = clean_header(candidate);
        for header in cleaned_headers {
            if header == &candidate || header.contains(&candidate) {
                return Some(header);
            }
        }
    }
    None
}

fn field_mapping_line(candidate: &CsvCandidate, mapping: &[(&str, &[&str])]) -> String {
    mapping
        .iter()
        .map(|(field, names)| {
            let matched = match_header(&candidate.cleaned_headers, names).unwrap_or("未命中");
            format!("{}={}", field, matched)
        })
        .collect::<Vec<_>>()
        .join("，")
}

fn selection_audit(
    attendance: &CsvCandidate,
    payment: &CsvCandidate,
    base_dir: &Path,
) -> Vec<String> {
    vec![
        "选表审计：".to_string(),
        format!("- 出勤表: {}", relative_display(&attendance.path, base_dir)),
        format!("- 报销表: {}", relative_display(&payment.path, base_dir)),
        format!(
            "- 出勤表命中: 出勤命中 {}, 报销命中 {}, 差值 {}",
            attendance.attendance_score,
            attendance.payment_score,
            attendance.attendance_score as i64 - attendance.payment_score as i64
        ),
        format!(
            "- 报销表命中: 出勤命中 {}, 报销命中 {}, 差值 {}",
            payment.attendance_score,
            payment.payment_score,
            payment.payment_score as i64 - payment.attendance_score as i64
        ),
        format!(
            "- 出勤表表头(清洗): {}",
            summarize_headers(&attendance.cleaned_headers)
        ),
        format!(
            "- 报销表表头(清洗): {}",
            summarize_headers(&payment.cleaned_headers)
        ),
        format!(
            "- 出勤表字段映射: {}",
            field_mapping_line(attendance, ATTENDANCE_FIELD_CANDIDATES)
        ),
        format!(
            "- 报销表字段映射: {}",
            field_mapping_line(payment, PAYMENT_FIELD_CANDIDATES)
        ),
    ]
}

fn candidate_report(candidates: &[CsvCandidate], base_dir: &Path) -> Vec<String> {
    let mut lines = vec!["候选清单：".to_string()];
    let mut sorted: Vec<&CsvCandidate> = candidates.iter().collect();
    sorted.sort_by_key(|candidate| candidate.file_name());
    for candidate in sorted {
        lines.push(format!(
            "- {}: mtime={}, 出勤命中 {}, 报销命中 {}, 表头: {}",
            relative_display(&candidate.path, base_dir),
            format_mtime(&candidate.path),
            candidate.attendance_score,
            candidate.payment_score,
            summarize_headers(&candidate.cleaned_headers)
        ));
    }
    lines
}

fn blocking_reason(candidates: &[CsvCandidate], base_dir: &Path) -> Vec<String> {
    let attendance_candidates = candidates
        .iter()
        .filter(|c| c.attendance_score >= SCORE_THRESHOLD)
        .count();
    let payment_candidates = candidates
        .iter()
        .filter(|c| c.payment_score >= SCORE_THRESHOLD)
        .count();
    let combined_candidates = candidates.iter().filter(|c| c.is_combined()).count();

    let mut lines = vec!["【阻断｜选表】无法唯一确定出勤/报销表。".to_string()];
    if combined_candidates > 0 && candidates.len() > 1 {
        lines.push("检测到合并表候选，但同时存在其他CSV。".to_string());
    }
    if attendance_candidates == 0 {
        lines.push("缺少可识别的施工/出勤表。".to_string());
    }
    if payment_candidates == 0 {
        lines.push("缺少可识别的报销/支付表。".to_string());
    }
    if attendance_candidates > 1 {
        lines.push("发现多份施工/出勤候选表。".to_string());
    }
    if payment_candidates > 1 {
        lines.push("发现多份报销/支付候选表。".to_string());
    }
    lines.extend(candidate_report(candidates, base_dir));
    lines.push("请把不需要的 CSV 移出 data/当前 后重试（不要求改名）。".to_string());
    lines
}

/// 解析数据目录：优先 data/当前，其次 data/ 兜底
pub fn resolve_input_paths(data_dir: &Path) -> Selection {
    let current_dir = data_dir.join("当前");
    if current_dir.exists() {
        let candidates = scan_csv_candidates(&current_dir);
        if candidates.is_empty() {
            return Selection::Blocked {
                messages: vec!["请把本次CSV拖到 数据/当前/（文件名随意）".to_string()],
            };
        }
        if candidates.len() > 2 {
            let mut messages =
                vec!["当前目录只保留 1(合并) 或 2(分开) 个CSV".to_string()];
            messages.extend(candidate_report(&candidates, data_dir));
            return Selection::Blocked { messages };
        }
        return match select_input_paths(&candidates) {
            Some((attendance, payment)) => {
                let audit = selection_audit(&attendance, &payment, data_dir);
                Selection::Chosen {
                    attendance,
                    payment,
                    audit,
                }
            }
            None if candidates.len() == 1 => Selection::Blocked {
                messages: vec![
                    "当前目录只有 1 个 CSV，无法判定为合并表，请再放一份".to_string(),
                ],
            },
            None => Selection::Blocked {
                messages: blocking_reason(&candidates, data_dir),
            },
        };
    }

    let attendance_path = data_dir.join("attendance.csv");
    let payment_path = data_dir.join("payment.csv");
    if attendance_path.exists() && payment_path.exists() {
        if let (Ok(attendance), Ok(payment)) = (
            detect_table_role(&attendance_path),
            detect_table_role(&payment_path),
        ) {
            let audit = selection_audit(&attendance, &payment, data_dir);
            return Selection::Chosen {
                attendance,
                payment,
                audit,
            };
        }
    }

    let candidates = scan_csv_candidates(data_dir);
    if candidates.is_empty() {
        return Selection::Blocked {
            messages: vec!["把 CSV 放到 data/ 目录下（文件名随意）".to_string()],
        };
    }
    match select_input_paths(&candidates) {
        Some((attendance, payment)) => {
            let audit = selection_audit(&attendance, &payment, data_dir);
            Selection::Chosen {
                attendance,
                payment,
                audit,
            }
        }
        None => Selection::Blocked {
            messages: blocking_reason(&candidates, data_dir),
        },
    }
}

/// 查找口令文件
#[derive(Debug)]
pub enum CommandFile {
    Found(PathBuf),
    /// 未找到或有歧义，附提示信息
    Blocked { messages: Vec<String> },
}

pub fn find_command_file(data_dir: &Path) -> CommandFile {
    let current_dir = data_dir.join("当前");
    if !current_dir.exists() {
        return CommandFile::Blocked {
            messages: vec![
                "请把口令.txt 放到 data/当前/（可放子目录）".to_string(),
                "示例口令：工资：王怀宇 组长 项目已结束=是 项目=溧马一溧芜设标-凌云".to_string(),
            ],
        };
    }
    let mut matches: Vec<PathBuf> = WalkDir::new(&current_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file() && entry.file_name() == std::ffi::OsStr::new("口令.txt")
        })
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();
    match matches.len() {
        0 => CommandFile::Blocked {
            messages: vec![
                "未找到口令文件，请创建 data/当前/口令.txt（UTF-8，可放子目录）".to_string(),
                "示例口令：工资：王怀宇 组长 项目已结束=是 项目=溧马一溧芜设标-凌云".to_string(),
            ],
        },
        1 => CommandFile::Found(matches.remove(0)),
        _ => {
            let mut messages =
                vec!["【阻断｜口令】发现多个口令.txt，请只保留 1 份后重试：".to_string()];
            for path in &matches {
                messages.push(format!(
                    "- {}（mtime={}）",
                    relative_display(path, data_dir),
                    format_mtime(path)
                ));
            }
            CommandFile::Blocked { messages }
        }
    }
}

/// 从CSV文件名兜底推导项目名：去掉尾部 (N)/（N） 与常见表名后缀
/// 从文件名推导项目名；剥完后为空视为未识别
pub fn derive_project_name(path: &Path) -> Option<String> {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = strip_trailing_copy_marker(stem.trim());
    for suffix in COMMON_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
            break;
        }
    }
    let name = name.trim_matches(|c| c == '-' || c == '_');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn strip_trailing_copy_marker(name: &str) -> String {
    let trimmed = name.trim_end();
    for (open, close) in [('(', ')'), ('（', '）')] {
        if let Some(rest) = trimmed.strip_suffix(close) {
            if let Some(pos) = rest.rfind(open) {
                let inner = &rest[pos + open.len_utf8()..];
                if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
                    return rest[..pos].trim_end().to_string();
                }
            }
        }
    }
    trimmed.to_string()
}

/// 状态盘点的运行模式判定
pub fn resolve_mode(candidates: &[CsvCandidate]) -> (String, String) {
    let names: Vec<String> = candidates.iter().map(CsvCandidate::file_name).collect();
    if candidates.len() == 2
        && names
            .iter()
            .all(|name| ONLY_MODE_HINTS.iter().any(|hint| name.contains(hint)))
    {
        return (
            "A) ONLY/极简双表模式".to_string(),
            "文件名包含 ONLY/极简/00_出勤/99_报销 且仅2个CSV".to_string(),
        );
    }
    if names
        .iter()
        .any(|name| PROJECT_POOL_HINTS.iter().any(|hint| name.contains(hint)))
    {
        return (
            "B) 项目池原表模式".to_string(),
            "文件名包含 2026年-项目池_施工表/报销表".to_string(),
        );
    }
    if candidates.len() == 1 && candidates[0].is_combined() {
        return (
            "C) 合并表模式".to_string(),
            "单CSV且出勤+报销锚点同时命中".to_string(),
        );
    }
    (
        "未知/需确认".to_string(),
        "未命中 ONLY/项目池/合并表判定规则".to_string(),
    )
}

/// 盘点报告里的CSV清单
pub fn csv_scan_lines(candidates: &[CsvCandidate]) -> Vec<String> {
    if candidates.is_empty() {
        return vec!["- CSV列表: 无".to_string()];
    }
    let mut lines = vec!["- CSV列表:".to_string()];
    for candidate in candidates {
        let size = std::fs::metadata(&candidate.path)
            .map(|meta| meta.len())
            .unwrap_or(0);
        lines.push(format!("  * 文件名: {}", candidate.file_name()));
        lines.push(format!("    大小: {} bytes", size));
        lines.push(format!(
            "    表头(前30列): {}",
            summarize_headers(&candidate.cleaned_headers)
        ));
        lines.push(format!(
            "    锚点命中: 出勤 {}, 报销 {}",
            candidate.attendance_score, candidate.payment_score
        ));
    }
    lines
}

/// 盘点报告里的选表审计段
pub fn selection_audit_lines(candidates: &[CsvCandidate]) -> Vec<String> {
    let mut lines = vec!["选表审计：".to_string()];
    if candidates.is_empty() {
        lines.push("- 当前无CSV候选，无法选表".to_string());
        return lines;
    }
    let mut sorted: Vec<&CsvCandidate> = candidates.iter().collect();
    sorted.sort_by_key(|candidate| candidate.file_name());
    for candidate in sorted {
        lines.push(format!(
            "- 候选: {} | 出勤命中 {}, 报销命中 {}, 差值分 出勤-报销 {}, 报销-出勤 {}",
            candidate.file_name(),
            candidate.attendance_score,
            candidate.payment_score,
            candidate.attendance_score as i64 - candidate.payment_score as i64,
            candidate.payment_score as i64 - candidate.attendance_score as i64
        ));
    }
    match select_input_paths(candidates) {
        Some((attendance, payment)) => lines.push(format!(
            "- 选表结果: 出勤表={} ｜ 报销表={}",
            attendance.file_name(),
            payment.file_name()
        )),
        None => {
            lines.push("- 选表结果: 阻断".to_string());
            lines.push(
                "- 阻断原因: 选表歧义或命中不足，请只保留 1 出勤 + 1 报销或 1 合并表"
                    .to_string(),
            );
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_csv(dir: &Path, name: &str, headers: &[&str]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("{}\n", headers.join(","))).unwrap();
        path
    }

    #[test]
    fn test_clean_header_normalizes_parens_and_space() {
        assert_eq!(clean_header("出勤模式（填表用）"), "出勤模式(填表用)");
        assert_eq!(clean_header("\u{feff} 施工  日期 "), "施工 日期");
    }

    #[test]
    fn test_current_dir_empty_blocks() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("当前")).unwrap();

        let Selection::Blocked { messages } = resolve_input_paths(dir.path()) else {
            panic!("expected blocked");
        };
        assert!(messages
            .iter()
            .any(|m| m.contains("请把本次CSV拖到 数据/当前/（文件名随意）")));
    }

    #[test]
    fn test_current_dir_single_combined_selected() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("当前");
        std::fs::create_dir_all(&current).unwrap();
        let combined = write_csv(&current, "combined.csv", &["施工日期", "报销日期", "报销金额"]);

        let Selection::Chosen {
            attendance,
            payment,
            ..
        } = resolve_input_paths(dir.path())
        else {
            panic!("expected chosen");
        };
        assert_eq!(attendance.path, combined);
        assert_eq!(payment.path, combined);
    }

    #[test]
    fn test_current_dir_single_non_combined_blocks() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("当前");
        std::fs::create_dir_all(&current).unwrap();
        write_csv(&current, "attendance.csv", &["施工日期", "是否施工", "施工人员"]);

        let Selection::Blocked { messages } = resolve_input_paths(dir.path()) else {
            panic!("expected blocked");
        };
        assert!(messages
            .iter()
            .any(|m| m.contains("当前目录只有 1 个 CSV，无法判定为合并表，请再放一份")));
    }

    #[test]
    fn test_current_dir_two_csvs_paired() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("当前");
        std::fs::create_dir_all(&current).unwrap();
        let attendance = write_csv(&current, "a.csv", &["施工日期", "是否施工", "施工人员"]);
        let payment = write_csv(&current, "b.csv", &["报销日期", "报销金额", "报销状态"]);

        let Selection::Chosen {
            attendance: selected_attendance,
            payment: selected_payment,
            audit,
        } = resolve_input_paths(dir.path())
        else {
            panic!("expected chosen");
        };
        assert_eq!(selected_attendance.path, attendance);
        assert_eq!(selected_payment.path, payment);
        assert!(audit.iter().any(|line| line.contains("选表审计")));
    }

    #[test]
    fn test_current_dir_overflow_blocks() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("当前");
        std::fs::create_dir_all(&current).unwrap();
        for index in 0..3 {
            write_csv(&current, &format!("file_{}.csv", index), &["施工日期"]);
        }

        let Selection::Blocked { messages } = resolve_input_paths(dir.path()) else {
            panic!("expected blocked");
        };
        assert!(messages
            .iter()
            .any(|m| m.contains("当前目录只保留 1(合并) 或 2(分开) 个CSV")));
    }

    #[test]
    fn test_archive_dir_ignored() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("归档");
        std::fs::create_dir_all(&archive).unwrap();
        write_csv(&archive, "archived.csv", &["施工日期", "报销日期"]);

        let Selection::Blocked { messages } = resolve_input_paths(dir.path()) else {
            panic!("expected blocked");
        };
        assert!(messages
            .iter()
            .any(|m| m.contains("把 CSV 放到 data/ 目录下（文件名随意）")));
    }

    #[test]
    fn test_multiple_command_files_block() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("当前");
        std::fs::create_dir_all(current.join("sub")).unwrap();
        std::fs::write(current.join("口令.txt"), "工资：张三 组员 项目已结束=是").unwrap();
        std::fs::write(current.join("sub/口令.txt"), "工资：李四 组员 项目已结束=是").unwrap();

        let CommandFile::Blocked { messages } = find_command_file(dir.path()) else {
            panic!("expected blocked");
        };
        assert!(messages
            .iter()
            .any(|m| m.contains("发现多个口令.txt")));
    }

    #[test]
    fn test_find_single_command_file_in_subdir() {
        let dir = tempdir().unwrap();
        let current = dir.path().join("当前");
        std::fs::create_dir_all(current.join("sub")).unwrap();
        std::fs::write(current.join("sub/口令.txt"), "工资：张三 组员 项目已结束=是").unwrap();

        let CommandFile::Found(path) = find_command_file(dir.path()) else {
            panic!("expected found");
        };
        assert!(path.ends_with("sub/口令.txt"));
    }

    #[test]
    fn test_derive_project_name_strips_suffix_and_marker() {
        assert_eq!(
            derive_project_name(Path::new("溧马一溧芜设标-凌云出勤表 (3).csv")).as_deref(),
            Some("溧马一溧芜设标-凌云")
        );
        assert_eq!(
            derive_project_name(Path::new("演示项目报销表（2）.csv")).as_deref(),
            Some("演示项目")
        );
        assert_eq!(
            derive_project_name(Path::new("演示项目.csv")).as_deref(),
            Some("演示项目")
        );
    }

    #[test]
    fn test_derive_project_name_empty_stem_is_none() {
        assert_eq!(derive_project_name(Path::new("出勤表.csv")), None);
        assert_eq!(derive_project_name(Path::new("--_.csv")), None);
    }

    #[test]
    fn test_resolve_mode_combined() {
        let candidate = CsvCandidate {
            path: PathBuf::from("combined.csv"),
            attendance_score: 3,
            attendance_strong_hits: 1,
            payment_score: 4,
            payment_strong_hits: 2,
            cleaned_headers: vec![],
        };
        let (mode, _) = resolve_mode(&[candidate]);
        assert!(mode.starts_with("C)"));
    }
}
