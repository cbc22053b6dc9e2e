//! 出勤管道
//!
//! 从出勤表（或合并表）提取目标人员的出勤日期集合与每日出勤模式。
//! 表头按同义词族解析，日期统一归一成 YYYY-MM-DD。

use crate::core::models::{cell, Role, Row};
use crate::core::names::{name_key, split_names};
use crate::core::payment::is_payment_candidate;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

const DATE_HEADERS: &[&str] = &["施工日期", "日期", "工作日期", "出勤日期"];
const NAME_HEADERS: &[&str] = &[
    "实际出勤人员",
    "施工人员",
    "出勤人员",
    "实际施工人员",
    "实际人员",
    "姓名",
];
const WORK_HEADERS: &[&str] = &[
    "是否施工",
    "今天是否施工",
    "是否施工?",
    "是否施工？",
    "出勤",
    "施工",
];
const VEHICLE_HEADERS: &[&str] = &["车辆", "车辆信息", "车牌"];
const PROJECT_HEADERS: &[&str] = &["项目", "项目名称"];
const MODE_HEADERS: &[&str] = &[
    "出勤模式",
    "出勤模式（填表用）",
    "出勤模式(填表用)",
    "配置出勤模式（引用）",
    "配置出勤模式(引用)",
];
const ROLE_HEADERS: &[&str] = &["角色", "职务"];

/// 每日出勤模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayMode {
    /// 单防撞（当日施工 1-2 人）
    SingleGuard,
    /// 全组
    FullGroup,
}

impl DayMode {
    fn parse(text: &str) -> Option<DayMode> {
        if text.contains("单防撞") {
            Some(DayMode::SingleGuard)
        } else if text.contains("全组") {
            Some(DayMode::FullGroup)
        } else {
            None
        }
    }
}

impl fmt::Display for DayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayMode::SingleGuard => write!(f, "单防撞"),
            DayMode::FullGroup => write!(f, "全组"),
        }
    }
}

/// 目标人员的四组日期集合（排序去重后）
#[derive(Debug, Clone, Default)]
pub struct DateSets {
    pub single_worked: Vec<String>,
    pub single_missed: Vec<String>,
    pub group_worked: Vec<String>,
    pub group_missed: Vec<String>,
}

impl DateSets {
    pub fn has_single_days(&self) -> bool {
        !self.single_worked.is_empty() || !self.single_missed.is_empty()
    }
}

/// 出勤管道输出
#[derive(Debug, Clone, Default)]
pub struct AttendanceResult {
    pub date_sets: DateSets,
    pub mode_by_date: BTreeMap<String, DayMode>,
    /// 表内角色列给出的角色（按显示名）
    pub role_by_person: HashMap<String, Role>,
    pub missing_fields: Vec<String>,
    pub invalid_dates: Vec<String>,
    pub invalid_work_values: Vec<String>,
    pub project_mismatches: Vec<String>,
    pub conflict_logs: Vec<String>,
    pub normalization_logs: Vec<String>,
    pub auto_corrections: Vec<String>,
    pub fangzhuang_hits: Vec<String>,
    pub has_vehicle_field: bool,
    pub has_explicit_mode: bool,
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

/// 是否施工取值分类
enum WorkFlag {
    Worked,
    Rested,
    Invalid,
}

fn classify_work_value(value: &str) -> WorkFlag {
    match value.trim() {
        "是" | "施工" | "出勤" | "1" | "Y" | "y" | "有" => WorkFlag::Worked,
        "" | "否" | "未施工" | "不施工" | "0" | "N" | "n" | "无" => WorkFlag::Rested,
        _ => WorkFlag::Invalid,
    }
}

/// 日期归一：兼容 年/月/日、点号、斜杠分隔与 YYYYMMDD。
/// 返回 (归一结果, 被改写的原始文本)。
fn normalize_date(value: &str) -> (Option<String>, Option<String>) {
    let raw = value.trim();
    if raw.is_empty() {
        return (None, None);
    }
    let replaced = raw
        .replace('年', "-")
        .replace('月', "-")
        .replace('日', "")
        .replace('/', "-")
        .replace('.', "-");
    let joined = replaced
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(&joined, format) {
            let canonical = parsed.format("%Y-%m-%d").to_string();
            if canonical == raw {
                return (Some(canonical), None);
            }
            return (Some(canonical), Some(raw.to_string()));
        }
    }
    (None, Some(raw.to_string()))
}

/// 计算出勤结果。`target_person` 为空时只产出逐日模式与日志。
pub fn compute_attendance(
    rows: &[Row],
    project_name: Option<&str>,
    target_person: Option<&str>,
) -> AttendanceResult {
    let headers = collect_headers(rows);
    let date_key = find_header(&headers, DATE_HEADERS);
    let person_key = find_header(&headers, NAME_HEADERS);
    let work_key = find_header(&headers, WORK_HEADERS);
    let vehicle_key = find_header(&headers, VEHICLE_HEADERS);
    let project_key = find_header(&headers, PROJECT_HEADERS);
    let mode_key = find_header(&headers, MODE_HEADERS);
    let role_key = find_header(&headers, ROLE_HEADERS);

    let mut result = AttendanceResult {
        has_vehicle_field: vehicle_key.is_some(),
        has_explicit_mode: mode_key.is_some(),
        ..AttendanceResult::default()
    };
    for (key, label) in [(date_key, "日期"), (person_key, "姓名"), (work_key, "是否施工")] {
        if key.is_none() {
            result.missing_fields.push(label.to_string());
        }
    }

    // (name_key, 日期) -> 是否施工
    let mut person_day_status: HashMap<(String, String), bool> = HashMap::new();
    let mut day_people_working: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut day_people_any: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut explicit_mode_by_date: BTreeMap<String, DayMode> = BTreeMap::new();

    for (index, row) in rows.iter().enumerate() {
        let line_no = index + 1;
        let (Some(date_key), Some(person_key), Some(work_key)) =
            (date_key, person_key, work_key)
        else {
            break;
        };
        let work_raw = cell(row, work_key);
        // 合并表里支付行不参与出勤统计
        if work_raw.trim().is_empty() && is_payment_candidate(row) {
            continue;
        }
        let date_raw = cell(row, date_key);
        let (parsed_date, rewritten) = normalize_date(date_raw);
        let Some(date) = parsed_date else {
            if !date_raw.trim().is_empty() {
                result
                    .invalid_dates
                    .push(format!("第{}行 日期='{}'", line_no, date_raw.trim()));
            }
            continue;
        };
        if let Some(raw) = rewritten {
            result
                .normalization_logs
                .push(format!("日期格式标准化: '{}' -> '{}'", raw, date));
        }
        let people = split_names(cell(row, person_key));
        if people.is_empty() {
            continue;
        }
        let is_work = match classify_work_value(work_raw) {
            WorkFlag::Worked => true,
            WorkFlag::Rested => false,
            WorkFlag::Invalid => {
                result
                    .invalid_work_values
                    .push(format!("第{}行 是否施工='{}'", line_no, work_raw.trim()));
                continue;
            }
        };
        let raw_project = project_key.map(|key| cell(row, key).trim()).unwrap_or("");
        if let Some(project) = project_name {
            if !raw_project.is_empty() && raw_project != project {
                for person in &people {
                    result
                        .project_mismatches
                        .push(format!("{}@{}: {}", person, date, raw_project));
                }
                continue;
            }
        }
        if let Some(mode_key) = mode_key {
            if let Some(mode) = DayMode::parse(cell(row, mode_key)) {
                explicit_mode_by_date.entry(date.clone()).or_insert(mode);
            }
        }
        let vehicle = vehicle_key.map(|key| cell(row, key).trim()).unwrap_or("");
        let table_role = role_key.and_then(|key| Role::parse(cell(row, key)));

        for person in &people {
            if !vehicle.is_empty() && vehicle.contains("防撞") {
                result
                    .fangzhuang_hits
                    .push(format!("{}@{}:{}", person, date, vehicle));
            }
            if let Some(role) = table_role {
                result.role_by_person.entry(person.clone()).or_insert(role);
            }
            let status_key = (name_key(person), date.clone());
            match person_day_status.get(&status_key) {
                Some(false) if is_work => {
                    person_day_status.insert(status_key, true);
                    result.conflict_logs.push(format!(
                        "同日冲突: {} {} 未施工->施工 (施工优先)",
                        person, date
                    ));
                    result
                        .auto_corrections
                        .push(format!("冲突消解: {} {} 按施工优先", person, date));
                    day_people_working
                        .entry(date.clone())
                        .or_default()
                        .insert(person.clone());
                    continue;
                }
                Some(true) if !is_work => {
                    result
                        .conflict_logs
                        .push(format!("同日冲突: {} {} 施工保持", person, date));
                    continue;
                }
                Some(_) => continue,
                None => {}
            }
            person_day_status.insert(status_key, is_work);
            day_people_any
                .entry(date.clone())
                .or_default()
                .insert(person.clone());
            if is_work {
                day_people_working
                    .entry(date.clone())
                    .or_default()
                    .insert(person.clone());
            }
        }
    }

    for date in day_people_any.keys() {
        let mode = explicit_mode_by_date.get(date).copied().unwrap_or_else(|| {
            let working = day_people_working.get(date).map(BTreeSet::len).unwrap_or(0);
            if (1..=2).contains(&working) {
                DayMode::SingleGuard
            } else {
                DayMode::FullGroup
            }
        });
        result.mode_by_date.insert(date.clone(), mode);
    }

    if let Some(target) = target_person {
        let target_key = name_key(target);
        for (date, mode) in &result.mode_by_date {
            // 目标人员当日没有记录时不做推断
            let Some(worked) = person_day_status.get(&(target_key.clone(), date.clone())) else {
                continue;
            };
            let bucket = match (mode, worked) {
                (DayMode::SingleGuard, true) => &mut result.date_sets.single_worked,
                (DayMode::SingleGuard, false) => &mut result.date_sets.single_missed,
                (DayMode::FullGroup, true) => &mut result.date_sets.group_worked,
                (DayMode::FullGroup, false) => &mut result.date_sets.group_missed,
            };
            bucket.push(date.clone());
        }
        for bucket in [
            &mut result.date_sets.single_worked,
            &mut result.date_sets.single_missed,
            &mut result.date_sets.group_worked,
            &mut result.date_sets.group_missed,
        ] {
            bucket.sort();
            bucket.dedup();
        }
    }

    result
}

/// 收集出勤表中出现过的所有人员（按项目过滤，合并表里的支付行忽略）
pub fn collect_attendance_people(rows: &[Row], project_name: Option<&str>) -> BTreeSet<String> {
    let headers = collect_headers(rows);
    let Some(person_key) = find_header(&headers, NAME_HEADERS) else {
        return BTreeSet::new();
    };
    let work_key = find_header(&headers, WORK_HEADERS);
    let project_key = find_header(&headers, PROJECT_HEADERS);
    let mut people = BTreeSet::new();
    for row in rows {
        let work_raw = work_key.map(|key| cell(row, key)).unwrap_or("");
        if work_raw.trim().is_empty() && is_payment_candidate(row) {
            continue;
        }
        let raw_project = project_key.map(|key| cell(row, key).trim()).unwrap_or("");
        if let Some(project) = project_name {
            if !raw_project.is_empty() && raw_project != project {
                continue;
            }
        }
        for person in split_names(cell(row, person_key)) {
            people.insert(person);
        }
    }
    people
}
