//! 口令解析模块
//!
//! 口令.txt 里的自由文本有两种形态：
//! - 单人/项目命令行：`工资：王怀宇 组长 项目已结束=是 项目=xxx`、`项目结算：xxx ...`
//! - 团体口令：按 `组长：`/`路补=有：`/`路补=无：` 名单展开成逐人工资命令
//!
//! 解析容忍全角冒号、全角等号、全角空格、BOM 与竖线分隔。

use crate::core::models::{cell, Money, NameKeyConflict, Role, Row};
use crate::core::names::{name_key, split_names};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// 路补口令：计算固定路补
pub const ROAD_CALC: &str = "计算路补";
/// 路补口令：不计路补
pub const ROAD_NONE: &str = "无路补";

const ROLE_KEYWORDS: &[&str] = &["组长", "组员"];
const PROJECT_HEADERS: &[&str] = &["项目", "项目名称", "项目名"];
const PROJECT_ENDED_KEYS: &[&str] = &["项目已结束", "项目结束", "项目是否结束"];

/// 口令整体模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// 工资：单人结算
    Single,
    /// 项目结算：批量结算
    Project,
}

/// 路补设置来源，用于冲突仲裁
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoadSource {
    /// 工资行内 路补=有/无
    WageLine,
    /// 独立 路补口令= 行
    Standalone,
}

/// 解析后的口令
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub mode: Option<CommandMode>,
    pub person_name: Option<String>,
    pub role: Option<Role>,
    pub project_ended: Option<bool>,
    pub project_name: Option<String>,
    /// 路补口令（见 [`ROAD_CALC`] / [`ROAD_NONE`]）
    pub road_cmd: Option<String>,
    /// 角色覆盖：显示名 -> 角色
    pub role_overrides: HashMap<String, Role>,
    /// 固定日薪：name_key -> 日薪
    pub fixed_daily_rates: HashMap<String, Money>,
    pub audit_notes: Vec<String>,
    pub command_errors: Vec<String>,
    pub name_key_conflicts: Vec<NameKeyConflict>,
    pub(crate) road_cmd_source: Option<RoadSource>,
}

impl Command {
    fn push_audit_note(&mut self, note: &str) {
        if !self.audit_notes.iter().any(|n| n == note) {
            self.audit_notes.push(note.to_string());
        }
    }

    fn set_road_cmd(&mut self, road_cmd: &str, source: RoadSource) {
        self.road_cmd = Some(road_cmd.to_string());
        self.road_cmd_source = Some(source);
    }
}

/// 行归一：去BOM、统一分隔符、压缩空白
pub fn normalize_line(text: &str) -> String {
    let cleaned = text
        .replace('\u{feff}', "")
        .replace('：', ":")
        .replace('＝', "=")
        .replace('\u{3000}', " ")
        .replace('｜', " ")
        .replace('|', " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 忽略行：空行、#注释、【…】横幅
fn is_ignored_line(text: &str) -> bool {
    let stripped = text.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return true;
    }
    stripped.starts_with('【')
        && stripped.ends_with('】')
        && stripped.matches('】').count() == 1
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "是" | "true" | "1" => Some(true),
        "否" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// 识别首行模式
pub(crate) fn detect_mode(first_line: &str) -> Option<CommandMode> {
    let normalized = normalize_line(first_line);
    if normalized.starts_with("工资") {
        Some(CommandMode::Single)
    } else if normalized.starts_with("项目结算") {
        Some(CommandMode::Project)
    } else {
        None
    }
}

fn extract_role(text: &str) -> Option<Role> {
    if text.contains("组长") {
        Some(Role::Leader)
    } else if text.contains("组员") {
        Some(Role::Member)
    } else {
        None
    }
}

/// 从首行提取人名：优先 `工资：xxx`，否则取第一个非关键字裸词
fn extract_person_name(text: &str) -> Option<String> {
    if let Some(pos) = text.find("工资") {
        let rest = text[pos + "工资".len()..].trim_start();
        if let Some(after) = rest.strip_prefix(':') {
            if let Some(token) = after.trim_start().split_whitespace().next() {
                return Some(token.to_string());
            }
        }
    }
    for token in text.split_whitespace() {
        if token == "工资" || token == "工资:" {
            continue;
        }
        if ROLE_KEYWORDS.iter().any(|role| token == *role) {
            continue;
        }
        if token.contains('=') {
            continue;
        }
        if token.starts_with("项目") {
            continue;
        }
        return Some(token.to_string());
    }
    None
}

/// 项目结算首行：`项目结算：<项目名> <其余kv>`
fn extract_project_header(line: &str) -> (Option<String>, String) {
    let normalized = normalize_line(line);
    let Some(rest) = normalized.strip_prefix("项目结算") else {
        return (None, String::new());
    };
    let remainder = rest.trim_start_matches(':').trim();
    if remainder.is_empty() {
        return (None, String::new());
    }
    let mut tokens = remainder.split_whitespace();
    if let Some(first) = tokens.next() {
        if !first.contains(':') && !first.contains('=') {
            let rest: Vec<&str> = tokens.collect();
            return (Some(first.to_string()), rest.join(" "));
        }
    }
    (None, remainder.to_string())
}

/// 提取一行中所有 `key=value` / `key:value` 对
fn extract_kv_pairs(line: &str) -> Vec<(String, String)> {
    let normalized = normalize_line(line);
    let chars: Vec<char> = normalized.chars().collect();
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ':' || chars[i] == '=' {
            let mut key_end = i;
            while key_end > 0 && chars[key_end - 1] == ' ' {
                key_end -= 1;
            }
            let mut key_start = key_end;
            while key_start > 0 {
                let prev = chars[key_start - 1];
                if prev == ' ' || prev == ':' || prev == '=' {
                    break;
                }
                key_start -= 1;
            }
            let mut value_start = i + 1;
            while value_start < chars.len() && chars[value_start] == ' ' {
                value_start += 1;
            }
            let mut value_end = value_start;
            while value_end < chars.len() && chars[value_end] != ' ' {
                value_end += 1;
            }
            if key_start < key_end && value_start < value_end {
                pairs.push((
                    chars[key_start..key_end].iter().collect(),
                    chars[value_start..value_end].iter().collect(),
                ));
                i = value_end;
                continue;
            }
        }
        i += 1;
    }
    pairs
}

/// 角色/固定日薪块内的 `名字=值` 行
fn split_kv(text: &str) -> Option<(String, String)> {
    let normalized = normalize_line(text);
    let pos = normalized.find([':', '='])?;
    let (name, value) = normalized.split_at(pos);
    let name = name.trim();
    let value = value[1..].trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

/// 固定日薪金额：剥掉 元/￥/¥ 后按金额解析
fn parse_fixed_daily_rate(value: &str) -> Option<Money> {
    let cleaned = value
        .replace('元', "")
        .replace('￥', "")
        .replace('¥', "");
    Money::parse(&cleaned)
}

fn apply_kv_mapping(command: &mut Command, key: &str, value: &str, source_line: Option<&str>) {
    if PROJECT_ENDED_KEYS.contains(&key) {
        if let Some(parsed) = parse_bool(value) {
            command.project_ended = Some(parsed);
        }
        return;
    }
    match key {
        "项目" => {
            command.project_name = Some(value.trim().to_string());
        }
        "路补" => {
            let normalized = normalize_line(value);
            let first = normalized.split_whitespace().next().unwrap_or("");
            let road_cmd = match first {
                "有" => Some(ROAD_CALC),
                "无" => Some(ROAD_NONE),
                _ => None,
            };
            let Some(road_cmd) = road_cmd else {
                let shown = if value.trim().is_empty() { value } else { value.trim() };
                let mut message = format!("路补仅支持有/无，收到'{}'", shown);
                if let Some(line) = source_line {
                    message.push_str(&format!("，原行：{}", line.trim()));
                }
                command.command_errors.push(message);
                return;
            };
            if matches!(command.road_cmd_source, Some(RoadSource::Standalone)) {
                command.push_audit_note("口令冲突：已采用工资行内路补设置");
            }
            command.set_road_cmd(road_cmd, RoadSource::WageLine);
        }
        "路补口令" => {
            if matches!(command.road_cmd_source, Some(RoadSource::WageLine)) {
                command.push_audit_note("口令冲突：已采用工资行内路补设置");
                return;
            }
            command.set_road_cmd(value.trim(), RoadSource::Standalone);
        }
        _ => {}
    }
}

/// 解析口令文本
pub fn parse_command(text: &str) -> Command {
    let mut lines: Vec<(usize, String, String)> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let normalized = normalize_line(raw);
        if !normalized.is_empty() {
            lines.push((index + 1, raw.to_string(), normalized));
        }
    }
    let first_line = lines
        .first()
        .map(|(_, _, normalized)| normalized.clone())
        .unwrap_or_default();

    let mut command = Command {
        mode: detect_mode(&first_line),
        person_name: extract_person_name(&first_line),
        role: extract_role(&first_line),
        ..Command::default()
    };

    if command.mode == Some(CommandMode::Project) && !first_line.is_empty() {
        let (project_name, remainder) = extract_project_header(&first_line);
        if let Some(project_name) = project_name {
            command.project_name = Some(project_name);
        }
        if !remainder.is_empty() {
            let source = lines.first().map(|(_, raw, _)| raw.clone());
            for (key, value) in extract_kv_pairs(&remainder) {
                apply_kv_mapping(&mut command, &key, &value, source.as_deref());
            }
        }
    } else if !first_line.is_empty() {
        // 项目模式的首行键值已在上面按剩余部分应用，重复应用会让错误条目翻倍
        let source = lines.first().map(|(_, raw, _)| raw.clone());
        for (key, value) in extract_kv_pairs(&first_line) {
            apply_kv_mapping(&mut command, &key, &value, source.as_deref());
        }
    }

    // 角色:/固定日薪: 块
    #[derive(Clone, Copy, PartialEq)]
    enum BlockMode {
        Role,
        Fixed,
    }
    let mut block_mode: Option<BlockMode> = None;
    let mut fixed_rate_names: BTreeMap<String, Vec<(String, usize)>> = BTreeMap::new();
    for (line_no, raw_line, line) in lines.iter().skip(1) {
        if line.starts_with("角色") {
            block_mode = Some(BlockMode::Role);
            continue;
        }
        if line.starts_with("固定日薪") {
            block_mode = Some(BlockMode::Fixed);
            continue;
        }
        match block_mode {
            Some(BlockMode::Role) => {
                if let Some((name, value)) = split_kv(line) {
                    if let Some(role) = Role::parse(&value) {
                        command.role_overrides.insert(name, role);
                    }
                }
            }
            Some(BlockMode::Fixed) => {
                if let Some((name, value)) = split_kv(line) {
                    if let Some(rate) = parse_fixed_daily_rate(&value) {
                        let key = name_key(&name);
                        command.fixed_daily_rates.insert(key.clone(), rate);
                        fixed_rate_names
                            .entry(key)
                            .or_default()
                            .push((name.trim().to_string(), *line_no));
                    }
                }
            }
            None => {
                for (key, value) in extract_kv_pairs(line) {
                    apply_kv_mapping(&mut command, &key, &value, Some(raw_line));
                }
            }
        }
    }

    // 同一 name_key 出现多个显示名即为冲突
    for (key, entries) in &fixed_rate_names {
        if entries.len() <= 1 {
            continue;
        }
        let display_names: BTreeSet<String> = entries
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| !name.is_empty())
            .collect();
        let line_nos: BTreeSet<usize> = entries.iter().map(|(_, line_no)| *line_no).collect();
        let display_names: Vec<String> = display_names.into_iter().collect();
        let line_nos: Vec<usize> = line_nos.into_iter().collect();
        let line_display = if line_nos.is_empty() {
            "-".to_string()
        } else {
            line_nos
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        command.command_errors.push(format!(
            "固定日薪姓名冲突: name_key={} 显示名={} 行号={}",
            key,
            display_names.join(","),
            line_display
        ));
        command.name_key_conflicts.push(NameKeyConflict {
            name_key: key.clone(),
            display_names,
            line_nos,
        });
    }

    command
}

// ---------------------------------------------------------------------------
// 团体口令展开
// ---------------------------------------------------------------------------

/// 展开结果
#[derive(Debug, Default)]
pub struct PassphraseExpansion {
    /// 展开后的命令行（含透传的普通行）
    pub lines: Vec<String>,
    /// 审计输出
    pub audit: Vec<String>,
    /// 阻断错误
    pub errors: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum RosterTarget {
    Leader,
    RoadYes,
    RoadNo,
}

#[derive(Default)]
struct PassphraseState {
    buffer_lines: Vec<String>,
    project_ended: Option<bool>,
    project_name: Option<String>,
    leader_keys: HashSet<String>,
    road_yes: Vec<(String, String)>,
    road_no: Vec<(String, String)>,
    road_yes_names: BTreeMap<String, Vec<String>>,
    road_no_names: BTreeMap<String, Vec<String>>,
    current_target: Option<RosterTarget>,
    seen_marker: bool,
}

fn add_names(
    names: &[String],
    entries: &mut Vec<(String, String)>,
    name_map: &mut BTreeMap<String, Vec<String>>,
) {
    let mut seen: HashSet<String> = entries.iter().map(|(key, _)| key.clone()).collect();
    for display in names {
        let key = name_key(display);
        name_map.entry(key.clone()).or_default().push(display.clone());
        if seen.contains(&key) {
            continue;
        }
        entries.push((key.clone(), display.clone()));
        seen.insert(key);
    }
}

enum PassphraseKey {
    ProjectEnded(String),
    Project(String),
    Leader(String),
    RoadYes(String),
    RoadNo(String),
}

/// 识别团体口令字段行
fn match_passphrase_key(line: &str) -> Option<PassphraseKey> {
    let normalized = normalize_line(line);
    for prefix in PROJECT_ENDED_KEYS {
        if let Some(rest) = normalized.strip_prefix(prefix) {
            let rest = rest.trim_start();
            if let Some(value) = rest.strip_prefix([':', '=']) {
                let value = value.trim();
                if !value.is_empty() && !value.contains(' ') {
                    return Some(PassphraseKey::ProjectEnded(value.to_string()));
                }
            }
        }
    }
    if let Some(rest) = normalized.strip_prefix("项目") {
        let rest = rest.trim_start();
        if let Some(value) = rest.strip_prefix([':', '=']) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(PassphraseKey::Project(value.to_string()));
            }
        }
    }
    if let Some(rest) = normalized.strip_prefix("组长") {
        let rest = rest.trim_start();
        if let Some(value) = rest.strip_prefix(':') {
            return Some(PassphraseKey::Leader(value.trim().to_string()));
        }
    }
    if let Some(rest) = normalized.strip_prefix("路补") {
        let rest = rest.trim_start();
        if let Some(value) = rest.strip_prefix('=') {
            let value = value.trim_start();
            let (flag, names) = if let Some(names) = value.strip_prefix('有') {
                (true, names)
            } else if let Some(names) = value.strip_prefix('无') {
                (false, names)
            } else {
                return None;
            };
            let names = names.trim_start().trim_start_matches(':').trim();
            return Some(if flag {
                PassphraseKey::RoadYes(names.to_string())
            } else {
                PassphraseKey::RoadNo(names.to_string())
            });
        }
    }
    None
}

/// 统计表中项目列取值出现次数
pub(crate) fn collect_project_counts(rows: &[Row]) -> BTreeMap<String, usize> {
    let headers: BTreeSet<String> = rows
        .iter()
        .flat_map(|row| row.keys())
        .map(|key| key.trim().to_string())
        .collect();
    let mut counter = BTreeMap::new();
    let Some(project_key) = PROJECT_HEADERS
        .iter()
        .find(|candidate| headers.contains(**candidate))
    else {
        return counter;
    };
    for row in rows {
        let value = cell(row, project_key).trim();
        if !value.is_empty() {
            *counter.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counter
}

/// 项目清单展示：按出现次数降序
pub(crate) fn format_project_counts(counter: &BTreeMap<String, usize>) -> String {
    let mut items: Vec<(&String, &usize)> = counter.iter().collect();
    items.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    items
        .iter()
        .map(|(name, count)| format!("{}({})", name, count))
        .collect::<Vec<_>>()
        .join("、")
}

/// 表中项目唯一时自动采用，否则阻断并列出候选
fn resolve_project_name(
    attendance_rows: Option<&[Row]>,
    payment_rows: Option<&[Row]>,
    errors: &mut Vec<String>,
) -> Option<String> {
    let attendance_counter = attendance_rows
        .map(collect_project_counts)
        .unwrap_or_default();
    if attendance_counter.len() >= 2 {
        errors.push(format!(
            "出勤表包含多个项目，无法自动识别项目，请补充项目=xxx（项目清单：{}）",
            format_project_counts(&attendance_counter)
        ));
        return None;
    }
    let attendance_project = attendance_counter.keys().next().cloned();

    let payment_counter = payment_rows.map(collect_project_counts).unwrap_or_default();
    if attendance_project.is_none() && payment_counter.len() >= 2 {
        errors.push(format!(
            "支付表包含多个项目，无法自动识别项目，请补充项目=xxx（项目清单：{}）",
            format_project_counts(&payment_counter)
        ));
        return None;
    }
    let payment_project = if payment_counter.len() == 1 {
        payment_counter.keys().next().cloned()
    } else {
        None
    };

    if let (Some(attendance), Some(payment)) = (&attendance_project, &payment_project) {
        if attendance != payment {
            errors.push(format!(
                "出勤表与支付表项目名不一致，无法自动识别项目：出勤表={}，支付表={}",
                attendance, payment
            ));
            return None;
        }
    }
    let resolved = attendance_project.or(payment_project);
    if resolved.is_none() {
        errors.push("未能自动识别项目，请补充项目=xxx".to_string());
    }
    resolved
}

fn finalize_state(
    state: PassphraseState,
    out: &mut PassphraseExpansion,
    attendance_rows: Option<&[Row]>,
    payment_rows: Option<&[Row]>,
) {
    if !state.seen_marker {
        out.lines.extend(state.buffer_lines);
        return;
    }
    let Some(project_ended) = state.project_ended else {
        out.errors.push("口令缺少字段：项目已结束=是/否".to_string());
        return;
    };
    if state.road_yes.is_empty() && state.road_no.is_empty() {
        out.errors
            .push("路补=有/无 两组人员均为空，无法展开工资命令".to_string());
        return;
    }
    let conflict_keys: Vec<&String> = state
        .road_yes_names
        .keys()
        .filter(|key| state.road_no_names.contains_key(*key))
        .collect();
    if !conflict_keys.is_empty() {
        let mut conflict_display = Vec::new();
        for key in conflict_keys {
            let mut display_names = state.road_yes_names[key].clone();
            display_names.extend(state.road_no_names[key].clone());
            conflict_display.push(display_names.join("/"));
        }
        out.errors
            .push(format!("路补名单冲突：{}", conflict_display.join("、")));
        return;
    }
    let project_name = match &state.project_name {
        Some(name) => Some(name.clone()),
        None => {
            let resolved = resolve_project_name(attendance_rows, payment_rows, &mut out.errors);
            if !out.errors.is_empty() {
                return;
            }
            resolved
        }
    };

    let role_for = |key: &str| -> Role {
        if state.leader_keys.contains(key) {
            Role::Leader
        } else {
            Role::Member
        }
    };
    let mut road_no_counts: HashMap<Role, usize> = HashMap::new();
    let mut road_yes_counts: HashMap<Role, usize> = HashMap::new();
    let mut commands = Vec::new();
    let ended_flag = if project_ended { "是" } else { "否" };
    for (key, display) in &state.road_no {
        let role = role_for(key);
        *road_no_counts.entry(role).or_insert(0) += 1;
        let mut line = format!(
            "工资：{} {} 项目已结束={} 路补=无",
            display, role, ended_flag
        );
        if let Some(name) = &project_name {
            line.push_str(&format!(" 项目={}", name));
        }
        commands.push(line);
    }
    for (key, display) in &state.road_yes {
        let role = role_for(key);
        *road_yes_counts.entry(role).or_insert(0) += 1;
        let mut line = format!(
            "工资：{} {} 项目已结束={} 路补=有",
            display, role, ended_flag
        );
        if let Some(name) = &project_name {
            line.push_str(&format!(" 项目={}", name));
        }
        commands.push(line);
    }
    out.lines.extend(commands.iter().cloned());
    out.audit.push("【口令展开审计】".to_string());
    out.audit.push(format!(
        "无路补：组长{}人/组员{}人；有路补：组长{}人/组员{}人",
        road_no_counts.get(&Role::Leader).copied().unwrap_or(0),
        road_no_counts.get(&Role::Member).copied().unwrap_or(0),
        road_yes_counts.get(&Role::Leader).copied().unwrap_or(0),
        road_yes_counts.get(&Role::Member).copied().unwrap_or(0),
    ));
    out.audit.push(format!("生成总条数 {}", commands.len()));
    out.audit.push("展开命令:".to_string());
    for command in &commands {
        out.audit.push(format!("- {}", command));
    }
}

/// 展开团体口令；普通命令行原样透传
pub fn expand_passphrase(
    text: &str,
    attendance_rows: Option<&[Row]>,
    payment_rows: Option<&[Row]>,
) -> PassphraseExpansion {
    let mut out = PassphraseExpansion::default();
    let mut state: Option<PassphraseState> = None;

    for raw_line in text.lines() {
        if is_ignored_line(raw_line) {
            continue;
        }
        let normalized = normalize_line(raw_line);
        if normalized.is_empty() {
            continue;
        }
        if detect_mode(&normalized).is_some()
            || normalized.starts_with("角色")
            || normalized.starts_with("固定日薪")
        {
            if let Some(taken) = state.take() {
                finalize_state(taken, &mut out, attendance_rows, payment_rows);
                if !out.errors.is_empty() {
                    break;
                }
            }
            out.lines.push(raw_line.trim().to_string());
            continue;
        }
        if let Some(matched) = match_passphrase_key(raw_line) {
            let st = state.get_or_insert_with(PassphraseState::default);
            st.buffer_lines.push(raw_line.trim().to_string());
            match matched {
                PassphraseKey::ProjectEnded(value) => {
                    st.seen_marker = true;
                    st.project_ended = parse_bool(&value);
                }
                PassphraseKey::Project(value) => {
                    st.project_name = Some(value.trim().to_string());
                }
                PassphraseKey::Leader(value) => {
                    st.seen_marker = true;
                    st.current_target = Some(RosterTarget::Leader);
                    for display in split_names(&value) {
                        st.leader_keys.insert(name_key(&display));
                    }
                }
                PassphraseKey::RoadYes(value) => {
                    st.seen_marker = true;
                    st.current_target = Some(RosterTarget::RoadYes);
                    add_names(
                        &split_names(&value),
                        &mut st.road_yes,
                        &mut st.road_yes_names,
                    );
                }
                PassphraseKey::RoadNo(value) => {
                    st.seen_marker = true;
                    st.current_target = Some(RosterTarget::RoadNo);
                    add_names(
                        &split_names(&value),
                        &mut st.road_no,
                        &mut st.road_no_names,
                    );
                }
            }
            continue;
        }
        let mut handled = false;
        if let Some(st) = state.as_mut() {
            if let Some(target) = st.current_target {
                let names = split_names(raw_line);
                match target {
                    RosterTarget::Leader => {
                        for display in &names {
                            st.leader_keys.insert(name_key(display));
                        }
                    }
                    RosterTarget::RoadYes => {
                        add_names(&names, &mut st.road_yes, &mut st.road_yes_names);
                    }
                    RosterTarget::RoadNo => {
                        add_names(&names, &mut st.road_no, &mut st.road_no_names);
                    }
                }
                st.buffer_lines.push(raw_line.trim().to_string());
                handled = true;
            }
        }
        if handled {
            continue;
        }
        if let Some(taken) = state.take() {
            finalize_state(taken, &mut out, attendance_rows, payment_rows);
            if !out.errors.is_empty() {
                break;
            }
        }
        out.lines.push(raw_line.trim().to_string());
    }

    if out.errors.is_empty() {
        if let Some(taken) = state.take() {
            finalize_state(taken, &mut out, attendance_rows, payment_rows);
        }
    }
    out
}
