//! 核心数据模型定义
//!
//! 金额一律用分为单位的定点数表示，禁止浮点参与结算。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

/// 一行CSV数据：表头 -> 单元格文本。
/// 用 BTreeMap 保证序列化与哈希的确定性。
pub type Row = BTreeMap<String, String>;

/// 读取单元格文本，缺列时返回空串
pub fn cell<'a>(row: &'a Row, key: &str) -> &'a str {
    row.get(key).map(String::as_str).unwrap_or("")
}

/// 金额（以分计的定点数）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn from_yuan(yuan: i64) -> Self {
        Money(yuan * 100)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// 解析清洗后的金额文本（如 `1200`、`120.5`、`-30`）。
    /// 小数超过两位视为无效，结算金额不存在更细的粒度。
    pub fn parse(text: &str) -> Option<Money> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if frac_part.len() > 2 {
            return None;
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let int_value: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let frac_value: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().ok()? * 10,
            _ => frac_part.parse().ok()?,
        };
        let cents = int_value.checked_mul(100)?.checked_add(frac_value)?;
        Some(Money(if negative { -cents } else { cents }))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        if abs % 100 == 0 {
            write!(f, "{}{}", sign, abs / 100)
        } else if abs % 10 == 0 {
            write!(f, "{}{}.{}", sign, abs / 100, (abs % 100) / 10)
        } else {
            write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
        }
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Mul<i64> for Money {
    type Output = Money;
    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, item| acc + item)
    }
}

/// 人员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// 组长
    Leader,
    /// 组员
    Member,
}

impl Role {
    /// 从文本识别角色（包含关系，组长优先）
    pub fn parse(text: &str) -> Option<Role> {
        if text.contains("组长") {
            Some(Role::Leader)
        } else if text.contains("组员") {
            Some(Role::Member)
        } else {
            None
        }
    }

    /// 角色基准日薪（全组模式）
    pub fn base_daily_wage(self) -> Money {
        match self {
            Role::Leader => Money::from_yuan(350),
            Role::Member => Money::from_yuan(300),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "组长"),
            Role::Member => write!(f, "组员"),
        }
    }
}

/// 项目名的确定来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectNameSource {
    /// 口令显式指定 项目=xxx
    Command,
    /// 从表文件名兜底推导
    Derived,
}

/// 固定日薪名单里的姓名归一冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameKeyConflict {
    pub name_key: String,
    pub display_names: Vec<String>,
    pub line_nos: Vec<usize>,
}

/// 展示开关（来自 配置.txt）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisplayOverrides {
    pub verbose: bool,
    pub show_notes: bool,
    pub show_checks: bool,
    pub show_audit: bool,
    pub show_logs_in_compact: bool,
    pub show_logs_in_detail: bool,
}

impl Default for DisplayOverrides {
    fn default() -> Self {
        Self {
            verbose: false,
            show_notes: true,
            show_checks: false,
            show_audit: true,
            show_logs_in_compact: false,
            show_logs_in_detail: false,
        }
    }
}

/// 单次结算的运行期上下文
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    /// 路补口令（`计算路补` / `无路补`）
    pub road_passphrase: Option<String>,
    /// 项目批量结算时为每人解析好的日薪
    pub daily_rate: Option<Money>,
    /// 批量结算要求 项目已结束=是 才放行
    pub require_project_ended: bool,
    /// 项目名来源
    pub project_name_source: Option<ProjectNameSource>,
    /// 出勤表来源路径（相对仓库根）
    pub attendance_source: Option<String>,
    /// 报销表来源路径
    pub payment_source: Option<String>,
    /// 口令解析过程中的审计备注
    pub audit_notes: Vec<String>,
    /// 口令解析错误（非空即阻断口令检查）
    pub command_errors: Vec<String>,
    /// 固定日薪姓名归一冲突
    pub name_key_conflicts: Vec<NameKeyConflict>,
    /// 展示开关
    pub display: DisplayOverrides,
}

impl RuntimeOverrides {
    /// 追加审计备注，重复内容只记一次
    pub fn push_audit_note(&mut self, note: impl Into<String>) {
        let note = note.into();
        if !self.audit_notes.contains(&note) {
            self.audit_notes.push(note);
        }
    }
}
