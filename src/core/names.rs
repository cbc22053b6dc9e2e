//! 姓名归一化模块
//!
//! 表格、口令、固定日薪名单里同一个人可能写成 `袁玉兵` 或 `袁玉兵(P007)`。
//! 跨数据源匹配一律先经过 `name_key` 归一。

/// 计算姓名归一键：去除首尾空白、统一全角括号、剥离一个尾部括号后缀。
pub fn name_key(value: &str) -> String {
    let cleaned = value.trim().replace('（', "(").replace('）', ")");
    if let Some(stripped) = strip_trailing_parenthetical(&cleaned) {
        return stripped;
    }
    cleaned
}

/// 剥离形如 `张三(P001)` 的尾部括号段；括号段内不允许再嵌套括号。
fn strip_trailing_parenthetical(value: &str) -> Option<String> {
    let trimmed = value.trim_end();
    if !trimmed.ends_with(')') {
        return None;
    }
    let open = trimmed.rfind('(')?;
    let inner = &trimmed[open + '('.len_utf8()..trimmed.len() - ')'.len_utf8()];
    if inner.contains('(') || inner.contains(')') {
        return None;
    }
    let head = trimmed[..open].trim_end();
    if head.is_empty() {
        return None;
    }
    Some(head.to_string())
}

/// 拆分一格里写了多个人名的情况：顿号、逗号、分号、空白皆可分隔。
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || matches!(c, '、' | '，' | ',' | ';' | '；'))
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}
