//! CSV读取模块
//!
//! 行统一读成 表头 -> 单元格 的映射，表头去BOM去首尾空白。

use crate::core::models::Row;
use csv::ReaderBuilder;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("读取CSV失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("解析CSV失败: {0}")]
    Csv(#[from] csv::Error),
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// 只读表头行
pub fn read_headers(path: &Path) -> Result<Vec<String>, LoadError> {
    let content = std::fs::read_to_string(path)?;
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(strip_bom(&content).as_bytes());
    let headers = reader
        .headers()?
        .iter()
        .map(|header| strip_bom(header).trim().to_string())
        .collect();
    Ok(headers)
}

/// 读全部数据行；列数不齐的行按空单元格补齐
pub fn read_rows(path: &Path) -> Result<Vec<Row>, LoadError> {
    let content = std::fs::read_to_string(path)?;
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(strip_bom(&content).as_bytes());
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| strip_bom(header).trim().to_string())
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (index, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            row.insert(
                header.clone(),
                record.get(index).unwrap_or("").trim().to_string(),
            );
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_rows_strips_bom_and_spaces() {
        let file = write_csv("\u{feff}日期 ,姓名\n2025-11-01, 张三 \n");
        let rows = read_rows(file.path()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["日期"], "2025-11-01");
        assert_eq!(rows[0]["姓名"], "张三");
    }

    #[test]
    fn test_read_rows_pads_short_records() {
        let file = write_csv("日期,姓名,是否施工\n2025-11-01,张三\n");
        let rows = read_rows(file.path()).unwrap();

        assert_eq!(rows[0]["是否施工"], "");
    }

    #[test]
    fn test_read_headers() {
        let file = write_csv("施工日期,是否施工,施工人员\n");
        let headers = read_headers(file.path()).unwrap();

        assert_eq!(headers, vec!["施工日期", "是否施工", "施工人员"]);
    }
}
