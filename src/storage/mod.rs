//! Storage模块 - 数据目录读取与结算记录

pub mod csv_loader;
pub mod selector;
pub mod config;
pub mod history;
