//! CLI模块 - 三个子命令入口

pub mod person;
pub mod project;
pub mod status;
