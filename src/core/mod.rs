//! Core模块 - 结算核心业务逻辑

pub mod models;
pub mod names;
pub mod command;
pub mod attendance;
pub mod payment;
pub mod ruleset;
pub mod checks;
pub mod settle;
pub mod project;
