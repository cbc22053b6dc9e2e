//! 结算 - 施工班组工资结算工具
//!
//! 核心设计原则：
//! - 口令是唯一指挥：表格只提供事实，结算口径全部来自口令
//! - 任一硬校验失败即阻断出单，绝不出可疑的单
//! - 所有结果可审计：run_id、规则版本、输入指纹逐单留痕

pub mod cli;
pub mod core;
pub mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storage::history::HistoryDb;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jiesuan", about = "施工班组工资结算工具", version)]
struct Cli {
    /// 数据目录（含 当前/ 与口令.txt）
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// 工资单输出目录
    #[arg(long, default_value = "输出/当前")]
    out_dir: PathBuf,

    /// 结算记录数据库路径；缺省用系统数据目录
    #[arg(long)]
    history_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 单人结算（读 data/当前/口令.txt）
    Person,
    /// 项目批量结算
    Project,
    /// 状态盘点/自检报告
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli
        .history_db
        .clone()
        .unwrap_or_else(storage::config::default_history_db_path);
    let history = match HistoryDb::open(&db_path) {
        Ok(db) => Some(db),
        Err(err) => {
            tracing::warn!(error = %err, "结算记录库不可用，本次不记录");
            None
        }
    };

    match cli.command {
        Commands::Person => cli::person::run(&cli.data_dir, &cli.out_dir, history.as_ref()),
        Commands::Project => cli::project::run(&cli.data_dir, &cli.out_dir, history.as_ref()),
        Commands::Status => cli::status::run(&cli.data_dir, history.as_ref()),
    }
}
