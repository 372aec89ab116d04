//! # 图片拼图工具：命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果写出。
//! 业务逻辑位于 `tiler` 模块，详见 `lib.rs` 架构文档。

use std::path::PathBuf;

use clap::Parser;
use image_tiler::error::AppError;
use image_tiler::tiler::{GridSpec, Reference, TileAdvancedConfig, TileServiceState};

#[derive(Parser, Debug)]
#[command(name = "image-tiler", version, about)]
struct Cli {
    /// 图片来源：本地路径、http(s) 地址、data URL，或 `empty` 表示空白格。
    refs: Vec<String>,

    /// 输出 PNG 路径。
    #[arg(long, short)]
    output: PathBuf,

    /// 缩略图边长（像素）。
    #[arg(long, default_value_t = 136)]
    tile_size: u32,

    /// 每行格子数。
    #[arg(long, default_value_t = 6)]
    row_length: u32,

    /// 格子间透明间隔（像素）。
    #[arg(long, default_value_t = 4)]
    spacing: u32,

    /// 性能档位：quality / balanced / speed。
    #[arg(long)]
    profile: Option<String>,

    /// 并发加载上限，覆盖档位默认值。
    #[arg(long)]
    concurrency: Option<usize>,

    /// 在标准输出打印 JSON 报告。
    #[arg(long, default_value_t = false)]
    report: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()).await {
        log::error!("拼图失败: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let spec = GridSpec::new(cli.tile_size, cli.row_length, cli.spacing)?;
    let refs: Vec<Reference> = cli.refs.iter().map(|r| Reference::parse(r)).collect();

    let service = TileServiceState::new()?;
    if let Some(profile) = &cli.profile {
        service.set_performance_profile(profile)?;
    }
    if let Some(max_concurrency) = cli.concurrency {
        let current = service.get_advanced_config()?;
        service.set_advanced_config(TileAdvancedConfig {
            max_concurrency,
            ..current
        })?;
    }

    let request_id = format!("cli-{}", std::process::id());
    let grid = service
        .tile_with_request_id(&request_id, &refs, &spec, |progress| {
            log::debug!("📊 进度 {}/{}", progress.completed, progress.total);
        })
        .await?;

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    if grid.canvas.is_empty() {
        log::warn!("⚠️ 没有任何来源，画布为空，跳过写出");
    } else {
        grid.canvas.into_image().save(&cli.output)?;
        log::info!("💾 已写出 {}", cli.output.display());
    }

    if cli.report {
        println!("{}", serde_json::to_string_pretty(&grid.report)?);
    }

    Ok(())
}
