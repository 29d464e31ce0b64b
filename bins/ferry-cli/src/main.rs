//! ferry - 媒体转封装命令行工具
//!
//! 不重新编码地把媒体从一种容器搬运到另一种容器, 例如 `ferry -i in.flv -o out.wav`.

mod logging;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use ferry_format::FormatRegistry;
use ferry_remux::{RemuxJob, RemuxOptions, RemuxSummary};

#[derive(Parser, Debug)]
#[command(name = "ferry", version, about = "纯 Rust 媒体转封装工具")]
struct Cli {
    /// 输入文件路径
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 输出文件路径
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 覆盖输出文件
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// 强制输出格式 (如 "flv", "wav", "null"), 默认按输出扩展名猜测
    #[arg(short = 'f', long = "format")]
    format: Option<String>,

    /// 每隔多少个数据包刷新一次进度
    #[arg(long, default_value_t = ferry_remux::DEFAULT_PROGRESS_INTERVAL)]
    progress_interval: u32,

    /// 结束后以 JSON 输出统计信息到 stdout
    #[arg(long)]
    json: bool,

    /// 列出支持的容器格式
    #[arg(long)]
    list_formats: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("ferry-cli", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let registry = ferry_format::default_registry();

    if cli.list_formats {
        print_formats(&registry);
        return Ok(());
    }

    let (Some(input), Some(output)) = (&cli.input, &cli.output) else {
        bail!("必须同时指定输入与输出文件 (-i <输入文件> -o <输出文件>)");
    };
    check_output(output, cli.overwrite)?;

    let options = RemuxOptions {
        progress_interval: cli.progress_interval,
        dump_format: cli.verbose > 0,
        output_format: cli.format.clone(),
    };
    let job = RemuxJob::create_with(input, output, &registry, options)
        .with_context(|| format!("无法创建转封装任务 '{}'", input.display()))?;

    eprintln!("ferry 版本 {} -- 纯 Rust 媒体转封装工具", env!("CARGO_PKG_VERSION"));
    eprintln!("输入: {}", input.display());
    eprintln!(
        "输出: {} ({})",
        output.display(),
        job.output_format().map_or("?", |id| id.name())
    );

    let handle = ferry_remux::spawn(job).context("启动转封装线程失败")?;
    let summary = handle
        .wait_with(|percent| {
            eprint!("\r进度: {percent:5.1}%");
            std::io::stderr().flush().ok();
        })
        .context("转封装失败");
    eprintln!();
    let summary = summary?;

    report(&summary, cli.json)
}

/// 输出文件已存在且未指定 `-y` 时拒绝执行
fn check_output(output: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && output.exists() {
        bail!("输出文件已存在 '{}', 使用 -y 覆盖", output.display());
    }
    Ok(())
}

fn report(summary: &RemuxSummary, json: bool) -> Result<()> {
    info!(
        "转封装结束: {:?}, 读取 {} 个数据包, 写出 {}, 丢弃 {}",
        summary.end, summary.packets_read, summary.packets_written, summary.packets_dropped
    );
    if json {
        let text = serde_json::to_string_pretty(summary).context("序列化统计信息失败")?;
        println!("{text}");
    } else {
        eprintln!(
            "完成 ({:?}): 写出 {} 个数据包, 丢弃 {} 个",
            summary.end, summary.packets_written, summary.packets_dropped
        );
    }
    Ok(())
}

fn print_formats(registry: &FormatRegistry) {
    println!("解封装:");
    for (id, name) in registry.list_demuxers() {
        println!("  {name:<6} {}", id.extensions().join(", "));
    }
    println!("封装:");
    for (id, name) in registry.list_muxers() {
        println!("  {name:<6} {}", id.extensions().join(", "));
    }
}
