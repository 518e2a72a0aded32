use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use parcel_check::writer::{MapWriter, ReportWriter, ResultTable};
use parcel_check::{CleanupPolicy, GdalEngine, Pipeline, PipelineConfig, Registry};

const DEFAULT_REGISTRY: &str = "地块信息.xlsx";
const DEFAULT_REPORT: &str = "边界文件检查结果.xlsx";
const DEFAULT_MAP: &str = "地块边界检查结果.html";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 存放地块边界zip文件和地块信息表的目录
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// 地块信息表（相对路径按INPUT解析）
    #[arg(long, value_name = "FILE", default_value = DEFAULT_REGISTRY)]
    registry: PathBuf,

    /// 检查结果表（默认: INPUT/边界文件检查结果.xlsx）
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// 边界地图（默认: INPUT/地块边界检查结果.html）
    #[arg(long, value_name = "FILE")]
    map: Option<PathBuf>,

    /// 解压临时目录（默认: 系统临时目录/parcel_check_extract）
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// 删除临时目录的最大尝试次数
    #[arg(long, default_value_t = 5)]
    cleanup_retries: u32,

    /// 删除临时目录的重试间隔（毫秒）
    #[arg(long, default_value_t = 1000)]
    cleanup_delay_ms: u64,

    /// 不生成边界地图
    #[arg(long)]
    no_map: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig {
            cleanup: CleanupPolicy {
                max_attempts: self.cleanup_retries.max(1),
                retry_delay: Duration::from_millis(self.cleanup_delay_ms),
            },
            ..Default::default()
        };
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = dir.clone();
        }
        config
    }
}

fn resolve(input: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        input.join(path)
    }
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    if !args.input.is_dir() {
        error!("Invalid input directory: {:?}", args.input);
        anyhow::bail!("Input path must be a directory");
    }

    // 地块信息表读取失败时终止
    let registry_path = resolve(&args.input, &args.registry);
    let registry = Registry::load(&registry_path)
        .with_context(|| format!("Failed to load registry {}", registry_path.display()))?;

    let engine = GdalEngine::new();
    let pipeline = Pipeline::new(&engine, &registry, args.pipeline_config());
    let report = pipeline
        .run(&args.input)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    let summary = report.summary();

    // 输出失败只记录日志，统计信息照常打印
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| args.input.join(DEFAULT_REPORT));
    match ReportWriter::new().write(&report.results, &summary, &report_path) {
        Ok(()) => info!("Written report: {:?}", report_path),
        Err(e) => error!("Failed to write report {:?}: {:#}", report_path, e),
    }

    if !args.no_map {
        let map_path = args
            .map
            .clone()
            .unwrap_or_else(|| args.input.join(DEFAULT_MAP));
        match MapWriter::new().write(&report.overlays, &report.markers, &map_path) {
            Ok(()) => info!("Written map: {:?}", map_path),
            Err(e) => error!("Failed to write map {:?}: {:#}", map_path, e),
        }
    }

    // 结果表和统计信息不依赖输出文件是否写入成功
    println!("{}", ResultTable(&report.results));
    println!("{}", summary);

    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}
