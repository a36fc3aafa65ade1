mod catalog;
mod config;
mod parser;
mod reader;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::catalog::TestCatalog;
use crate::config::{AppConfig, DefaultUnitTable, Strategy, DEFAULT_CONFIG_PATH};
use crate::parser::ExtractionPipeline;
use crate::reader::PageTextProducer;
use crate::utils::logger;

#[derive(Parser)]
#[command(name = "labscan")]
#[command(about = "从检验报告PDF中提取患者信息和检验结果", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 提取一份报告，结果以JSON输出到stdout
    Extract {
        /// 检验项目目录CSV
        #[arg(long, alias = "csv_file")]
        csv_file: PathBuf,
        /// 检验报告PDF
        #[arg(long, alias = "pdf_file")]
        pdf_file: PathBuf,
        /// 覆盖配置中的读取方式
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,
        /// 目录CSV中的项目名列
        #[arg(long, default_value = catalog::DEFAULT_COLUMN)]
        column: String,
        /// 单行JSON输出
        #[arg(long)]
        compact: bool,
    },
    /// 生成默认配置文件
    Init {
        /// 输出路径
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            csv_file,
            pdf_file,
            strategy,
            column,
            compact,
        } => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            extract_command(cli.config, csv_file, pdf_file, strategy, &column, compact, &mut out).await?;
        }
        Commands::Init { path } => {
            init_command(&path)?;
        }
    }

    Ok(())
}

async fn extract_command(
    config_path: Option<PathBuf>,
    csv_file: PathBuf,
    pdf_file: PathBuf,
    strategy: Option<Strategy>,
    column: &str,
    compact: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut app_config = AppConfig::load(config_path.as_deref()).context("加载配置失败")?;
    if let Some(strategy) = strategy {
        app_config.reader.strategy = strategy;
    }
    info!("labscan 启动，读取方式: {:?}", app_config.reader.strategy);

    // 目录必须在处理PDF之前读取成功
    let catalog = TestCatalog::load_csv(&csv_file, column).context("读取检验项目目录失败")?;
    if catalog.is_empty() {
        warn!("检验项目目录为空，不会匹配到任何结果: {}", csv_file.display());
    }
    let default_units = DefaultUnitTable::builtin();
    info!("检验项目 {} 个，默认单位 {} 条", catalog.len(), default_units.len());
    let pipeline = ExtractionPipeline::new(&app_config, &catalog, default_units)?;

    let producer = PageTextProducer::from_config(&app_config.reader);
    let pages = producer
        .produce(&pdf_file)
        .await
        .with_context(|| format!("处理PDF失败: {}", pdf_file.display()))?;

    let record = pipeline.process_pages(&pages);
    info!(
        pages = pages.len(),
        failed_pages = pages.iter().filter(|p| !p.is_ok()).count(),
        results = record.test_results.len(),
        "提取完成"
    );

    // 只有完整成功才写出记录
    writeln!(out, "{}", record.to_json(!compact)?)?;
    Ok(())
}

fn init_command(path: &std::path::Path) -> Result<()> {
    info!("生成默认配置...");
    AppConfig::default()
        .save(path)
        .with_context(|| format!("写入配置失败: {}", path.display()))?;
    info!("已生成配置文件: {}", path.display());
    info!("可通过 LABSCAN__READER__STRATEGY=text_layer 等环境变量覆盖配置");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::test_pdf;

    fn catalog_csv(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("tests.csv");
        std::fs::write(&path, "Test_Name\nHemoglobin\nRBC Count\n").unwrap();
        path
    }

    #[tokio::test]
    async fn unreadable_pdf_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, b"%PDF-garbage").unwrap();

        let mut out = Vec::new();
        let result = extract_command(
            Some(dir.path().join("missing.toml")),
            catalog_csv(dir.path()),
            pdf,
            Some(Strategy::TextLayer),
            catalog::DEFAULT_COLUMN,
            false,
            &mut out,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<utils::LabError>(),
            Some(utils::LabError::DocumentError { .. })
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn missing_catalog_fails_before_reading_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        let result = extract_command(
            Some(dir.path().join("missing.toml")),
            dir.path().join("nope.csv"),
            dir.path().join("nope.pdf"),
            Some(Strategy::TextLayer),
            catalog::DEFAULT_COLUMN,
            false,
            &mut out,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<utils::LabError>(),
            Some(utils::LabError::CatalogError(_))
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn text_layer_report_prints_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("report.pdf");
        let mut doc = test_pdf::build(&[
            "BT /F1 12 Tf 72 700 Td (NAME: Ms. Anita Rao) Tj ET BT /F1 12 Tf 72 680 Td (Hemoglobin - 12.5) Tj ET",
        ]);
        test_pdf::save(&mut doc, &pdf);

        let mut out = Vec::new();
        extract_command(
            Some(dir.path().join("missing.toml")),
            catalog_csv(dir.path()),
            pdf,
            Some(Strategy::TextLayer),
            catalog::DEFAULT_COLUMN,
            true,
            &mut out,
        )
        .await
        .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.lines().count(), 1);
        let json: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(json["Patient Details"][0]["Patient Name"], "Anita Rao");
        assert_eq!(json["Test Results"][0]["Test Name"], "Hemoglobin");
        assert_eq!(json["Test Results"][0]["Result"], "12.5");
        assert_eq!(json["Test Results"][0]["Unit"], "gm%");
    }
}
