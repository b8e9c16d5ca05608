//! 命令行入口：对单个 HTML 文件跑一轮完整翻译

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;

use pagegloss::dom::{html_to_dom, serialize_document};
use pagegloss::engine::Command;
use pagegloss::{EngineResult, GlossaryStore, SettingsStore, TranslationService};

#[derive(Parser, Debug)]
#[command(name = "pagegloss", version, about = "按本地词典翻译 HTML 文档")]
struct Cli {
    /// 输入 HTML 文件
    input: PathBuf,

    /// 输出文件（缺省写到标准输出）
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 词典根目录（每个语言一个子目录）
    #[arg(long, default_value = "glossary")]
    glossary_root: PathBuf,

    /// 词典缓存目录
    #[arg(long, default_value = ".pagegloss-cache")]
    cache_dir: PathBuf,

    /// 设置文件
    #[arg(long, default_value = "pagegloss.toml")]
    settings: PathBuf,

    /// 覆盖设置中的目标语言
    #[arg(short, long)]
    locale: Option<String>,

    /// 输出调试级日志并打印叶子文本
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> EngineResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .init();

    let service = TranslationService::new(
        GlossaryStore::new(&cli.glossary_root, &cli.cache_dir),
        SettingsStore::new(&cli.settings),
    )?;

    if let Some(locale) = cli.locale {
        service.handle_command(Command::SetLocale(locale)).await?;
    }
    if cli.debug {
        service.handle_command(Command::ToggleDebug(true)).await?;
    }
    service.handle_command(Command::Enable).await?;

    let bytes = fs::read(&cli.input)?;
    let dom = html_to_dom(&bytes);

    let summary = service.translate_document(&dom.document).await;
    tracing::info!(
        "{}: 改写 {} / {} 个单元",
        cli.input.display(),
        summary.units_rewritten,
        summary.units_seen,
    );

    let output = serialize_document(dom)?;
    match cli.output {
        Some(path) => fs::write(path, output)?,
        None => io::stdout().write_all(&output)?,
    }
    Ok(())
}
