//! Docent 命令行
//!
//! 用法：
//!   docent [--config <path>] [--pipeline] <question...>
//!   docent [--config <path>] services
//!   docent [--config <path>] list [service_key]
//!
//! 结果以 JSON 打印到 stdout，日志写 stderr。

use std::path::PathBuf;

use anyhow::{bail, Context};
use docent::config::load_config;
use docent::{observability, AskRequest, AssistantBuilder};

struct CliArgs {
    config: Option<PathBuf>,
    pipeline: bool,
    rest: Vec<String>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut cli = CliArgs {
        config: None,
        pipeline: false,
        rest: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                cli.config = Some(PathBuf::from(path));
            }
            "--pipeline" | "-p" => cli.pipeline = true,
            _ => cli.rest.push(arg),
        }
    }
    if cli.rest.is_empty() {
        bail!("usage: docent [--config <path>] [--pipeline] <question...> | services | list [service_key]");
    }
    Ok(cli)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = parse_args()?;

    let cfg = load_config(cli.config).context("Failed to load config")?;
    let assistant = AssistantBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build assistant")?;

    let output = match cli.rest[0].as_str() {
        "services" if cli.rest.len() == 1 => serde_json::to_string_pretty(&assistant.services().await?)?,
        "list" if cli.rest.len() <= 2 => {
            let entries = assistant.list_entries(cli.rest.get(1).map(String::as_str)).await?;
            serde_json::to_string_pretty(&entries)?
        }
        _ => {
            let question = cli.rest.join(" ");
            let response = assistant
                .ask(AskRequest::new(question).with_pipeline(cli.pipeline))
                .await?;
            serde_json::to_string_pretty(&response)?
        }
    };
    println!("{}", output);
    Ok(())
}
