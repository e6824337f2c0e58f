use clap::Parser;
use sketch_tutor::{CanvasAiService, Config, args::Args, logger, server};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_args(&args).await?;
    logger::init(&config.log_level);

    let llm = config.build_llm()?;
    let service = Arc::new(CanvasAiService::with_settings(
        llm,
        config.service_settings(),
    ));
    server::run(&config.server.host, config.server.port, service).await?;
    Ok(())
}
