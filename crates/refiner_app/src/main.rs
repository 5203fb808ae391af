mod chat_file;
mod cli;
mod config;
mod hook;
mod logging;
mod progress;

use std::path::Path;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use refiner_core::{saved_messages_for, MacroTable};
use refiner_engine::{
    write_atomically, BackendSet, ChannelProgressSink, DefaultSessionBackend,
    OpenAiCompatBackends, ProfileSet, ReasoningParser, ReasoningResolver, ReasoningTemplates,
    RefineOutcome, Refiner, TemplateParser,
};
use refiner_logging::{refiner_error, refiner_info};

use crate::chat_file::ChatFile;
use crate::cli::{Cli, Command};
use crate::config::AppConfig;
use crate::hook::CommandHook;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            refiner_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::InitConfig { force } => init_config(&cli.config, force),
        Command::Context { chat, message_id } => {
            let config = AppConfig::load(&cli.config)?;
            let chat = ChatFile::load(&chat).context("failed to load chat")?;
            println!(
                "{}",
                saved_messages_for(&config.pipeline, &chat.messages(), message_id)
            );
            Ok(())
        }
        Command::Refine { chat, message_id } => {
            let config = AppConfig::load(&cli.config)?;
            if !config.pipeline.enabled {
                bail!("refinement is disabled in {}", cli.config.display());
            }
            let store = Arc::new(ChatFile::load(&chat).context("failed to load chat")?);
            let (event_tx, event_rx) = mpsc::channel();
            let printer = progress::spawn_printer(event_rx);
            let refiner = build_refiner(config, store)?
                .with_sink(Arc::new(ChannelProgressSink::new(event_tx)));

            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            let result = runtime.block_on(refiner.refine(message_id));
            // Dropping the refiner closes the channel so the printer drains and exits.
            drop(refiner);
            printer
                .join()
                .map_err(|_| anyhow!("progress printer panicked"))?;
            let outcome = result.with_context(|| format!("refining message {message_id}"))?;
            match outcome {
                RefineOutcome::Committed => println!("Message {message_id} refined."),
                RefineOutcome::Unchanged => println!("Message {message_id} left unchanged."),
            }
            Ok(())
        }
    }
}

fn build_refiner(config: AppConfig, store: Arc<ChatFile>) -> anyhow::Result<Refiner> {
    let profiles = Arc::new(ProfileSet::new(config.profiles, config.reasoning_templates));
    let http = Arc::new(
        OpenAiCompatBackends::new(
            profiles.clone(),
            config.active_profile,
            &config.http.settings(),
        )
        .context("failed to build http client")?,
    );

    let backends = BackendSet::new(
        Arc::new(DefaultSessionBackend::new(http.clone())),
        http,
        config.pipeline.default_max_tokens,
    );
    let fallback = config
        .fallback_reasoning
        .map(|template| Arc::new(TemplateParser::new(template)) as Arc<dyn ReasoningParser>);
    let templates: Arc<dyn ReasoningTemplates> = profiles;
    let reasoning = ReasoningResolver::new(Some(templates), fallback);

    let mut refiner = Refiner::new(config.pipeline, store, Arc::new(backends))
        .with_reasoning(reasoning)
        .with_macros(Arc::new(MacroTable::new(config.macros)));
    if let Some(hook) = config
        .analysis_command
        .as_deref()
        .and_then(CommandHook::from_command_line)
    {
        refiner = refiner.with_hook(Arc::new(hook));
    }
    Ok(refiner)
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    let text = AppConfig::default().to_ron()?;
    write_atomically(path, &text)
        .with_context(|| format!("failed to write {}", path.display()))?;
    refiner_info!("Wrote default configuration to {:?}", path);
    println!("Wrote {}", path.display());
    Ok(())
}
