use anyhow::Context;
use scribe::{
    AppState, InMemoryKnowledgeStore, KnowledgeStore, LLMClientFactory, ResearchPipeline,
    ScribeConfig, ScribeConfigManager,
    agents::{LlmAnalyst, LlmCellFactory, LlmContentAnalyzer},
    api::routes::build_app,
    cli::{Cli, Commands, output::Output},
    knowledge::{StoreId, TextChunker, create_embedder},
    pipeline::RunState,
    tools::DaedraSearcher,
    utils::toml_config::ConfigError,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let (config_manager, loaded) = load_config(&cli.config)?;
    let config = config_manager.config();
    init_tracing(&config, cli.verbose, cli.log_json);

    if !loaded {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Config { validate } => {
            show_config(&output, &cli.config, &config, loaded, validate);
            Ok(())
        }
        Commands::Run { query, output: path } => {
            let pipeline = build_pipeline(&config).await?;
            run_once(&output, &pipeline, query, path.as_deref(), cli.verbose).await
        }
        Commands::Serve => {
            if loaded {
                config_manager
                    .start_watching()
                    .context("failed to watch the config file")?;
            }
            let pipeline = build_pipeline(&config).await?;
            serve(config_manager, pipeline).await
        }
    }
}

/// Load the config file, or fall back to defaults when it does not exist
fn load_config(path: &Path) -> anyhow::Result<(ScribeConfigManager, bool)> {
    match ScribeConfigManager::new(path) {
        Ok(manager) => Ok((manager, true)),
        Err(ConfigError::FileNotFound(_)) => {
            Ok((ScribeConfigManager::from_config(ScribeConfig::default()), false))
        }
        Err(e) => Err(e).with_context(|| format!("failed to load {}", path.display())),
    }
}

fn init_tracing(config: &ScribeConfig, verbose: bool, json: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.server.log_level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("scribe={0},scribe_server={0},tower_http=info", default_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Wire model clients, the knowledge store and the searcher into a pipeline
async fn build_pipeline(config: &Arc<ScribeConfig>) -> anyhow::Result<ResearchPipeline> {
    let factory = LLMClientFactory::from_config(&config.llm);
    let reader = factory.create_for_model(config.reading_model()).await?;
    let analyst = factory.create_for_model(config.analysis_model()).await?;
    let writer = factory.create_for_model(config.writing_model()).await?;
    tracing::info!(
        reading = config.reading_model(),
        analysis = config.analysis_model(),
        writing = config.writing_model(),
        "language models ready"
    );

    let embedder = create_embedder(&config.embedding)?;
    let store: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new(embedder));
    let corpus = ingest_corpus(store.as_ref(), config).await?;

    let pipeline = ResearchPipeline::builder(Arc::clone(config))
        .searcher(Arc::new(DaedraSearcher::new()))
        .analyzer(Arc::new(LlmContentAnalyzer::new(reader)))
        .analyst(Arc::new(LlmAnalyst::new(analyst)))
        .cell_factory(Arc::new(LlmCellFactory::new(writer, config.writing.clone())))
        .store(store)
        .corpus(corpus)
        .build()?;
    Ok(pipeline)
}

/// Chunk every configured corpus file into one long-lived store
async fn ingest_corpus(
    store: &dyn KnowledgeStore,
    config: &ScribeConfig,
) -> anyhow::Result<Option<StoreId>> {
    let knowledge = &config.knowledge;
    if knowledge.corpus_paths.is_empty() {
        return Ok(None);
    }

    let chunker = TextChunker::new(knowledge.chunk_size, knowledge.chunk_overlap)?;
    let store_id = store.create_store("corpus", &config.embedding).await?;

    let mut total = 0;
    for path in &knowledge.corpus_paths {
        match chunker.ingest_file(store, &store_id, path).await {
            Ok(added) => total += added,
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "skipping corpus file"),
        }
    }
    tracing::info!(store = %store_id, chunks = total, "corpus ready");

    Ok(Some(store_id))
}

async fn serve(config_manager: ScribeConfigManager, pipeline: ResearchPipeline) -> anyhow::Result<()> {
    let config = config_manager.config();
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState {
        config_manager: Arc::new(config_manager),
        pipeline: Arc::new(pipeline),
    };
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received, stopping server...");
        })
        .await
        .context("server error")
}

async fn run_once(
    output: &Output,
    pipeline: &ResearchPipeline,
    query: String,
    path: Option<&Path>,
    verbose: bool,
) -> anyhow::Result<()> {
    output.banner();
    output.header(&query);

    let mut handle = pipeline.start(query);
    while let Some(event) = handle.events.recv().await {
        output.event(&event, verbose);
    }
    let outcome = handle.join().await?;

    output.newline();
    if outcome.state != RunState::Done {
        let reason = outcome.error.unwrap_or_else(|| "unknown error".to_string());
        output.error(&format!("run {} failed: {}", outcome.run_id, reason));
        anyhow::bail!("research run failed");
    }

    let report = outcome.report.unwrap_or_default();
    match path {
        Some(path) => {
            tokio::fs::write(path, &report)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            output.success(&format!("report written to {}", path.display()));
        }
        None => println!("{}", report),
    }
    Ok(())
}

fn show_config(output: &Output, path: &Path, config: &ScribeConfig, loaded: bool, validate: bool) {
    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    if !loaded {
        output.warning("file not found, showing defaults");
    }

    output.kv("server", &format!("{}:{}", config.server.host, config.server.port));
    output.kv("reading model", config.reading_model());
    output.kv("analysis model", config.analysis_model());
    output.kv("writing model", config.writing_model());
    output.kv("embedding", &format!("{:?} ({})", config.embedding.provider, config.embedding.dimension));
    output.kv("max results", &config.search.max_results.to_string());
    output.kv("max turns", &config.writing.max_turns.to_string());
    output.kv("section retries", &config.writing.section_retries.to_string());

    if !config.knowledge.corpus_paths.is_empty() {
        output.header("Corpus");
        for corpus in &config.knowledge.corpus_paths {
            output.list_item(&corpus.display().to_string());
        }
    }

    if validate {
        output.newline();
        match config.validate() {
            Ok(()) => output.success("configuration is valid"),
            Err(e) => output.error(&e.to_string()),
        }
    } else {
        output.hint("use --validate to check the configuration");
    }
}
