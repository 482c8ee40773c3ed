use anyhow::{bail, Context};
use clap::Parser;
use serde_json::Value;
use tourbook::domain::model::DocumentId;
use tourbook::utils::{logger, validation::Validate};
use tourbook::{
    AppConfig, CliConfig, Command, MemoryStore, QueryParams, Recalculator, ReviewService, Seed,
    StoreError, TourService,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    let config = match &cli.config {
        Some(path) => match AppConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config file '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };

    let level = config.logging.level.as_deref();
    if config.logging.is_json() && !cli.verbose {
        logger::init_json_logger(level);
    } else {
        logger::init_cli_logger(cli.verbose, level);
    }

    tracing::info!("Starting tourbook");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
        tracing::debug!("App config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }

    match run(cli, config).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("{:#}", e);

            // Client errors (bad ids, unknown tours) exit with 2, everything else with 1.
            let exit_code = match e.downcast_ref::<StoreError>() {
                Some(err) if err.is_operational() && err.status_code() < 500 => 2,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: CliConfig, config: AppConfig) -> anyhow::Result<Value> {
    let store = MemoryStore::with_names(
        &config.store.tours_collection,
        &config.store.reviews_collection,
    );
    let tours = TourService::new(store.tours.clone(), &config);
    let reviews = ReviewService::new(store.reviews.clone(), store.tours.clone(), &config);

    let seed_path = cli
        .seed
        .clone()
        .or_else(|| config.store.seed_file.clone().map(Into::into));
    match seed_path {
        Some(path) => {
            let seed = Seed::from_file(&path)
                .await
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;
            seed.load_into(&tours, &reviews).await?;
        }
        None => tracing::warn!("No seed file given, the store is empty"),
    }

    match cli.command {
        Command::Query { collection, query } => {
            let params = QueryParams::parse(&query);
            let documents = if collection == config.store.tours_collection {
                tours.list(&params).await?
            } else if collection == config.store.reviews_collection {
                reviews.list(None, &params).await?
            } else {
                bail!("Unknown collection '{}'", collection);
            };
            tracing::info!("{} {} matched", documents.len(), collection);
            Ok(Value::Array(
                documents.into_iter().map(Value::Object).collect(),
            ))
        }
        Command::Recalculate { tour_id } => {
            let tour_id = DocumentId::parse("tour", &tour_id)?;
            let stats = reviews.recalculator().recalculate(tour_id).await?;
            Ok(serde_json::to_value(stats)?)
        }
    }
}
