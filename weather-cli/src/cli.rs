use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::{Password, Text};
use weather_digest_core::{
    Config, Job, Registration, Scheduler, Secret, TaskQueue, TokioTime, queue::memory::MemoryQueue,
};

use crate::app::App;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-digest", version, about = "Weather metrics and daily digest service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively write the configuration file.
    Configure,

    /// Run metrics collection and digest dispatch until Ctrl-C.
    Run,

    /// Collect current metrics for every registered city once.
    Collect,

    /// Send one round of digests.
    Dispatch {
        /// Print the digests instead of publishing them.
        #[arg(long)]
        preview: bool,
    },

    /// Register a user with a list of cities.
    Register {
        #[arg(long)]
        email: String,

        /// City name; repeat for several cities.
        #[arg(long = "city")]
        cities: Vec<String>,
    },

    /// Replace a user's cities.
    Update {
        #[arg(long)]
        email: String,

        #[arg(long = "city")]
        cities: Vec<String>,
    },

    /// Show a registered user.
    User { email: String },

    /// Remove a registered user.
    Delete { email: String },

    /// List registered cities.
    Cities,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Run => run_service().await,
            Command::Collect => collect().await,
            Command::Dispatch { preview } => dispatch(preview).await,
            Command::Register { email, cities } => register(&email, &cities).await,
            Command::Update { email, cities } => {
                let app = App::load()?;
                let registration = app.registration(None).await?;
                let cities = registration.change_cities(&email, &cities).await?;
                println!("{email}: {}", cities.join(", "));
                Ok(())
            }
            Command::User { email } => {
                let app = App::load()?;
                let user = app.registration(None).await?.get(&email).await?;
                println!("{}: {}", user.email, user.cities.join(", "));
                Ok(())
            }
            Command::Delete { email } => {
                let app = App::load()?;
                app.registration(None).await?.delete(&email).await?;
                println!("Deleted {email}");
                Ok(())
            }
            Command::Cities => {
                let app = App::load()?;
                let store = app.clickhouse().await?;
                let registry = app.registry(&store).await?;
                for city in registry.snapshot() {
                    println!("{:<24} {:>9.4} {:>9.4}", city.name, city.coords.lat, city.coords.lon);
                }
                Ok(())
            }
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key (leave empty to keep current):")
        .without_confirmation()
        .prompt()?;
    if !api_key.is_empty() {
        config.provider.api_key = Secret::new(api_key);
    }

    config.clickhouse.url = Text::new("ClickHouse URL:")
        .with_default(&config.clickhouse.url)
        .prompt()?;
    config.clickhouse.database = Text::new("ClickHouse database:")
        .with_default(&config.clickhouse.database)
        .prompt()?;
    config.clickhouse.user = Text::new("ClickHouse user:")
        .with_default(&config.clickhouse.user)
        .prompt()?;
    let password = Password::new("ClickHouse password (leave empty to keep current):")
        .without_confirmation()
        .prompt()?;
    if !password.is_empty() {
        config.clickhouse.password = Secret::new(password);
    }

    let rabbit_url = Password::new("RabbitMQ URL (leave empty to keep current):")
        .without_confirmation()
        .prompt()?;
    if !rabbit_url.is_empty() {
        config.rabbitmq.url = Secret::new(rabbit_url);
    }

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn run_service() -> Result<()> {
    let app = App::load()?;
    let provider = app.provider()?;
    let clickhouse = app.clickhouse().await?;
    let registry = app.registry(&clickhouse).await?;
    let users = app.users()?;
    let queue = app.amqp().await?;

    let collector = app.collector(Arc::clone(&registry), Arc::clone(&provider), clickhouse);
    let dispatcher = app.dispatcher(
        registry,
        provider,
        users,
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
    )?;

    let schedule = &app.config().schedule;
    let mut scheduler = Scheduler::new(Arc::new(TokioTime))
        .every(schedule.collect_interval(), Arc::new(collector) as Arc<dyn Job>)
        .every(schedule.dispatch_interval(), Arc::new(dispatcher) as Arc<dyn Job>);
    scheduler.start();
    tracing::info!("service started, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("shutting down");
    scheduler.stop().await;
    drop(scheduler);

    match Arc::try_unwrap(queue) {
        Ok(queue) => queue.close().await?,
        Err(_) => tracing::warn!("queue still in use, skipping close"),
    }
    Ok(())
}

async fn collect() -> Result<()> {
    let app = App::load()?;
    let provider = app.provider()?;
    let clickhouse = app.clickhouse().await?;
    let registry = app.registry(&clickhouse).await?;

    let written = app
        .collector(registry, provider, clickhouse)
        .collect_once()
        .await?;
    println!("Stored {written} samples");
    Ok(())
}

async fn dispatch(preview: bool) -> Result<()> {
    let app = App::load()?;
    let provider = app.provider()?;
    let clickhouse = app.clickhouse().await?;
    let registry = app.registry(&clickhouse).await?;
    let users = app.users()?;

    if preview {
        let queue = Arc::new(MemoryQueue::new());
        let dispatcher = app.dispatcher(
            registry,
            provider,
            users,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
        )?;
        dispatcher.dispatch_once().await?;
        for task in queue.take() {
            println!("To: {}\nSubject: {}\n\n{}\n", task.to, task.subject, task.body);
        }
        return Ok(());
    }

    let queue = app.amqp().await?;
    let dispatcher = app.dispatcher(
        registry,
        provider,
        users,
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
    )?;
    let report = dispatcher.dispatch_once().await?;
    drop(dispatcher);
    println!(
        "Users: {}, published: {}, skipped: {}, failed: {}",
        report.users, report.published, report.skipped, report.failed
    );

    if let Ok(queue) = Arc::try_unwrap(queue) {
        queue.close().await?;
    }
    Ok(())
}

async fn register(email: &str, cities: &[String]) -> Result<()> {
    let app = App::load()?;
    let queue = app.amqp().await?;
    let registration = app
        .registration(Some(Arc::clone(&queue) as Arc<dyn TaskQueue>))
        .await?;

    match registration.register(email, cities).await? {
        Registration::Registered { cities } => {
            println!("Registered {email}: {}", cities.join(", "));
        }
        Registration::AlreadyRegistered => println!("{email} is already registered"),
    }

    registration.flush_welcomes().await;
    drop(registration);
    if let Ok(queue) = Arc::try_unwrap(queue) {
        queue.close().await?;
    }
    Ok(())
}
