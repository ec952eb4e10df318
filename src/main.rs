use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use repo_discovery::api::ReqwestTransport;
use repo_discovery::models::{DiscoveryTask, ScanTask, Service};
use repo_discovery::{
    Config, DeliveryOutcome, MemoryQueue, PaginationDriver, SqliteQueue, TaskProducer, Worker,
};

#[derive(Parser, Debug)]
#[command(name = "repo-discovery")]
#[command(version = "0.1.0")]
#[command(about = "Discover repositories and branches and queue them for scanning")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue an initial discovery task for each organization
    Seed(TaskArgs),

    /// Process discovery tasks from the local queue
    Work {
        /// Stop once the queue is empty
        #[arg(long)]
        once: bool,

        /// Seconds to wait between polls of an empty queue
        #[arg(long, default_value = "5")]
        idle_secs: u64,
    },

    /// Print pending messages as JSON lines
    Pending {
        /// Show scan tasks instead of discovery tasks
        #[arg(long)]
        scan: bool,
    },

    /// Run a whole discovery in memory and print the scan tasks it finds
    Discover {
        #[command(flatten)]
        task: TaskArgs,

        /// Output format (json, text)
        #[arg(short, long, default_value = "json")]
        format: String,
    },
}

#[derive(Args, Debug)]
struct TaskArgs {
    /// Provider: github, gitlab, bitbucket, bitbucket-private
    #[arg(short, long)]
    service: Service,

    /// Organization, group, workspace or project key
    #[arg(short, long, required = true)]
    org: Vec<String>,

    /// Only scan each repository's default branch
    #[arg(long)]
    default_branch_only: bool,

    /// Plugins to run on every discovered branch
    #[arg(short, long)]
    plugin: Vec<String>,

    /// Organizations eligible for cross-reference
    #[arg(long)]
    external_org: Vec<String>,
}

impl TaskArgs {
    fn tasks(&self) -> Vec<DiscoveryTask> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        self.org
            .iter()
            .map(|org| {
                DiscoveryTask::new(self.service, org.clone(), batch_id.clone())
                    .with_default_branch_only(self.default_branch_only)
                    .with_plugins(self.plugin.clone())
                    .with_external_orgs(self.external_org.clone())
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("repo_discovery=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Seed(args) => seed(&config, &args).await,
        Command::Work { once, idle_secs } => {
            work(&config, once, Duration::from_secs(idle_secs)).await
        }
        Command::Pending { scan } => pending(&config, scan),
        Command::Discover { task, format } => discover(&config, &task, &format).await,
    }
}

async fn seed(config: &Config, args: &TaskArgs) -> anyhow::Result<()> {
    let queue = Arc::new(SqliteQueue::new(&config.database_path)?);
    let producer = TaskProducer::new(
        queue,
        config.discovery_queue.clone(),
        config.scan_queue.clone(),
    );

    for task in args.tasks() {
        producer.publish_discovery(&task).await?;
        tracing::info!("Seeded {}/{} (batch {})", task.service, task.org, task.batch_id);
    }

    Ok(())
}

async fn work(config: &Config, once: bool, idle: Duration) -> anyhow::Result<()> {
    let queue = Arc::new(SqliteQueue::new(&config.database_path)?);
    let producer = TaskProducer::new(
        queue.clone(),
        config.discovery_queue.clone(),
        config.scan_queue.clone(),
    );
    let transport = Arc::new(ReqwestTransport::new(config.http_timeout)?);
    let driver = Arc::new(PaginationDriver::new(config.discovery.clone(), transport, producer));

    tracing::info!(
        "Processing {} with up to {} concurrent deliveries",
        config.discovery_queue,
        config.concurrency_limit
    );
    Worker::new(driver, queue, config.concurrency_limit)
        .run(once, idle)
        .await?;

    Ok(())
}

fn pending(config: &Config, scan: bool) -> anyhow::Result<()> {
    let queue = SqliteQueue::new(&config.database_path)?;
    let name = if scan { &config.scan_queue } else { &config.discovery_queue };

    for message in queue.pending(name)? {
        println!("{}", message.body);
    }

    Ok(())
}

async fn discover(config: &Config, args: &TaskArgs, format: &str) -> anyhow::Result<()> {
    let queue = Arc::new(MemoryQueue::new());
    let producer = TaskProducer::new(queue.clone(), "discovery", "scan");
    let transport = Arc::new(ReqwestTransport::new(config.http_timeout)?);
    let driver = PaginationDriver::new(config.discovery.clone(), transport, producer.clone());

    for task in args.tasks() {
        producer.publish_discovery(&task).await?;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );

    let mut deliveries = 0u64;
    while let Some(body) = queue.pop("discovery") {
        let task: DiscoveryTask = serde_json::from_str(&body)?;
        let outcome = driver.run(&task).await?;
        deliveries += 1;
        spinner.set_message(format!("{} deliveries, {} scan tasks", deliveries, queue.len("scan")));
        spinner.tick();

        // The in-memory queue has no delayed delivery; wait here instead.
        if outcome == DeliveryOutcome::Requeued {
            tokio::time::sleep(config.discovery.requeue_delay).await;
        }
    }
    spinner.finish_with_message(format!("Discovery finished after {} deliveries", deliveries));

    let scan_tasks = queue.scan_tasks("scan");
    let output = match format {
        "text" => format_text(&scan_tasks),
        _ => scan_tasks
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?
            .join("\n"),
    };
    println!("{}", output);

    Ok(())
}

fn format_text(tasks: &[ScanTask]) -> String {
    let mut output = String::new();

    output.push_str(&format!("\n=== {} scan tasks ===\n\n", tasks.len()));
    for task in tasks {
        output.push_str(&format!(
            "  {}/{}/{} @ {}",
            task.service, task.org, task.repo, task.branch
        ));
        if !task.plugins.is_empty() {
            output.push_str(&format!(" [{}]", task.plugins.join(", ")));
        }
        output.push('\n');
    }

    output
}
