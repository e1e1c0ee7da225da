use std::sync::Arc;
use std::time::Duration;

use chordkv_node::logging::init_logging;
use chordkv_node::logging::LogLevel;
use chordkv_node::native::config;
use chordkv_node::native::endpoint::run_node_api;
use chordkv_node::native::endpoint::run_registry_api;
use chordkv_node::processor::ProcessorBuilder;
use chordkv_node::registry::choose_introducer;
use chordkv_node::registry::Registry;
use chordkv_rpc::types::Args as KvArgs;
use chordkv_rpc::Client;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a configuration file with the default settings.")]
    Init(InitCommand),
    #[command(about = "Starts a long-running node daemon.")]
    Run(RunCommand),
    #[command(about = "Starts the membership registry.")]
    Registry(RegistryCommand),
    #[command(about = "Reads a key.")]
    Get(KeyCommand),
    #[command(about = "Stores a value under a key, overwriting it.")]
    Put(KeyValueCommand),
    #[command(about = "Appends a value to the value list of a key.")]
    Append(KeyValueCommand),
    #[command(about = "Deletes a key on every node.")]
    Delete(KeyCommand),
    #[command(
        about = "Show information of the node. Include successors, predecessor, finger table and stored keys."
    )]
    Inspect(InspectCommand),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(
        long,
        short = 'c',
        env,
        default_value = config::DEFAULT_CONFIG_PATH,
        help = "Config file location"
    )]
    pub config: String,
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        default_value = config::DEFAULT_CONFIG_PATH,
        help = "The location of config file"
    )]
    pub location: String,
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(
        long,
        short = 'b',
        help = "Host the node binds and announces. If not provided, use bind_host in config file or 127.0.0.1",
        env
    )]
    pub bind_host: Option<String>,

    #[arg(long, help = "Ring address of a node to join through", env)]
    pub join: Option<String>,

    #[arg(
        long,
        help = "Create a new ring, ignoring the registry and join settings",
        conflicts_with = "join"
    )]
    pub create: bool,

    #[arg(long, help = "JSON-RPC endpoint of the registry", env)]
    pub registry_url: Option<String>,

    #[arg(
        long,
        help = "Stabilize interval in seconds. If not provided, use stabilize_interval in config file or 10",
        env
    )]
    pub stabilize_interval: Option<u64>,

    #[command(flatten)]
    config_args: ConfigArgs,
}

#[derive(Args, Debug)]
struct RegistryCommand {
    #[arg(long, short = 'b', help = "Host the registry binds", env)]
    pub bind_host: Option<String>,

    #[command(flatten)]
    config_args: ConfigArgs,
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[arg(
        long,
        short = 'u',
        help = "chordkv node endpoint url. If not provided, use bind_host and ports.rpc of the config file",
        env
    )]
    endpoint_url: Option<String>,

    #[command(flatten)]
    config_args: ConfigArgs,
}

impl ClientArgs {
    fn new_client(&self) -> anyhow::Result<Client> {
        let c = config::Config::read_fs_or_default(self.config_args.config.as_str())?;
        let endpoint_url = self
            .endpoint_url
            .clone()
            .unwrap_or_else(|| c.rpc_endpoint(&c.bind_host));
        Ok(Client::new(&endpoint_url).with_retry(c.retry()))
    }
}

#[derive(Args, Debug)]
struct KeyCommand {
    #[command(flatten)]
    client_args: ClientArgs,

    key: String,
}

#[derive(Args, Debug)]
struct KeyValueCommand {
    #[command(flatten)]
    client_args: ClientArgs,

    key: String,
    value: String,
}

#[derive(Args, Debug)]
struct InspectCommand {
    #[command(flatten)]
    client_args: ClientArgs,
}

fn get_value<V>(value: Option<V>, default_value: V) -> V {
    value.unwrap_or(default_value)
}

async fn daemon_run(args: RunCommand) -> anyhow::Result<()> {
    let mut c = config::Config::read_fs_or_default(args.config_args.config.as_str())?;
    c.bind_host = get_value(args.bind_host, c.bind_host);
    c.stabilize_interval = get_value(args.stabilize_interval, c.stabilize_interval);
    if args.join.is_some() {
        c.join = args.join;
    }
    if args.registry_url.is_some() {
        c.registry_url = args.registry_url;
    }

    let processor = Arc::new(ProcessorBuilder::from_config(&c).build().await?);
    let me = processor.me().clone();
    println!("Did: {}", me.id);
    println!("Ring address: {}", me.address);

    let introducer = if args.create {
        None
    } else if let Some(join) = c.join.clone() {
        Some(join)
    } else if let Some(registry_url) = c.registry_url.as_ref() {
        let actives = Client::new(registry_url)
            .register_node(&me.address)
            .await?
            .nodes;
        choose_introducer(&actives, &me.address)
    } else {
        None
    };

    let rpc_addr = format!("{}:{}", c.bind_host, c.ports.rpc);
    let api = run_node_api(&rpc_addr, processor.clone());
    let enter = async {
        processor.enter_ring(introducer.as_deref()).await?;
        // once in the ring, only the api or Ctrl-C ends the daemon
        futures::future::pending::<()>().await;
        Ok::<(), chordkv_node::error::Error>(())
    };

    tokio::select! {
        r = api => r?,
        r = enter => r?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down, handing entries to the successor");
            match tokio::time::timeout(
                Duration::from_secs(c.wait_successor_interval * 3),
                processor.leave(),
            )
            .await
            {
                Ok(Ok(reply)) => println!("{}", reply),
                Ok(Err(e)) => tracing::error!("leave hand-off failed: {}", e),
                Err(_) => tracing::error!("leave hand-off timed out"),
            }
        }
    }
    Ok(())
}

async fn registry_run(args: RegistryCommand) -> anyhow::Result<()> {
    let mut c = config::Config::read_fs_or_default(args.config_args.config.as_str())?;
    c.bind_host = get_value(args.bind_host, c.bind_host);
    let addr = format!("{}:{}", c.bind_host, c.ports.registry);

    let registry = Arc::new(Registry::new(c));
    let (api, _) = futures::join!(run_registry_api(&addr, registry.clone()), registry.run());
    api
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Init(args) => {
            let p = config::Config::default().write_fs(args.location.as_str())?;
            println!("Your config file has saved to: {}", p);
            Ok(())
        }
        Command::Run(args) => daemon_run(args).await,
        Command::Registry(args) => registry_run(args).await,
        Command::Get(args) => {
            let reply = args
                .client_args
                .new_client()?
                .get(&KvArgs::key(&args.key))
                .await?;
            println!("{}", reply);
            Ok(())
        }
        Command::Put(args) => {
            let reply = args
                .client_args
                .new_client()?
                .put(&KvArgs::key_value(&args.key, &args.value))
                .await?;
            println!("{}", reply);
            Ok(())
        }
        Command::Append(args) => {
            let reply = args
                .client_args
                .new_client()?
                .append(&KvArgs::key_value(&args.key, &args.value))
                .await?;
            println!("{}", reply);
            Ok(())
        }
        Command::Delete(args) => {
            let reply = args
                .client_args
                .new_client()?
                .delete(&KvArgs::key(&args.key))
                .await?;
            println!("{}", reply);
            Ok(())
        }
        Command::Inspect(args) => {
            let info = args.client_args.new_client()?.node_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}
