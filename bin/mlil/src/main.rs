//! MLIL command-line interface
//!
//! Two groups of commands:
//! - `serve`: deploy model containers, report their status until Ctrl+C,
//!   then dump their logs and remove them
//! - `data`, `variable`, `predictions`: calls to the platform REST API

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use mlil_client::{Credentials, MlilClient, VariableValue};
use mlil_deploy::{ManagerConfig, ModelKey, ModelManager};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mlil")]
#[command(about = "MLIL platform client and model deployment tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy model containers and keep them running until Ctrl+C
    Serve(ServeArgs),
    /// Data store operations
    Data {
        #[command(flatten)]
        platform: PlatformArgs,
        #[command(subcommand)]
        action: DataAction,
    },
    /// Variable store operations
    Variable {
        #[command(flatten)]
        platform: PlatformArgs,
        #[command(subcommand)]
        action: VariableAction,
    },
    /// Stored prediction queries
    Predictions {
        #[command(flatten)]
        platform: PlatformArgs,
        #[command(subcommand)]
        action: PredictionsAction,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Model to deploy as NAME/FLAVOR/VERSION[=URI]; URI defaults to models:/NAME/VERSION
    #[arg(short, long = "model", required = true)]
    models: Vec<String>,

    /// Give the model containers access to all GPUs
    #[arg(long)]
    gpu: bool,

    /// Manager configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model container image (empty = MODEL_CONTAINER_IMAGE)
    #[arg(long)]
    image: Option<String>,

    /// Docker network for model containers (empty = MODEL_NETWORK)
    #[arg(long)]
    network: Option<String>,

    /// Tracking URI passed to model containers (empty = MLFLOW_TRACKING_URI)
    #[arg(long)]
    tracking_uri: Option<String>,

    /// Port models are served on inside their containers (empty = MODEL_PORT)
    #[arg(long)]
    port: Option<String>,

    /// Status report interval (seconds)
    #[arg(long, default_value = "30")]
    status_interval_secs: u64,
}

#[derive(Args)]
struct PlatformArgs {
    /// Platform base URL
    #[arg(long, env = "MLIL_URL")]
    url: String,

    /// Platform username
    #[arg(long, env = "MLIL_USERNAME")]
    username: String,

    /// Platform API key
    #[arg(long, env = "MLIL_KEY", hide_env_values = true)]
    key: String,
}

#[derive(Subcommand)]
enum DataAction {
    /// List files in a directory
    List {
        #[arg(default_value = "")]
        directory: String,
    },
    /// Upload a local file
    Upload {
        file_path: PathBuf,
        /// Name in the data store (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Download a file
    Download { file_name: String, output: PathBuf },
}

#[derive(Subcommand)]
enum VariableAction {
    Get { name: String },
    List,
    /// Set a variable; VALUE is parsed as JSON, falling back to a plain string
    Set {
        name: String,
        value: String,
        #[arg(long)]
        overwrite: bool,
    },
    Delete { name: String },
}

#[derive(Subcommand)]
enum PredictionsAction {
    Get {
        model_name: String,
        model_flavor: String,
        model_version_or_alias: String,
    },
    ListModels,
}

/// One `--model` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModelSpec {
    key: ModelKey,
    uri: String,
}

fn parse_model_spec(spec: &str) -> Result<ModelSpec> {
    let (triple, uri) = match spec.split_once('=') {
        Some((triple, uri)) => (triple, Some(uri)),
        None => (spec, None),
    };

    let parts: Vec<&str> = triple.split('/').collect();
    let [name, flavor, version] = parts.as_slice() else {
        return Err(anyhow!(
            "invalid model {:?}: expected NAME/FLAVOR/VERSION[=URI]",
            spec
        ));
    };
    if [name, flavor, version].iter().any(|part| part.is_empty()) {
        return Err(anyhow!("invalid model {:?}: empty component", spec));
    }

    let uri = match uri {
        Some(uri) if !uri.is_empty() => uri.to_string(),
        Some(_) => return Err(anyhow!("invalid model {:?}: empty URI", spec)),
        None => format!("models:/{}/{}", name, version),
    };

    Ok(ModelSpec {
        key: ModelKey::new(*name, *flavor, *version),
        uri,
    })
}

fn parse_variable_value(raw: &str) -> VariableValue {
    serde_json::from_str(raw).unwrap_or_else(|_| VariableValue::from(raw))
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Data { platform, action } => {
            let client = connect(&platform)?;
            run_data(&client, action).await
        }
        Command::Variable { platform, action } => {
            let client = connect(&platform)?;
            run_variable(&client, action).await
        }
        Command::Predictions { platform, action } => {
            let client = connect(&platform)?;
            run_predictions(&client, action).await
        }
    }
}

fn manager_config(args: &ServeArgs) -> Result<ManagerConfig> {
    let mut config = match &args.config {
        Some(path) => ManagerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ManagerConfig::default(),
    };
    if let Some(image) = &args.image {
        config = config.with_image(image.clone());
    }
    if let Some(network) = &args.network {
        config = config.with_network(network.clone());
    }
    if let Some(uri) = &args.tracking_uri {
        config = config.with_tracking_uri(uri.clone());
    }
    if let Some(port) = &args.port {
        config = config.with_port(port.clone());
    }
    Ok(config)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let specs = args
        .models
        .iter()
        .map(|spec| parse_model_spec(spec))
        .collect::<Result<Vec<_>>>()?;

    let manager = Arc::new(ModelManager::connect(manager_config(&args)?).await?);

    deploy_all(&manager, &specs, args.gpu).await?;

    info!("Press Ctrl+C to stop");

    let reporter = {
        let manager = manager.clone();
        let interval = Duration::from_secs(args.status_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                report_status(&manager).await;
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    reporter.abort();

    info!("Shutting down model containers");

    for model in manager.list_deployed_models().await {
        match manager
            .get_model_logs(
                &model.model_name,
                &model.model_flavor,
                &model.model_version_or_alias,
            )
            .await
        {
            Ok(logs) => println!("===== {} =====\n{}", model.container_name, logs),
            Err(err) => warn!(container_name = %model.container_name, error = %err, "Could not fetch logs"),
        }
    }

    let removed = manager.remove_all_models().await?;
    info!(removed = removed.len(), "Model containers removed");

    Ok(())
}

/// Deploy every spec in order. On the first failure, remove whatever was
/// deployed and return that failure; a failed rollback is only logged.
async fn deploy_all(manager: &ModelManager, specs: &[ModelSpec], gpu: bool) -> Result<()> {
    for spec in specs {
        let key = &spec.key;
        let deployed = manager
            .deploy_model(
                &spec.uri,
                &key.model_name,
                &key.model_flavor,
                &key.model_version_or_alias,
                gpu,
            )
            .await;

        match deployed {
            Ok(model) => info!(model = %key, container_name = %model.container_name, "Deployed"),
            Err(err) => {
                error!(model = %key, error = %err, "Deployment failed, rolling back");
                if let Err(rollback_err) = manager.remove_all_models().await {
                    error!(error = %rollback_err, "Rollback failed, containers may be left running");
                }
                return Err(err.into());
            }
        }
    }
    Ok(())
}

async fn report_status(manager: &ModelManager) {
    for model in manager.list_deployed_models().await {
        match manager
            .get_model_status(
                &model.model_name,
                &model.model_flavor,
                &model.model_version_or_alias,
            )
            .await
        {
            Ok(status) => info!(container_name = %model.container_name, status = %status, "Model status"),
            Err(err) => warn!(container_name = %model.container_name, error = %err, "Status unavailable"),
        }
    }
}

fn connect(platform: &PlatformArgs) -> Result<MlilClient> {
    let credentials = Credentials::new(platform.username.clone(), platform.key.clone());
    Ok(MlilClient::new(platform.url.clone(), credentials)?)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_data(client: &MlilClient, action: DataAction) -> Result<()> {
    match action {
        DataAction::List { directory } => print_json(&client.list_data(&directory).await?),
        DataAction::Upload {
            file_path,
            name,
            overwrite,
        } => {
            let name = match name {
                Some(name) => name,
                None => file_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow!("cannot derive a name from {}", file_path.display()))?,
            };
            print_json(&client.upload_data(&file_path, &name, overwrite).await?)
        }
        DataAction::Download { file_name, output } => {
            let written = client.download_data(&file_name, &output).await?;
            info!(file_name = %file_name, bytes = written, output = %output.display(), "Downloaded");
            Ok(())
        }
    }
}

async fn run_variable(client: &MlilClient, action: VariableAction) -> Result<()> {
    match action {
        VariableAction::Get { name } => print_json(&client.get_variable(&name).await?),
        VariableAction::List => print_json(&client.list_variables().await?),
        VariableAction::Set {
            name,
            value,
            overwrite,
        } => {
            let value = parse_variable_value(&value);
            print_json(&client.set_variable(&name, &value, overwrite).await?)
        }
        VariableAction::Delete { name } => print_json(&client.delete_variable(&name).await?),
    }
}

async fn run_predictions(client: &MlilClient, action: PredictionsAction) -> Result<()> {
    match action {
        PredictionsAction::Get {
            model_name,
            model_flavor,
            model_version_or_alias,
        } => print_json(
            &client
                .get_predictions(&model_name, &model_flavor, &model_version_or_alias)
                .await?,
        ),
        PredictionsAction::ListModels => print_json(&client.list_prediction_models().await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use mlil_deploy::{DeployError, MockRuntime};

    fn serve_args(argv: &[&str]) -> ServeArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Serve(args) => args,
            _ => panic!("expected serve"),
        }
    }

    fn mock_manager(runtime: Arc<MockRuntime>) -> ModelManager {
        ModelManager::with_runtime(ManagerConfig::default(), runtime).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_model_spec_default_uri() {
        let spec = parse_model_spec("churn/sklearn/1").unwrap();
        assert_eq!(spec.key, ModelKey::new("churn", "sklearn", "1"));
        assert_eq!(spec.uri, "models:/churn/1");
    }

    #[test]
    fn test_parse_model_spec_explicit_uri() {
        let spec = parse_model_spec("churn/pyfunc/champion=models:/churn@champion").unwrap();
        assert_eq!(spec.key.model_version_or_alias, "champion");
        assert_eq!(spec.uri, "models:/churn@champion");
    }

    #[test]
    fn test_parse_model_spec_rejects_malformed() {
        assert!(parse_model_spec("churn/sklearn").is_err());
        assert!(parse_model_spec("churn//1").is_err());
        assert!(parse_model_spec("a/b/c/d").is_err());
        assert!(parse_model_spec("a/b/c=").is_err());
    }

    #[test]
    fn test_parse_variable_value() {
        assert_eq!(parse_variable_value("3"), VariableValue::Integer(3));
        assert_eq!(parse_variable_value("true"), VariableValue::Bool(true));
        assert_eq!(
            parse_variable_value("[1, \"a\"]"),
            VariableValue::List(vec![VariableValue::Integer(1), VariableValue::from("a")])
        );
        assert_eq!(parse_variable_value("hello"), VariableValue::from("hello"));
    }

    #[test]
    fn test_serve_overrides_apply_to_config() {
        let args = serve_args(&[
            "mlil", "serve", "-m", "churn/sklearn/1", "--port", "9000", "--network", "staging",
        ]);
        let config = manager_config(&args).unwrap();

        assert_eq!(config.model_port, "9000");
        assert_eq!(config.model_network, "staging");
        assert_eq!(config.resolve().unwrap().model_port, 9000);
    }

    #[test]
    fn test_serve_without_port_keeps_default() {
        let args = serve_args(&["mlil", "serve", "-m", "churn/sklearn/1"]);
        assert_eq!(manager_config(&args).unwrap().model_port, "8888");
    }

    #[tokio::test]
    async fn test_deploy_all_rolls_back_on_failure() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.fail_run_for("mlinsightlab__model__wine__sklearn__2", "no such image");
        let manager = mock_manager(runtime.clone());
        let specs = vec![
            parse_model_spec("churn/sklearn/1").unwrap(),
            parse_model_spec("wine/sklearn/2").unwrap(),
        ];

        let err = deploy_all(&manager, &specs, false).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::Deployment(_))
        ));
        assert!(manager.list_deployed_models().await.is_empty());
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_deployment_error() {
        let runtime = Arc::new(MockRuntime::new().with_stop_failure("container is paused"));
        runtime.fail_run_for("mlinsightlab__model__wine__sklearn__2", "no such image");
        let manager = mock_manager(runtime.clone());
        let specs = vec![
            parse_model_spec("churn/sklearn/1").unwrap(),
            parse_model_spec("wine/sklearn/2").unwrap(),
        ];

        let err = deploy_all(&manager, &specs, false).await.unwrap_err();

        match err.downcast_ref::<DeployError>() {
            Some(DeployError::Deployment(detail)) => assert_eq!(detail, "no such image"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(manager.list_deployed_models().await.len(), 1);
    }
}
