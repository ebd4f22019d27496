//! kpm CLI - The Kubernetes package manager with sharded deployments and release channels

use clap::{Parser, Subcommand};
use kpm_registry::KpmConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use commands::channel::ChannelAction;
use commands::generate::OutputFormat;
use commands::render::RenderOptions;
use commands::{Context, RegistryPackage, RenderArgs};
use error::Result;

#[derive(Parser)]
#[command(name = "kpm")]
#[command(author = "kpm Contributors")]
#[command(version)]
#[command(about = "The Kubernetes package manager with sharded deployments and release channels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Registry endpoint
    #[arg(short = 'H', long = "registry", global = true, env = "KPM_REGISTRY")]
    registry: Option<String>,

    /// Target namespace
    #[arg(long, global = true, env = "KPM_NAMESPACE")]
    namespace: Option<String>,

    /// Configuration file (default: ~/.config/kpm/config.yaml)
    #[arg(long, global = true, env = "KPM_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a package to the cluster
    Deploy {
        #[command(flatten)]
        args: RenderArgs,

        /// Delete and re-create every resource
        #[arg(long)]
        force: bool,

        /// Render and report without touching the cluster
        #[arg(long)]
        dry_run: bool,

        /// Reconcile distinct shards concurrently
        #[arg(long)]
        parallel_shards: bool,
    },

    /// Delete a package's resources from the cluster
    Remove {
        #[command(flatten)]
        args: RenderArgs,

        /// Render and report without touching the cluster
        #[arg(long)]
        dry_run: bool,

        /// Reconcile distinct shards concurrently
        #[arg(long)]
        parallel_shards: bool,
    },

    /// Render a package's resources to stdout
    Generate {
        #[command(flatten)]
        args: RenderArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },

    /// Download and extract a package
    Pull {
        #[command(flatten)]
        package: RegistryPackage,

        /// Extract below this directory
        #[arg(long, default_value = ".")]
        directory: PathBuf,

        /// Allow extraction into a non-empty directory
        #[arg(long)]
        overwrite: bool,
    },

    /// Show a package's manifest, files or a single file
    Show {
        #[command(flatten)]
        package: RegistryPackage,

        /// List files inside the package
        #[arg(long, conflicts_with = "file")]
        tree: bool,

        /// Display a file
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Pack a local package and push it to the registry
    Push {
        /// Package directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an already published version
        #[arg(short, long)]
        force: bool,
    },

    /// Scaffold a new package
    New {
        /// Package name (namespace/name)
        package: String,

        /// Parent directory
        #[arg(long, default_value = ".")]
        directory: PathBuf,

        /// Add help comments to the manifest
        #[arg(long)]
        with_comments: bool,
    },

    /// Manage release channels
    Channel {
        /// Package name (namespace/name)
        package: String,

        /// Channel name
        #[arg(short, long)]
        name: Option<String>,

        /// Create the channel
        #[arg(long)]
        create: bool,

        /// Add a release to the channel
        #[arg(long, value_name = "VERSION")]
        add: Option<String>,

        /// Remove a release from the channel
        #[arg(long, value_name = "VERSION")]
        remove: Option<String>,
    },

    /// List packages in the registry
    List {
        /// Only packages owned by this user
        #[arg(short, long)]
        user: Option<String>,

        /// Only packages of this organization
        #[arg(short, long)]
        organization: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a package from the registry
    DeletePackage {
        /// Package name (namespace/name)
        package: String,

        /// Only delete this version
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Render a single template file without a package
    Render {
        /// Template file
        file: PathBuf,

        /// Variable overrides: key=value (dotted keys, JSON values) or a JSON object
        #[arg(short = 'x', long = "variables", value_name = "VARS")]
        variables: Vec<String>,

        /// YAML or JSON files of variables, merged before -x values
        #[arg(long = "variables-file", value_name = "FILE")]
        variables_files: Vec<PathBuf>,

        /// Shards: a count or a JSON list of shard objects
        #[arg(long, allow_hyphen_values = true)]
        shards: Option<String>,

        /// Render the template as an expression instead of plain ${var} substitution
        #[arg(short = 'j', long)]
        expression: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },

    /// Show client and registry API versions
    Version,

    /// Run a command in the first pod of a workload
    Exec {
        /// Workload kind: deployment, rs or rc (replication controllers need `--kind rc`)
        #[arg(short, long, default_value = "deployment")]
        kind: String,

        /// Workload name
        #[arg(short, long)]
        name: String,

        /// Container name (default: the pod's first container)
        #[arg(short, long)]
        container: Option<String>,

        /// Command to run
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file, then environment and flags on top
fn load_config(cli: &Cli) -> Result<KpmConfig> {
    let config = match &cli.config {
        Some(path) => KpmConfig::load_from(path)?,
        None => KpmConfig::load()?,
    };
    let config = config.with_overrides(cli.registry.as_deref(), cli.namespace.as_deref());
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::new(load_config(&cli)?);
    tracing::debug!(
        registry = %ctx.config.registry,
        namespace = %ctx.config.namespace,
        "loaded configuration"
    );

    match cli.command {
        Commands::Deploy {
            args,
            force,
            dry_run,
            parallel_shards,
        } => {
            let mode = commands::deploy::install_mode(force, dry_run);
            commands::deploy::run(&ctx, &args, mode, parallel_shards).await
        }

        Commands::Remove {
            args,
            dry_run,
            parallel_shards,
        } => {
            let mode = commands::deploy::remove_mode(dry_run);
            commands::deploy::run(&ctx, &args, mode, parallel_shards).await
        }

        Commands::Generate { args, output } => commands::generate::run(&ctx, &args, output).await,

        Commands::Pull {
            package,
            directory,
            overwrite,
        } => commands::pull::run(&ctx, &package, &directory, overwrite).await,

        Commands::Show {
            package,
            tree,
            file,
        } => commands::show::run(&ctx, &package, tree, file.as_deref()).await,

        Commands::Push { path, force } => commands::push::run(&ctx, &path, force).await,

        Commands::New {
            package,
            directory,
            with_comments,
        } => commands::new::run(&package, &directory, with_comments).map(|_| ()),

        Commands::Channel {
            package,
            name,
            create,
            add,
            remove,
        } => {
            let action = ChannelAction::from_flags(
                name.as_deref(),
                create,
                add.as_deref(),
                remove.as_deref(),
            )?;
            commands::channel::run(&ctx, &package, action).await
        }

        Commands::List {
            user,
            organization,
            json,
        } => commands::list::run(&ctx, user.as_deref(), organization.as_deref(), json).await,

        Commands::DeletePackage { package, version } => {
            commands::delete_package::run(&ctx, &package, version.as_deref()).await
        }

        Commands::Render {
            file,
            variables,
            variables_files,
            shards,
            expression,
            output,
        } => {
            let options = RenderOptions {
                variables,
                variables_files,
                shards,
                expression,
                format: output,
            };
            commands::render::run(&ctx, &file, &options)
        }

        Commands::Version => commands::version::run(&ctx).await,

        Commands::Exec {
            kind,
            name,
            container,
            command,
        } => commands::exec::run(&ctx, &kind, &name, container.as_deref(), &command).await,
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_flags() {
        let cli = Cli::try_parse_from([
            "kpm",
            "deploy",
            "acme/web",
            "--channel",
            "stable",
            "-x",
            "replicas=3",
            "--shards",
            "2",
            "--namespace",
            "prod",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.namespace.as_deref(), Some("prod"));
        match cli.command {
            Commands::Deploy { args, dry_run, .. } => {
                assert!(dry_run);
                assert_eq!(args.package.channel.as_deref(), Some("stable"));
                assert_eq!(args.variables, vec!["replicas=3"]);
                assert_eq!(args.shards.as_deref(), Some("2"));
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_package_or_local_required() {
        assert!(Cli::try_parse_from(["kpm", "generate"]).is_err());
        assert!(Cli::try_parse_from(["kpm", "generate", "acme/web", "--local", "."]).is_err());
        assert!(Cli::try_parse_from(["kpm", "generate", "--local", "."]).is_ok());
    }

    #[test]
    fn test_exec_takes_trailing_command() {
        let cli = Cli::try_parse_from(["kpm", "exec", "-n", "web", "ls", "-la", "/"]).unwrap();
        match cli.command {
            Commands::Exec { command, kind, .. } => {
                assert_eq!(kind, "deployment");
                assert_eq!(command, vec!["ls", "-la", "/"]);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_exec_kind_help_names_rc() {
        let cmd = Cli::command();
        let exec = cmd.find_subcommand("exec").unwrap();
        let kind = exec.get_arguments().find(|a| a.get_id() == "kind").unwrap();
        let help = kind.get_help().unwrap().to_string();
        assert!(help.contains("--kind rc"), "{}", help);
        let defaults: Vec<_> = kind
            .get_default_values()
            .iter()
            .map(|v| v.to_string_lossy().to_string())
            .collect();
        assert_eq!(defaults, vec!["deployment"]);
    }
}
