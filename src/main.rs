use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use static_site_stack::deploy::{self, DEFAULT_POLL_INTERVAL};
use static_site_stack::lookup::{resolve_hosted_zone, ContextStore};
use static_site_stack::{render_plan, synthesize, Result, StackConfig, SynthesizedStack, TemplateFormat};

#[derive(Parser)]
#[command(name = "static-site-stack", version, about = "Synthesize and deploy a CloudFront fronted static website stack")]
struct Cli {
    /// TOML file overriding the default stack settings
    #[arg(long, global = true, env = "STATIC_SITE_CONFIG")]
    config: Option<PathBuf>,

    /// cached lookup results
    #[arg(long, global = true, default_value = "stack.context.json")]
    context: PathBuf,

    /// only use lookups already in the context file
    #[arg(long, global = true)]
    no_lookups: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// print or write the CloudFormation template
    Synth {
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = TemplateFormat::Json)]
        format: TemplateFormat,
    },
    /// show the order resources will be created in
    Plan,
    /// create or update the stack and wait for it to finish
    Deploy,
    /// delete the stack, including every object in the bucket
    Destroy,
}

async fn synthesize_from_cli(cli: &Cli, config: &StackConfig) -> Result<SynthesizedStack> {
    let mut store = ContextStore::load(&cli.context)?;
    let client = if cli.no_lookups {
        None
    } else {
        Some(aws_sdk_route53::Client::new(&deploy::sdk_config(&config.region).await))
    };
    let zone = resolve_hosted_zone(&config.domain_name, &mut store, client.as_ref()).await?;
    synthesize(config, &zone)
}

async fn run(cli: Cli) -> Result<()> {
    let config = StackConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Synth { out, format } => {
            let stack = synthesize_from_cli(&cli, &config).await?;
            let rendered = stack.render(*format)?;
            match out {
                Some(path) => {
                    std::fs::write(path, rendered)?;
                    info!(path = %path.display(), "wrote template");
                }
                None => println!("{rendered}"),
            }
        }
        Command::Plan => {
            let stack = synthesize_from_cli(&cli, &config).await?;
            print!("{}", render_plan(&stack)?);
        }
        Command::Deploy => {
            let stack = synthesize_from_cli(&cli, &config).await?;
            let client = aws_sdk_cloudformation::Client::new(&deploy::sdk_config(&config.region).await);
            let outputs = deploy::deploy_stack(&client, &stack, DEFAULT_POLL_INTERVAL).await?;
            for (key, val) in outputs {
                println!("{key} = {val}");
            }
        }
        Command::Destroy => {
            let client = aws_sdk_cloudformation::Client::new(&deploy::sdk_config(&config.region).await);
            deploy::delete_stack(&client, &config.stack_name, DEFAULT_POLL_INTERVAL).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout is reserved for templates and outputs
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
