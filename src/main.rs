use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use favicon_resolver::fetch::CancelToken;
use favicon_resolver::{output, page, Resolver, ResolverConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "favicon-resolver", version, about = "Find the best icon for a website")]
struct Cli {
    #[command(flatten)]
    fetch: FetchArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct FetchArgs {
    /// User agent sent with every request
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Retries after a failed icon fetch
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Delay between retries in milliseconds
    #[arg(long, global = true)]
    retry_delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the icon of one site and print the result as JSON
    Resolve {
        /// Site URL; `https://` is assumed when no scheme is given
        url: String,

        /// Also write icon-<size>.png files into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Serve the JSON API
    #[cfg(feature = "server")]
    Serve {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0:3000")]
        addr: String,

        /// Worker threads (defaults to the number of CPUs)
        #[arg(long)]
        workers: Option<usize>,
    },
}

impl FetchArgs {
    fn apply(&self, mut config: ResolverConfig) -> ResolverConfig {
        if let Some(ua) = &self.user_agent {
            config.user_agent = ua.clone();
        }
        if let Some(t) = self.timeout_ms {
            config.timeout_ms = t;
        }
        if let Some(r) = self.retries {
            config.max_retries = r;
        }
        if let Some(d) = self.retry_delay_ms {
            config.retry_delay_ms = d;
        }
        config
    }
}

fn resolve(resolver: &Resolver, url: &str, out_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let target = page::normalize_target(url)?;
    let cancel = CancelToken::new();
    let page = resolver.load_page(&target, &cancel)?;
    let meta = page::extract_metadata(&page);
    let icon = resolver.resolve_with_cancel(&page, &cancel);
    let sizes = &resolver.config().output_sizes;

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        for &size in sizes.iter().filter(|&&s| s > 0) {
            let png = output::encode_png(&icon.bitmap, size)?;
            let path = dir.join(format!("icon-{}.png", size));
            std::fs::write(&path, png).with_context(|| format!("writing {}", path.display()))?;
        }
    }

    let report = serde_json::json!({
        "title": meta.title,
        "description": meta.description,
        "url": target.as_str(),
        "faviconUrl": icon.source.to_string(),
        "favicons": output::render_sizes(&icon.bitmap, sizes),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.fetch.apply(ResolverConfig::from_env());
    let resolver = Resolver::new(config).context("building resolver")?;

    match cli.command {
        Command::Resolve { url, out_dir } => resolve(&resolver, &url, out_dir),
        #[cfg(feature = "server")]
        Command::Serve { addr, workers } => {
            use favicon_resolver::server::{IconServer, ServerConfig};
            let defaults = ServerConfig::default();
            let config = ServerConfig {
                addr,
                workers: workers.unwrap_or(defaults.workers),
                ..defaults
            };
            IconServer::bind(resolver, config)?.run()?;
            Ok(())
        }
    }
}
