use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ctrip_spider::{
    logging,
    proxy::{ProxyParser, ProxyType},
    Config, Headers, RequestOptimizer, RequestOptions, RotationMode,
};
use reqwest::Method;
use std::path::{Path, PathBuf};
use tracing::info;

/// Request optimizer for travel-site scraping
#[derive(Parser)]
#[command(name = "ctrip-spider")]
#[command(about = "Identity rotation, proxy pool health tracking and request pacing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. debug), overrides both RUST_LOG and the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for rolling log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every proxy and report which ones are usable
    Check {
        /// Input file containing proxies, merged with configured ones
        input: Option<PathBuf>,
        /// Output file for good proxies
        #[arg(short, long)]
        good: Option<PathBuf>,
        /// Output file for bad proxies
        #[arg(short, long)]
        bad: Option<PathBuf>,
        /// Default scheme for lines without one (http, https, socks4, socks5, socks5h)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
        /// URL to probe proxies against
        #[arg(long)]
        test_url: Option<String>,
    },
    /// Send one request through the optimizer
    Fetch {
        url: String,
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(short, long)]
        json: Option<String>,
        /// Extra header as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Route through the configured proxies
        #[arg(long)]
        use_proxy: bool,
    },
    /// Print rotated identities and their usage
    Agents {
        /// Number of identities to draw
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
        /// Selection mode (random, round_robin)
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Normalize a proxy list file into pool addresses
    Parse {
        input: PathBuf,
        /// Output file for normalized addresses
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging = config.logging.with_level_override(level);
    }
    if let Some(dir) = cli.log_dir {
        config.logging.directory = Some(dir);
    }
    let _guard = logging::init(&config.logging)?;

    match cli.command {
        Commands::Check {
            input,
            good,
            bad,
            proxy_type,
            test_url,
        } => {
            let ptype = parse_proxy_type(&proxy_type)?;
            let proxies = collect_proxies(&config, input.as_deref(), ptype)?;
            if proxies.is_empty() {
                return Err(anyhow!("No proxies to check"));
            }

            println!("Checking {} proxies", proxies.len());
            let optimizer = RequestOptimizer::new(
                config.optimizer.clone().with_proxy(true),
                config.user_agents.clone(),
                proxies,
            )?;
            let results = optimizer.check_proxies(test_url.as_deref()).await;

            let (good_results, bad_results): (Vec<_>, Vec<_>) =
                results.into_iter().partition(|r| r.is_working());
            println!(
                "Results: {} good, {} bad",
                good_results.len(),
                bad_results.len()
            );

            if let Some(good_path) = good {
                let addresses: Vec<_> = good_results.iter().map(|r| r.address.clone()).collect();
                ProxyParser::save_to_file(&addresses, &good_path)?;
                println!("Saved {} good proxies to {:?}", addresses.len(), good_path);
            }
            if let Some(bad_path) = bad {
                let addresses: Vec<_> = bad_results.iter().map(|r| r.address.clone()).collect();
                ProxyParser::save_to_file(&addresses, &bad_path)?;
                println!("Saved {} bad proxies to {:?}", addresses.len(), bad_path);
            }

            if !good_results.is_empty() {
                println!("\nWorking proxies:");
                for result in &good_results {
                    if let Some(time) = result.response_time_ms {
                        println!("  {} ({}ms)", result.address, time);
                    }
                }
            }

            let stats = optimizer.stats().await;
            println!("\n{}", serde_json::to_string_pretty(&stats.proxies)?);
        }
        Commands::Fetch {
            url,
            method,
            json,
            headers,
            use_proxy,
        } => {
            let method: Method = method
                .to_uppercase()
                .parse()
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            let base_headers = parse_headers(&headers)?;
            let mut options = RequestOptions::new().with_timeout(config.optimizer.request_timeout());
            if let Some(body) = json {
                options = options.with_json(serde_json::from_str(&body).context("Invalid JSON body")?);
            }

            let proxies = collect_proxies(&config, None, ProxyType::Http)?;
            let optimizer_config = config.optimizer.clone().with_proxy(use_proxy || config.optimizer.use_proxy);
            let optimizer =
                RequestOptimizer::new(optimizer_config, config.user_agents.clone(), proxies)?;

            info!(%method, %url, "Fetching");
            let response = optimizer
                .dispatch_with_retries(method, &url, &base_headers, options)
                .await
                .ok_or_else(|| anyhow!("Request to {} failed", url))?;

            println!("HTTP {}", response.status);
            println!("{}", response.body);
        }
        Commands::Agents { count, mode } => {
            let mut optimizer_config = config.optimizer.clone().with_delay(0.0, 0.0);
            if let Some(mode) = mode {
                optimizer_config = optimizer_config.with_rotation_mode(mode.parse::<RotationMode>()?);
            }
            let optimizer = RequestOptimizer::new(optimizer_config, config.user_agents.clone(), vec![])?;

            for i in 0..count {
                let headers = optimizer.headers(&Headers::new())?;
                if let Some(agent) = headers.get(ctrip_spider::IDENTITY_HEADER) {
                    println!("{}. {}", i + 1, agent);
                }
            }

            let stats = optimizer.stats().await;
            println!("\nIdentity pool: {} total", stats.identities.total);
        }
        Commands::Parse {
            input,
            output,
            proxy_type,
        } => {
            let ptype = parse_proxy_type(&proxy_type)?;
            let addresses = ProxyParser::parse_file(&input, ptype)?;

            println!("Parsed {} proxies from {:?}", addresses.len(), input);

            if let Some(output_path) = output {
                ProxyParser::save_to_file(&addresses, &output_path)?;
                println!("Saved parsed proxies to {:?}", output_path);
            } else {
                for address in &addresses {
                    println!("{}", address);
                }
            }
        }
    }

    Ok(())
}

/// Configured proxies, then `proxy_file`, then an explicit input file
fn collect_proxies(config: &Config, input: Option<&Path>, ptype: ProxyType) -> Result<Vec<String>> {
    let mut proxies = ProxyParser::parse_addresses(&config.proxies.join("\n"), ptype);
    for path in config.proxy_file.as_deref().into_iter().chain(input) {
        let loaded = ProxyParser::parse_file(path, ptype)
            .with_context(|| format!("Failed to read proxy file {:?}", path))?;
        for address in loaded {
            if !proxies.contains(&address) {
                proxies.push(address);
            }
        }
    }
    Ok(proxies)
}

fn parse_headers(raw: &[String]) -> Result<Headers> {
    raw.iter()
        .map(|h| {
            let (name, value) = h
                .split_once(':')
                .ok_or_else(|| anyhow!("Header must be NAME:VALUE, got: {}", h))?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_proxy_type(s: &str) -> Result<ProxyType> {
    ProxyType::from_scheme(s).ok_or_else(|| {
        anyhow!(
            "Invalid proxy type: {}. Use: http, https, socks4, socks5, socks5h",
            s
        )
    })
}
