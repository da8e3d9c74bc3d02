use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{builder::FalseyValueParser, ArgAction, Parser, ValueEnum};
use listcrawl::{
    runner::{Runner, RunnerOptions},
    site::profile_for,
    uploader::Destination,
    utils::SystemClock,
};
use log::{debug, error};
use reqwest::Url;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Site {
    Niceday,
    YahooMovies,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Listing crawler and batched record relay", long_about = None)]
struct Args {
    /// Listing site to crawl
    #[arg(short = 's', long, value_enum, default_value_t = Site::Niceday)]
    site: Site,
    /// Highest price included in the category searches
    #[arg(short = 'p', long, env = "PRICE_CEILING")]
    price_ceiling: Option<u32>,
    /// GraphQL endpoint receiving insertProducts mutations
    #[arg(long, env = "GRAPHQL_API_URL")]
    graphql_url: Option<String>,
    /// Airtable table receiving one row per record, e.g. https://api.airtable.com/v0/<base>/<table>
    #[arg(long, env = "AIRTABLE_API_URL")]
    airtable_url: Option<String>,
    /// Airtable api key, enables the Airtable destination together with --airtable-url
    #[arg(long, env = "AIRTABLE_KEY", hide_env_values = true)]
    airtable_key: Option<String>,
    /// Write all records of a successful run to this JSON file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Records per upload request (at most 100)
    #[arg(short = 'c', long, default_value_t = 100)]
    chunk_size: usize,
    /// Upload requests in flight at once
    #[arg(long, default_value_t = 10)]
    upload_concurrency: usize,
    /// Number of retries per failed page
    #[arg(short = 'r', long, default_value_t = 0)]
    retries: u32,
    /// Maximum time in seconds the browser waits for a navigation
    #[arg(long, default_value_t = 45)]
    browser_timeout: u64,
    /// Maximum time in seconds spent scrolling one page
    #[arg(long, default_value_t = 60)]
    scroll_timeout: u64,
    /// Minimum time in seconds to wait after a tab navigates to a page
    #[arg(long, default_value_t = 0)]
    min_wait_after_navigation: u64,
    /// Maximum time in seconds to wait after a tab navigates to a page
    #[arg(long, default_value_t = 0)]
    max_wait_after_navigation: u64,
    /// Accept invalid TLS certificates from the upload endpoint
    #[arg(long, env = "INSECURE_TLS", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    insecure_tls: bool,
    /// Verbose logging, including every mutation sent
    #[arg(short = 'd', long, env = "DEBUG", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    debug: bool,
}

impl Args {
    fn destination(&self) -> anyhow::Result<Option<Destination>> {
        match (&self.graphql_url, &self.airtable_key) {
            (Some(_), Some(_)) => Err(anyhow!(
                "choose either a GraphQL endpoint or an Airtable key, not both"
            )),
            (Some(url), None) => {
                let url = Url::parse(url).context(format!("invalid graphql url {}", url))?;
                Ok(Some(Destination::GraphQl(url)))
            }
            (None, Some(key)) => {
                let table = self
                    .airtable_url
                    .as_ref()
                    .ok_or_else(|| anyhow!("an Airtable key needs --airtable-url"))?;
                let url = Url::parse_with_params(table, &[("api_key", key)])
                    .context(format!("invalid airtable url {}", table))?;
                Ok(Some(Destination::Airtable(url)))
            }
            (None, None) => Ok(None),
        }
    }

    fn runner_options(&self) -> anyhow::Result<RunnerOptions> {
        let name = self
            .site
            .to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default();
        let profile = profile_for(&name).ok_or_else(|| anyhow!("unknown site {}", name))?;

        Ok(RunnerOptions::default_builder()
            .profile(profile)
            .price_ceiling(self.price_ceiling)
            .destination(self.destination()?)
            .output(self.output.clone())
            .chunk_size(self.chunk_size)
            .upload_concurrency(self.upload_concurrency)
            .page_retries(self.retries)
            .timeout(self.browser_timeout)
            .scroll_timeout(self.scroll_timeout)
            .min_wait_after_navigation(self.min_wait_after_navigation)
            .max_wait_after_navigation(self.max_wait_after_navigation)
            .insecure_tls(self.insecure_tls)
            .debug(self.debug)
            .build()?)
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runner = match args
        .runner_options()
        .and_then(|options| {
            debug!("Starting crawl of {}", options.profile().name);
            Runner::new(options)
        }) {
        Ok(r) => r,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    };

    match runner.run(&SystemClock).await {
        Ok(summary) => std::process::exit(summary.exit_code()),
        Err(e) => {
            error!("🚫 Something went wrong when scraping: {:#}", e);
            std::process::exit(1);
        }
    }
}
