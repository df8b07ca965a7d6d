use std::path::PathBuf;
use std::str::FromStr;

use color_eyre::eyre::WrapErr;
use log::info;
use structopt::StructOpt;

use crate::config::Config;
use crate::provider::api::DynDnsProvider;
use crate::provider::freedns::FreeDns;
use crate::public_ip::api::PublicIpSource;
use crate::records::RecordStore;

mod config;
mod error;
mod provider;
mod public_ip;
mod records;
mod status;
#[cfg(test)]
mod testing;
mod update;

const RUST_BACKTRACE: &str = "RUST_BACKTRACE";

#[derive(StructOpt, Debug)]
pub(crate) struct FreeDnsDynDns {
    /// What to do: `update` the provider, or show the recorded `status`
    #[structopt(default_value = "update", possible_values = &["update", "status"])]
    pub task: Task,
    /// Only update this subdomain, which must be one of the configured ones
    #[structopt(short, long)]
    pub domain: Option<String>,
    /// Configuration file
    #[structopt(short, long, parse(from_os_str), default_value = "./secrets.yml")]
    pub config: PathBuf,
    /// Verbosity of output, 1 occurrence for debug, 2 occurrences for trace
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    Update,
    Status,
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(Task::Update),
            "status" => Ok(Task::Status),
            _ => Err(format!("Unknown task {}", s)),
        }
    }
}

fn main() -> color_eyre::Result<()> {
    if std::env::var_os(RUST_BACKTRACE).is_none() {
        std::env::set_var(RUST_BACKTRACE, "1");
    }

    let args: FreeDnsDynDns = FreeDnsDynDns::from_args();

    color_eyre::install()?;
    stderrlog::new()
        .verbosity(args.verbose + 2)
        .init()
        .wrap_err("Failed to initialize logging")?;

    let config = Config::load(&args.config)?;
    config
        .validate_filter(args.domain.as_deref())
        .wrap_err("Invalid --domain")?;

    match args.task {
        Task::Update => update(&config, args.domain.as_deref()),
        Task::Status => status(&config),
    }
}

fn update(config: &Config, domain: Option<&str>) -> color_eyre::Result<()> {
    let ip_source: Box<dyn PublicIpSource> = config.public_ip.clone().into();
    info!("Looking up public IP address with {}", ip_source.describe());
    let public_ip = ip_source
        .public_ip()
        .wrap_err("Failed to resolve IP address")?;
    info!("Your public IP address is {}", public_ip);

    let mut provider = FreeDns::new(&config.base_url, &config.username, &config.password);
    info!("Checking DNS entries with {}", provider.describe());

    let subdomains = config.selected(domain);
    RecordStore::scoped(&config.records_file, &config.subdomains, |store| {
        update::run(&public_ip, &subdomains, &mut provider, store)
    })
    .wrap_err("Failed to update DNS entries")?;

    Ok(())
}

fn status(config: &Config) -> color_eyre::Result<()> {
    let store = RecordStore::load(&config.records_file, &config.subdomains)
        .wrap_err("Failed to read records")?;
    print!("{}", status::render(&store));
    Ok(())
}
