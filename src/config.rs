use crate::{
    amounts::{
        DEFAULT_TOKEN_DECIMALS,
        parse_address,
    },
    deployment::{
        DeploymentEnv,
        DeploymentRecord,
    },
    port::{
        Contracts,
        DEFAULT_READ_DEADLINE,
        DEFAULT_TRANSACTION_DEADLINE,
        Deadlines,
    },
};
use alloy_primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LOG_DIR: &str = "~/.lottery-client/logs";
pub const DEFAULT_TOKEN_TICKER: &str = "TOKEN";
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// `10^78` no longer fits in a U256.
const MAX_TOKEN_DECIMALS: u8 = 77;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Testnet { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Testnet { url } | NetworkTarget::LocalNode { url } => url,
        }
    }

    pub fn deployment_env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Testnet { .. } => DeploymentEnv::Test,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub token: Option<Address>,
    pub lottery: Option<Address>,
    pub token_decimals: Option<u8>,
    pub token_ticker: Option<String>,
    pub save_deployment: bool,
    pub read_timeout: Duration,
    pub tx_timeout: Duration,
    pub poll_interval: Duration,
    pub log_dir: PathBuf,
}

impl AppConfig {
    pub fn deadlines(&self) -> Deadlines {
        Deadlines {
            read: self.read_timeout,
            transaction: self.tx_timeout,
            receipt_poll: RECEIPT_POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    Run(AppConfig),
}

/// Contract pair plus display settings, after merging flags with the saved record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedContracts {
    pub contracts: Contracts,
    pub ticker: String,
}

pub fn usage() -> String {
    format!(
        "Usage: lottery-client [--testnet | --local] [--rpc-url <url>]\n\
         [--token <address>] [--lottery <address>] [--decimals <n>] [--ticker <symbol>]\n\
         [--save-deployment] [--timeout-secs <n>] [--tx-timeout-secs <n>]\n\
         [--poll-secs <n>] [--log-dir <path>]\n\
         \n\
         Flags:\n\
           --testnet              Connect to the public testnet (default RPC {})\n\
           --local                Connect to a local node (default RPC {})\n\
           --rpc-url <url>        Override the wallet provider URL for the selected network\n\
           --token <address>      Token contract address (defaults to the saved deployment)\n\
           --lottery <address>    Lottery contract address (defaults to the saved deployment)\n\
           --decimals <n>         Token decimals (default {})\n\
           --ticker <symbol>      Token ticker shown next to amounts\n\
           --save-deployment      Record the contract pair under .deployments/<network>\n\
           --timeout-secs <n>     Deadline for reads (default {}s)\n\
           --tx-timeout-secs <n>  Deadline for transactions (default {}s)\n\
           --poll-secs <n>        Refresh interval (default {}s)\n\
           --log-dir <path>       Where log files go (default {})",
        DEFAULT_TESTNET_RPC_URL,
        DEFAULT_LOCAL_RPC_URL,
        DEFAULT_TOKEN_DECIMALS,
        DEFAULT_READ_DEADLINE.as_secs(),
        DEFAULT_TRANSACTION_DEADLINE.as_secs(),
        DEFAULT_POLL_INTERVAL.as_secs(),
        DEFAULT_LOG_DIR,
    )
}

/// Parses the arguments after the program name.
pub fn parse_cli_args(args: impl IntoIterator<Item = String>) -> Result<CliCommand> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Testnet,
        Local,
    }

    let mut args = args.into_iter();
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut token: Option<Address> = None;
    let mut lottery: Option<Address> = None;
    let mut token_decimals: Option<u8> = None;
    let mut token_ticker: Option<String> = None;
    let mut save_deployment = false;
    let mut read_timeout: Option<Duration> = None;
    let mut tx_timeout: Option<Duration> = None;
    let mut poll_interval: Option<Duration> = None;
    let mut log_dir: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--testnet" | "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --testnet/--local"
                    ));
                }
                network_flag = Some(if arg == "--testnet" {
                    NetworkFlag::Testnet
                } else {
                    NetworkFlag::Local
                });
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                set_once(&mut custom_url, url, "--rpc-url")?;
            }
            "--token" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--token requires an address argument"))?;
                let address = parse_address(&raw).wrap_err("invalid --token address")?;
                set_once(&mut token, address, "--token")?;
            }
            "--lottery" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--lottery requires an address argument"))?;
                let address = parse_address(&raw).wrap_err("invalid --lottery address")?;
                set_once(&mut lottery, address, "--lottery")?;
            }
            "--decimals" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--decimals requires a number"))?;
                let decimals = raw
                    .parse::<u8>()
                    .ok()
                    .filter(|decimals| *decimals <= MAX_TOKEN_DECIMALS)
                    .ok_or_else(|| {
                        eyre!("--decimals must be between 0 and {MAX_TOKEN_DECIMALS}, got {raw}")
                    })?;
                set_once(&mut token_decimals, decimals, "--decimals")?;
            }
            "--ticker" => {
                let ticker = args
                    .next()
                    .ok_or_else(|| eyre!("--ticker requires a symbol"))?;
                set_once(&mut token_ticker, ticker, "--ticker")?;
            }
            "--save-deployment" => save_deployment = true,
            "--timeout-secs" => {
                let secs = parse_secs(args.next(), "--timeout-secs")?;
                set_once(&mut read_timeout, secs, "--timeout-secs")?;
            }
            "--tx-timeout-secs" => {
                let secs = parse_secs(args.next(), "--tx-timeout-secs")?;
                set_once(&mut tx_timeout, secs, "--tx-timeout-secs")?;
            }
            "--poll-secs" => {
                let secs = parse_secs(args.next(), "--poll-secs")?;
                set_once(&mut poll_interval, secs, "--poll-secs")?;
            }
            "--log-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                set_once(&mut log_dir, dir, "--log-dir")?;
            }
            "--help" | "-h" => return Ok(CliCommand::Help),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match network_flag {
        None => return Err(eyre!("Select a network with --testnet or --local")),
        Some(NetworkFlag::Testnet) => NetworkTarget::Testnet {
            url: custom_url.unwrap_or_else(|| DEFAULT_TESTNET_RPC_URL.to_string()),
        },
        Some(NetworkFlag::Local) => NetworkTarget::LocalNode {
            url: custom_url.unwrap_or_else(|| DEFAULT_LOCAL_RPC_URL.to_string()),
        },
    };
    let log_dir = shellexpand::tilde(log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR));

    Ok(CliCommand::Run(AppConfig {
        network,
        token,
        lottery,
        token_decimals,
        token_ticker,
        save_deployment,
        read_timeout: read_timeout.unwrap_or(DEFAULT_READ_DEADLINE),
        tx_timeout: tx_timeout.unwrap_or(DEFAULT_TRANSACTION_DEADLINE),
        poll_interval: poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        log_dir: PathBuf::from(log_dir.into_owned()),
    }))
}

/// Flags win over the saved deployment record. Both addresses must come from somewhere.
pub fn resolve_contracts(
    config: &AppConfig,
    saved: Option<&DeploymentRecord>,
) -> Result<ResolvedContracts> {
    let token = match config.token {
        Some(token) => token,
        None => saved_address(saved.map(|record| record.token_address.as_str()), "token")?
            .ok_or_else(|| {
                eyre!("No token address: pass --token or save a deployment for this network")
            })?,
    };
    let lottery = match config.lottery {
        Some(lottery) => lottery,
        None => saved_address(saved.map(|record| record.lottery_address.as_str()), "lottery")?
            .ok_or_else(|| {
                eyre!("No lottery address: pass --lottery or save a deployment for this network")
            })?,
    };
    let token_decimals = match (config.token_decimals, saved) {
        (Some(decimals), _) => decimals,
        (None, Some(record)) if record.token_decimals > MAX_TOKEN_DECIMALS => {
            return Err(eyre!(
                "saved token decimals {} exceed the maximum of {MAX_TOKEN_DECIMALS}",
                record.token_decimals
            ));
        }
        (None, Some(record)) => record.token_decimals,
        (None, None) => DEFAULT_TOKEN_DECIMALS,
    };
    let ticker = config
        .token_ticker
        .clone()
        .or_else(|| saved.and_then(|record| record.token_ticker.clone()))
        .unwrap_or_else(|| DEFAULT_TOKEN_TICKER.to_string());
    Ok(ResolvedContracts {
        contracts: Contracts {
            token,
            lottery,
            token_decimals,
        },
        ticker,
    })
}

fn saved_address(raw: Option<&str>, name: &str) -> Result<Option<Address>> {
    raw.map(|raw| {
        parse_address(raw).wrap_err_with(|| format!("saved {name} address is invalid"))
    })
    .transpose()
}

fn set_once<T>(slot: &mut Option<T>, value: T, flag: &str) -> Result<()> {
    if slot.is_some() {
        return Err(eyre!("{flag} may only be specified once"));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_secs(raw: Option<String>, flag: &str) -> Result<Duration> {
    let raw = raw.ok_or_else(|| eyre!("{flag} requires a number of seconds"))?;
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(eyre!("{flag} must be a positive number of seconds, got {raw}")),
    }
}
