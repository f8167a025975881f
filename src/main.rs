use alloy::primitives::Address;
use city_manager::{
    chain::KeystoreConnector,
    client::{
        self,
        AppController,
        NetworkTarget,
        SessionInfo,
    },
    deployment::{
        self,
        DeploymentRecord,
        DeploymentStore,
    },
    wallets,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use rpassword::prompt_password;
use std::{
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const DEFAULT_LOG_DIR: &str = ".logs";

#[derive(Clone, Debug)]
struct CliConfig {
    network: NetworkTarget,
    contract: Option<Address>,
    save_deployment: bool,
    wallet_name: Option<String>,
    wallet_dir: PathBuf,
    connect_now: bool,
    log_dir: PathBuf,
}

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: city-manager [--sepolia | --local] [--rpc-url <url>]\n\
         [--contract <address>] [--save-deployment]\n\
         [--wallet <name>] [--wallet-dir <path>] [--connect] [--log-dir <path>]\n\
         \n\
         Flags:\n\
           --sepolia           Connect to Sepolia (default, RPC {})\n\
           --local             Connect to a local node (default RPC {})\n\
           --rpc-url <url>     Override the RPC URL for the selected network\n\
           --contract <addr>   City Manager address (defaults to the recorded or built-in one)\n\
           --save-deployment   Remember --contract for the selected network\n\
           --wallet <name>     Keystore to connect with (needed when the directory holds several)\n\
           --wallet-dir <path> Override the keystore directory (defaults to ~/.foundry/keystores)\n\
           --connect           Ask for the wallet password before the UI starts\n\
           --log-dir <path>    Where log files go (defaults to {})",
        client::DEFAULT_SEPOLIA_RPC_URL,
        client::DEFAULT_LOCAL_RPC_URL,
        DEFAULT_LOG_DIR,
    );
    std::process::exit(0);
}

fn parse_cli_args(args: impl IntoIterator<Item = String>) -> Result<CliConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Sepolia,
        Local,
    }

    let mut args = args.into_iter();
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut contract: Option<Address> = None;
    let mut save_deployment = false;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut connect_now = false;
    let mut log_dir: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sepolia" | "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --sepolia/--local"
                    ));
                }
                network_flag = Some(if arg == "--sepolia" {
                    NetworkFlag::Sepolia
                } else {
                    NetworkFlag::Local
                });
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if custom_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                custom_url = Some(url);
            }
            "--contract" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                if contract.is_some() {
                    return Err(eyre!("--contract may only be specified once"));
                }
                let address = Address::from_str(&raw)
                    .map_err(|e| eyre!("Invalid contract address {raw:?}: {e}"))?;
                contract = Some(address);
            }
            "--save-deployment" => save_deployment = true,
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--connect" => connect_now = true,
            "--log-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                if log_dir.is_some() {
                    return Err(eyre!("--log-dir may only be specified once"));
                }
                log_dir = Some(dir);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    if save_deployment && contract.is_none() {
        return Err(eyre!("--save-deployment needs --contract <address>"));
    }

    let network = match network_flag.unwrap_or(NetworkFlag::Sepolia) {
        NetworkFlag::Sepolia => NetworkTarget::Sepolia {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_SEPOLIA_RPC_URL.to_string()),
        },
        NetworkFlag::Local => NetworkTarget::LocalNode {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string()),
        },
    };

    Ok(CliConfig {
        network,
        contract,
        save_deployment,
        wallet_name,
        wallet_dir: wallets::resolve_wallet_dir(wallet_dir.as_deref())?,
        connect_now,
        log_dir: PathBuf::from(log_dir.unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
    })
}

fn init_logging(dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = rolling::daily(dir, "city-manager.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to install log subscriber: {e}"))?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = parse_cli_args(std::env::args().skip(1))?;
    let _log_guard = init_logging(&config.log_dir)?;
    tracing::info!(?config, "starting city-manager client");

    let env = config.network.env();
    let store = DeploymentStore::new(env)?;
    if config.save_deployment
        && let Some(address) = config.contract
    {
        let record = DeploymentRecord::new(address, config.network.url(), None);
        store.save(&record)?;
        tracing::info!(%address, path = %store.path().display(), "deployment recorded");
    }
    let contract_address = deployment::resolve_contract_address(env, config.contract, &store)?;

    let connector = KeystoreConnector {
        rpc_url: config.network.url().to_string(),
        contract_address,
        wallet_dir: config.wallet_dir.clone(),
        wallet_name: config.wallet_name.clone(),
    };
    let session = SessionInfo {
        env,
        rpc_url: config.network.url().to_string(),
        contract_address,
    };
    let controller = AppController::new(connector, session);

    let password = if config.connect_now {
        Some(prompt_password("Wallet password: ").wrap_err("Failed to read wallet password")?)
    } else {
        None
    };
    client::run_app(controller, password).await
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_cli_args__defaults_to_sepolia() {
        let config = parse_cli_args(args(&["--wallet-dir", "/keys"])).unwrap();

        assert_eq!(
            config.network,
            NetworkTarget::Sepolia {
                url: client::DEFAULT_SEPOLIA_RPC_URL.to_string()
            }
        );
        assert_eq!(config.wallet_dir, PathBuf::from("/keys"));
        assert!(!config.connect_now);
        assert_eq!(config.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
    }

    #[test]
    fn parse_cli_args__local_with_custom_rpc_and_contract() {
        // given
        let raw = args(&[
            "--local",
            "--rpc-url",
            "http://127.0.0.1:9545",
            "--contract",
            "0x1ed5e4117958597D6Bd4c4426C37B4F1f0dEa267",
            "--save-deployment",
            "--wallet",
            "player",
            "--wallet-dir",
            "/keys",
        ]);

        // when
        let config = parse_cli_args(raw).unwrap();

        // then
        assert_eq!(
            config.network,
            NetworkTarget::LocalNode {
                url: "http://127.0.0.1:9545".to_string()
            }
        );
        assert!(config.contract.is_some());
        assert!(config.save_deployment);
        assert_eq!(config.wallet_name.as_deref(), Some("player"));
    }

    #[test]
    fn parse_cli_args__rejects_conflicting_networks() {
        let err = parse_cli_args(args(&["--sepolia", "--local"])).unwrap_err();
        assert!(err.to_string().contains("Multiple network flags"));
    }

    #[test]
    fn parse_cli_args__save_deployment_needs_contract() {
        let err =
            parse_cli_args(args(&["--save-deployment", "--wallet-dir", "/k"])).unwrap_err();
        assert!(err.to_string().contains("--contract"));
    }

    #[test]
    fn parse_cli_args__rejects_repeated_value_flags() {
        for flag in ["--rpc-url", "--wallet", "--wallet-dir", "--log-dir"] {
            let err = parse_cli_args(args(&[flag, "a", flag, "b"])).unwrap_err();
            assert!(
                err.to_string().contains("may only be specified once"),
                "{flag}: {err}"
            );
        }
    }

    #[test]
    fn parse_cli_args__rejects_bad_address_and_unknown_flags() {
        assert!(parse_cli_args(args(&["--contract", "0x12"])).is_err());
        assert!(parse_cli_args(args(&["--mainnet"])).is_err());
    }
}
