use crate::{
    chain::{
        CityContract,
        WalletConnector,
        failure_reason,
    },
    city::{
        CityRecord,
        GamePhase,
        Structure,
        truncate_address,
    },
    deployment::DeploymentEnv,
    ui,
    wallets::WalletDescriptor,
};
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{
    error,
    info,
    warn,
};

pub const DEFAULT_SEPOLIA_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkTarget {
    Sepolia { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Sepolia { url } | NetworkTarget::LocalNode { url } => url,
        }
    }

    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Sepolia { .. } => DeploymentEnv::Sepolia,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub env: DeploymentEnv,
    pub rpc_url: String,
    pub contract_address: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppSnapshot {
    pub network: String,
    pub rpc_url: String,
    pub contract_address: String,
    pub wallet_location: String,
    pub player: Option<String>,
    pub player_short: Option<String>,
    pub chain_id: Option<u64>,
    pub city: Option<CityRecord>,
    pub status: String,
    pub alert: Option<String>,
}

impl AppSnapshot {
    pub fn is_connected(&self) -> bool {
        self.player.is_some()
    }

    pub fn phase(&self) -> Option<GamePhase> {
        self.city.as_ref().map(CityRecord::phase)
    }

    pub fn can_build(&self) -> bool {
        self.phase().is_some_and(GamePhase::allows_building)
    }

    pub fn is_game_over(&self) -> bool {
        self.phase() == Some(GamePhase::Completed)
    }
}

pub struct AppController<W: WalletConnector> {
    connector: W,
    session: SessionInfo,
    contract: Option<W::Contract>,
    player: Option<Address>,
    city: Option<CityRecord>,
    chain_id: Option<u64>,
    status: String,
    alert: Option<String>,
    updates: Option<mpsc::UnboundedSender<AppSnapshot>>,
}

impl<W: WalletConnector> AppController<W> {
    pub fn new(connector: W, session: SessionInfo) -> Self {
        Self {
            connector,
            session,
            contract: None,
            player: None,
            city: None,
            chain_id: None,
            status: String::new(),
            alert: None,
            updates: None,
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<AppSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.updates = Some(tx);
        rx
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn city(&self) -> Option<&CityRecord> {
        self.city.as_ref()
    }

    pub fn player(&self) -> Option<Address> {
        self.player
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.contract.is_some()
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        info!(status = %self.status, "status");
        if let Some(tx) = &self.updates {
            let _ = tx.send(self.build_snapshot());
        }
    }

    fn raise_alert(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "alert");
        self.alert = Some(message);
    }

    pub fn locate_wallet(&mut self) -> Option<WalletDescriptor> {
        match self.connector.locate_wallet() {
            Ok(Some(wallet)) => Some(wallet),
            Ok(None) => {
                let message = format!(
                    "No wallet found in {}. Create an encrypted keystore there first.",
                    self.connector.wallet_location()
                );
                self.raise_alert(message);
                None
            }
            Err(e) => {
                self.raise_alert(e.to_string());
                None
            }
        }
    }

    pub async fn connect(&mut self, password: String) {
        let Some(wallet) = self.locate_wallet() else {
            return;
        };
        self.set_status("Connecting to wallet...");
        let contract = match self.connector.connect(&wallet, password).await {
            Ok(contract) => contract,
            Err(e) => {
                error!(error = ?e, "Error connecting wallet");
                self.set_status("Connection failed.");
                return;
            }
        };
        let player = contract.player();
        let chain_id = match contract.chain_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = ?e, "could not read chain id");
                None
            }
        };
        self.player = Some(player);
        self.contract = Some(contract);
        self.chain_id = chain_id;
        info!(%player, wallet = %wallet.name, ?chain_id, "wallet connected");

        let env = self.session.env;
        let expected = env.expected_chain_id();
        let status = match chain_id {
            Some(actual) if actual != expected => format!(
                "Wallet Connected, but the RPC reports chain {actual}; the {env} network is chain {expected}."
            ),
            _ => format!("Wallet Connected. Please ensure you are on the {env} Network."),
        };
        self.set_status(status);
    }

    pub async fn fetch_city(&mut self) {
        if self.contract.is_none() || self.player.is_none() {
            return;
        }
        self.set_status("Fetching city data...");
        let result = match (self.contract.as_ref(), self.player) {
            (Some(contract), Some(player)) => contract.city(player).await,
            _ => return,
        };
        match result {
            Ok(record) if record.phase() == GamePhase::NotStarted => {
                self.city = None;
                self.set_status(
                    "Game not started for this account. Press 's' to start a new game.",
                );
            }
            Ok(record) => {
                info!(?record, "city fetched");
                self.city = Some(record);
                self.set_status("Data fetched!");
            }
            Err(e) => {
                error!(error = ?e, "Could not fetch city data");
                let env = self.session.env;
                self.set_status(format!(
                    "Failed to fetch data. Are you on the {env} network?"
                ));
            }
        }
    }

    pub async fn start_game(&mut self) {
        if self.contract.is_none() {
            return;
        }
        self.set_status("Sending startGame transaction...");
        let result = match self.contract.as_ref() {
            Some(contract) => contract.start_game().await,
            None => return,
        };
        match result {
            Ok(tx) => {
                info!(tx_hash = %tx.tx_hash, "game started");
                self.set_status("Game Started! Fetching new data...");
                self.fetch_city().await;
            }
            Err(e) => {
                error!(error = ?e, "Could not start game");
                self.set_status(format!("Start game failed: {}", reason_or_hint(&e)));
            }
        }
    }

    pub async fn build(&mut self, structure: Structure) {
        if self.contract.is_none() {
            return;
        }
        self.set_status(format!("Building {structure}..."));
        let result = match self.contract.as_ref() {
            Some(contract) => contract.build_structure(structure).await,
            None => return,
        };
        match result {
            Ok(tx) => {
                info!(tx_hash = %tx.tx_hash, %structure, "structure built");
                self.set_status(format!("{structure} built! Fetching new data..."));
                self.fetch_city().await;
            }
            Err(e) => {
                error!(error = ?e, %structure, "Could not build");
                self.set_status(format!("Build failed: {}", reason_or_hint(&e)));
            }
        }
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let player = self.player.map(|p| p.to_checksum(None));
        AppSnapshot {
            network: self.session.env.to_string(),
            rpc_url: self.session.rpc_url.clone(),
            contract_address: self.session.contract_address.to_checksum(None),
            wallet_location: self.connector.wallet_location(),
            player_short: player.as_deref().map(truncate_address),
            player,
            chain_id: self.chain_id,
            city: self.city,
            status: self.status.clone(),
            alert: self.alert.clone(),
        }
    }
}

fn reason_or_hint(err: &color_eyre::eyre::Report) -> String {
    failure_reason(err).unwrap_or_else(|| String::from("see log"))
}

pub async fn run_app<W: WalletConnector>(
    mut controller: AppController<W>,
    password: Option<String>,
) -> Result<()> {
    if let Some(password) = password {
        controller.connect(password).await;
        if let Some(alert) = controller.alert() {
            return Err(eyre!(alert.to_string()));
        }
    }
    let updates = controller.subscribe();
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    tracing::info!("UI ready");
    let res = run_loop(controller, updates, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn drive<F>(
    op: F,
    updates: &mut mpsc::UnboundedReceiver<AppSnapshot>,
    ui_state: &mut ui::UiState,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(op);
    loop {
        tokio::select! {
            _ = &mut op => break,
            Some(snapshot) = updates.recv() => {
                ui::draw(ui_state, &snapshot)
                    .wrap_err("draw while waiting on the chain failed")?;
            }
        }
    }
    while let Ok(snapshot) = updates.try_recv() {
        ui::draw(ui_state, &snapshot).wrap_err("draw after chain call failed")?;
    }
    Ok(())
}

async fn run_loop<W: WalletConnector>(
    mut controller: AppController<W>,
    mut updates: mpsc::UnboundedReceiver<AppSnapshot>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    ui::draw(ui_state, &controller.build_snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::DismissAlert => controller.dismiss_alert(),
                    ui::UserEvent::Connect => {
                        if let Some(wallet) = controller.locate_wallet() {
                            ui_state.prompt_password(&wallet.name);
                        }
                    }
                    ui::UserEvent::SubmitPassword(password) => {
                        drive(controller.connect(password), &mut updates, ui_state).await?;
                    }
                    ui::UserEvent::Refresh => {
                        drive(controller.fetch_city(), &mut updates, ui_state).await?;
                    }
                    ui::UserEvent::StartGame => {
                        drive(controller.start_game(), &mut updates, ui_state).await?;
                    }
                    ui::UserEvent::Build(structure) => {
                        drive(controller.build(structure), &mut updates, ui_state).await?;
                    }
                }
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw after input failed")?;
            }
        }
    }
    Ok(())
}
