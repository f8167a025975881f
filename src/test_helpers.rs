use crate::{
    chain::{
        CallFailure,
        CityContract,
        TxSummary,
        WalletConnector,
        check_receipt,
    },
    city::{
        CityRecord,
        Structure,
    },
    client::{
        AppController,
        SessionInfo,
    },
    deployment::{
        DeploymentEnv,
        SEPOLIA_CHAIN_ID,
    },
    wallets::WalletDescriptor,
};
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        Mutex,
    },
};

pub const TEST_PASSWORD: &str = "correct horse";

#[derive(Clone, Debug)]
pub struct FakeChain {
    pub record: CityRecord,
    pub chain_id: u64,
    pub fail_reads: bool,
    // next write reverts with this reason
    pub revert_next_write: Option<String>,
    // next write fails without a reason
    pub drop_next_write: bool,
    // next write is mined with a failed receipt
    pub fail_next_receipt: bool,
    pub calls: Vec<String>,
    pub tx_count: u64,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            record: CityRecord::default(),
            chain_id: SEPOLIA_CHAIN_ID,
            fail_reads: false,
            revert_next_write: None,
            drop_next_write: false,
            fail_next_receipt: false,
            calls: Vec::new(),
            tx_count: 0,
        }
    }
}

impl FakeChain {
    fn write(&mut self, action: &'static str) -> Result<TxSummary> {
        self.calls.push(action.to_string());
        if let Some(reason) = self.revert_next_write.take() {
            return Err(eyre!(CallFailure::reverted(action, reason)));
        }
        if self.drop_next_write {
            self.drop_next_write = false;
            return Err(eyre!(CallFailure::new(action, None, "connection reset")));
        }
        self.tx_count += 1;
        let mined = !std::mem::take(&mut self.fail_next_receipt);
        check_receipt(
            action,
            mined,
            format!("0x{:064x}", self.tx_count),
            Some(self.tx_count),
        )
    }
}

pub type SharedChain = Arc<Mutex<FakeChain>>;

pub struct FakeContract {
    chain: SharedChain,
    player: Address,
}

impl CityContract for FakeContract {
    fn player(&self) -> Address {
        self.player
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain.lock().unwrap().chain_id)
    }

    async fn city(&self, _player: Address) -> Result<CityRecord> {
        let mut chain = self.chain.lock().unwrap();
        chain.calls.push("cities".to_string());
        if chain.fail_reads {
            return Err(eyre!(CallFailure::new(
                "cities",
                None,
                "could not detect network"
            )));
        }
        Ok(chain.record)
    }

    async fn start_game(&self) -> Result<TxSummary> {
        let mut chain = self.chain.lock().unwrap();
        let tx = chain.write("startGame")?;
        chain.record = CityRecord {
            turn: 1,
            wood: 500,
            steel: 300,
            energy: 200,
            ..CityRecord::default()
        };
        Ok(tx)
    }

    async fn build_structure(&self, structure: Structure) -> Result<TxSummary> {
        let mut chain = self.chain.lock().unwrap();
        let tx = chain.write("buildStructure")?;
        let record = &mut chain.record;
        match structure {
            Structure::Residential => record.residential += 1,
            Structure::Factory => record.factory += 1,
            Structure::PowerPlant => record.power_plant += 1,
        }
        record.turn += 1;
        Ok(tx)
    }
}

pub struct FakeConnector {
    pub wallet: Option<WalletDescriptor>,
    pub player: Address,
    pub chain: SharedChain,
}

impl FakeConnector {
    pub fn with_wallet(chain: SharedChain) -> Self {
        Self {
            wallet: Some(WalletDescriptor::new(
                "player",
                PathBuf::from("/keystores/player"),
            )),
            player: test_player(),
            chain,
        }
    }

    pub fn without_wallet(chain: SharedChain) -> Self {
        Self {
            wallet: None,
            ..Self::with_wallet(chain)
        }
    }
}

impl WalletConnector for FakeConnector {
    type Contract = FakeContract;

    fn wallet_location(&self) -> String {
        "/keystores".to_string()
    }

    fn locate_wallet(&self) -> Result<Option<WalletDescriptor>> {
        Ok(self.wallet.clone())
    }

    async fn connect(
        &self,
        wallet: &WalletDescriptor,
        password: String,
    ) -> Result<FakeContract> {
        if password != TEST_PASSWORD {
            return Err(eyre!("Invalid password for wallet '{}'", wallet.name));
        }
        Ok(FakeContract {
            chain: self.chain.clone(),
            player: self.player,
        })
    }
}

pub fn test_player() -> Address {
    "0x71C7656EC7ab88b098defB751B7401B5f6d8976F"
        .parse()
        .unwrap()
}

pub fn shared_chain(chain: FakeChain) -> SharedChain {
    Arc::new(Mutex::new(chain))
}

pub fn sepolia_session() -> SessionInfo {
    SessionInfo {
        env: DeploymentEnv::Sepolia,
        rpc_url: "http://localhost:8545".to_string(),
        contract_address: Address::ZERO,
    }
}

pub fn controller(connector: FakeConnector) -> AppController<FakeConnector> {
    AppController::new(connector, sepolia_session())
}
