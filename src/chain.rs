use crate::{
    city::{
        CityRecord,
        Structure,
    },
    wallets::{
        self,
        WalletDescriptor,
    },
};
use alloy::{
    network::EthereumWallet,
    primitives::{
        Address,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::{
        json_rpc::ErrorPayload,
        types::TransactionReceipt,
    },
    sol,
    sol_types::{
        Revert,
        SolError,
        decode_revert_reason,
    },
};
use color_eyre::eyre::{
    Report,
    Result,
    WrapErr,
    eyre,
};
use std::{
    fmt,
    path::PathBuf,
};
use tracing::{
    debug,
    info,
};

sol! {
    #[sol(rpc)]
    contract CityManager {
        function cities(address player) external view returns (
            uint256 turn,
            uint256 wood,
            uint256 steel,
            uint256 energy,
            uint256 residential,
            uint256 factory,
            uint256 powerPlant
        );
        function startGame() external;
        function buildStructure(uint8 buildingType) external;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxSummary {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallFailure {
    pub action: &'static str,
    pub reason: Option<String>,
    pub detail: String,
}

impl CallFailure {
    pub fn new(action: &'static str, reason: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            action,
            reason,
            detail: detail.into(),
        }
    }

    pub fn reverted(action: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            action,
            detail: format!("execution reverted: {reason}"),
            reason: Some(reason),
        }
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} failed: {} ({})", self.action, reason, self.detail),
            None => write!(f, "{} failed: {}", self.action, self.detail),
        }
    }
}

impl std::error::Error for CallFailure {}

pub fn failure_reason(err: &Report) -> Option<String> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CallFailure>())
        .and_then(|failure| failure.reason.clone())
}

#[allow(async_fn_in_trait)]
pub trait CityContract {
    fn player(&self) -> Address;
    async fn chain_id(&self) -> Result<u64>;
    async fn city(&self, player: Address) -> Result<CityRecord>;
    async fn start_game(&self) -> Result<TxSummary>;
    async fn build_structure(&self, structure: Structure) -> Result<TxSummary>;
}

#[allow(async_fn_in_trait)]
pub trait WalletConnector {
    type Contract: CityContract;

    fn wallet_location(&self) -> String;
    fn locate_wallet(&self) -> Result<Option<WalletDescriptor>>;
    async fn connect(
        &self,
        wallet: &WalletDescriptor,
        password: String,
    ) -> Result<Self::Contract>;
}

#[derive(Clone, Debug)]
pub struct KeystoreConnector {
    pub rpc_url: String,
    pub contract_address: Address,
    pub wallet_dir: PathBuf,
    pub wallet_name: Option<String>,
}

impl WalletConnector for KeystoreConnector {
    type Contract = AlloyCityContract;

    fn wallet_location(&self) -> String {
        self.wallet_dir.display().to_string()
    }

    fn locate_wallet(&self) -> Result<Option<WalletDescriptor>> {
        wallets::select_wallet(&self.wallet_dir, self.wallet_name.as_deref())
    }

    async fn connect(
        &self,
        wallet: &WalletDescriptor,
        password: String,
    ) -> Result<AlloyCityContract> {
        let descriptor = wallet.clone();
        let signer = tokio::task::spawn_blocking(move || {
            wallets::unlock_signer(&descriptor, &password)
        })
        .await
        .wrap_err("keystore decryption task failed")??;
        let player = signer.address();
        info!(wallet = %wallet.name, %player, "wallet unlocked");

        let url = self
            .rpc_url
            .parse()
            .wrap_err_with(|| format!("Invalid RPC URL {}", self.rpc_url))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        let instance = CityManager::new(self.contract_address, provider.clone());
        Ok(AlloyCityContract {
            provider,
            instance,
            player,
        })
    }
}

pub struct AlloyCityContract {
    provider: DynProvider,
    instance: CityManager::CityManagerInstance<DynProvider>,
    player: Address,
}

impl CityContract for AlloyCityContract {
    fn player(&self) -> Address {
        self.player
    }

    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .wrap_err("Failed to query chain id")
    }

    async fn city(&self, player: Address) -> Result<CityRecord> {
        let data = self
            .instance
            .cities(player)
            .call()
            .await
            .map_err(|e| contract_failure("cities", e))?;
        Ok(CityRecord {
            turn: to_u64(data.turn),
            wood: to_u64(data.wood),
            steel: to_u64(data.steel),
            energy: to_u64(data.energy),
            residential: to_u64(data.residential),
            factory: to_u64(data.factory),
            power_plant: to_u64(data.powerPlant),
        })
    }

    async fn start_game(&self) -> Result<TxSummary> {
        let pending = self
            .instance
            .startGame()
            .send()
            .await
            .map_err(|e| contract_failure("startGame", e))?;
        debug!(tx = %pending.tx_hash(), "startGame submitted");
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| eyre!(CallFailure::new("startGame", None, e.to_string())))?;
        confirmed("startGame", &receipt)
    }

    async fn build_structure(&self, structure: Structure) -> Result<TxSummary> {
        let pending = self
            .instance
            .buildStructure(structure.code())
            .send()
            .await
            .map_err(|e| contract_failure("buildStructure", e))?;
        debug!(tx = %pending.tx_hash(), %structure, "buildStructure submitted");
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| eyre!(CallFailure::new("buildStructure", None, e.to_string())))?;
        confirmed("buildStructure", &receipt)
    }
}

fn to_u64(value: U256) -> u64 {
    value.saturating_to()
}

fn confirmed(action: &'static str, receipt: &TransactionReceipt) -> Result<TxSummary> {
    check_receipt(
        action,
        receipt.status(),
        receipt.transaction_hash.to_string(),
        receipt.block_number,
    )
}

pub fn check_receipt(
    action: &'static str,
    status: bool,
    tx_hash: String,
    block_number: Option<u64>,
) -> Result<TxSummary> {
    if !status {
        return Err(eyre!(CallFailure::new(
            action,
            Some("transaction reverted".to_string()),
            format!("transaction {tx_hash} reverted"),
        )));
    }
    info!(action, %tx_hash, block = ?block_number, "transaction confirmed");
    Ok(TxSummary {
        tx_hash,
        block_number,
    })
}

fn contract_failure(action: &'static str, err: alloy::contract::Error) -> Report {
    let reason = match &err {
        alloy::contract::Error::TransportError(transport) => {
            transport.as_error_resp().and_then(payload_reason)
        }
        _ => None,
    };
    eyre!(CallFailure::new(action, reason, err.to_string()))
}

fn payload_reason(payload: &ErrorPayload) -> Option<String> {
    match payload.as_revert_data() {
        Some(data) => Revert::abi_decode(&data)
            .map(|revert| revert.reason)
            .ok()
            .or_else(|| decode_revert_reason(&data))
            .or_else(|| Some(format!("reverted with data 0x{}", hex::encode(&data)))),
        None => revert_message(&payload.message),
    }
}

pub fn revert_message(message: &str) -> Option<String> {
    let rest = message.strip_prefix("execution reverted")?;
    let reason = rest.trim_start_matches(':').trim();
    if reason.is_empty() {
        None
    } else {
        Some(reason.to_string())
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn revert_message__extracts_reason() {
        assert_eq!(
            revert_message("execution reverted: Not enough wood"),
            Some("Not enough wood".to_string())
        );
        assert_eq!(revert_message("execution reverted"), None);
        assert_eq!(revert_message("nonce too low"), None);
    }

    #[test]
    fn failure_reason__finds_wrapped_call_failure() {
        // given
        let report = eyre!(CallFailure::reverted("buildStructure", "Game over"))
            .wrap_err("build failed");

        // when
        let reason = failure_reason(&report);

        // then
        assert_eq!(reason.as_deref(), Some("Game over"));
    }

    #[test]
    fn failure_reason__is_none_for_plain_errors() {
        let report = eyre!("connection refused");
        assert_eq!(failure_reason(&report), None);
    }

    fn node_error(message: &str, data: Option<Vec<u8>>) -> alloy::contract::Error {
        let mut body = serde_json::json!({ "code": 3, "message": message });
        if let Some(data) = data {
            body["data"] = serde_json::Value::String(format!("0x{}", hex::encode(data)));
        }
        let payload: ErrorPayload = serde_json::from_str(&body.to_string()).unwrap();
        alloy::contract::Error::TransportError(alloy::transports::RpcError::ErrorResp(payload))
    }

    #[test]
    fn contract_failure__decodes_revert_data_to_bare_reason() {
        // given
        let data = Revert {
            reason: "Not enough wood".to_string(),
        }
        .abi_encode();

        // when
        let report = contract_failure(
            "buildStructure",
            node_error("execution reverted", Some(data)),
        );

        // then
        assert_eq!(failure_reason(&report).as_deref(), Some("Not enough wood"));
    }

    #[test]
    fn contract_failure__falls_back_to_message_reason() {
        let report =
            contract_failure("startGame", node_error("execution reverted: Game over", None));

        assert_eq!(failure_reason(&report).as_deref(), Some("Game over"));
    }

    #[test]
    fn contract_failure__hex_encodes_unknown_revert_data() {
        let report = contract_failure(
            "buildStructure",
            node_error("execution reverted", Some(vec![0xff; 4])),
        );

        assert_eq!(
            failure_reason(&report).as_deref(),
            Some("reverted with data 0xffffffff")
        );
    }

    #[test]
    fn contract_failure__has_no_reason_for_other_node_errors() {
        let report = contract_failure("cities", node_error("header not found", None));

        assert_eq!(failure_reason(&report), None);
    }

    #[test]
    fn check_receipt__failed_status_is_a_revert() {
        // when
        let err =
            check_receipt("buildStructure", false, "0xabc".to_string(), Some(7)).unwrap_err();

        // then
        assert_eq!(failure_reason(&err).as_deref(), Some("transaction reverted"));
        assert!(err.to_string().contains("transaction 0xabc reverted"));
    }

    #[test]
    fn check_receipt__successful_status_summarizes_tx() {
        let tx = check_receipt("startGame", true, "0xabc".to_string(), Some(7)).unwrap();

        assert_eq!(
            tx,
            TxSummary {
                tx_hash: "0xabc".to_string(),
                block_number: Some(7),
            }
        );
    }

    #[test]
    fn to_u64__saturates_large_values() {
        assert_eq!(to_u64(U256::from(42u64)), 42);
        assert_eq!(to_u64(U256::MAX), u64::MAX);
    }
}
