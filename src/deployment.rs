use alloy::primitives::Address;
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

pub const SEPOLIA_CITY_MANAGER: &str = "0x1ed5e4117958597D6Bd4c4426C37B4F1f0dEa267";
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const LOCAL_CHAIN_ID: u64 = 31_337;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Sepolia,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Sepolia => "sepolia",
            DeploymentEnv::Local => "local",
        }
    }

    pub fn expected_chain_id(self) -> u64 {
        match self {
            DeploymentEnv::Sepolia => SEPOLIA_CHAIN_ID,
            DeploymentEnv::Local => LOCAL_CHAIN_ID,
        }
    }

    pub fn builtin_address(self) -> Option<Address> {
        match self {
            DeploymentEnv::Sepolia => Address::from_str(SEPOLIA_CITY_MANAGER).ok(),
            DeploymentEnv::Local => None,
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Sepolia => "Sepolia",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_address: String,
    pub network_url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

impl DeploymentRecord {
    pub fn new(address: Address, network_url: impl Into<String>, chain_id: Option<u64>) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            contract_address: address.to_checksum(None),
            network_url: network_url.into(),
            chain_id,
        }
    }

    pub fn address(&self) -> Result<Address> {
        Address::from_str(self.contract_address.trim()).map_err(|e| {
            eyre!(
                "Deployment record contains an invalid contract address {:?}: {e}",
                self.contract_address
            )
        })
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::at(Path::new(DEPLOYMENTS_ROOT), env)
    }

    pub fn at(root: &Path, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root, env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        write_record(&self.path, record)
    }
}

pub fn resolve_contract_address(
    env: DeploymentEnv,
    explicit: Option<Address>,
    store: &DeploymentStore,
) -> Result<Address> {
    if let Some(address) = explicit {
        return Ok(address);
    }
    if let Some(record) = store.load()? {
        return record.address();
    }
    env.builtin_address().ok_or_else(|| {
        eyre!(
            "No City Manager address known for {env}.\n\
             Pass --contract <address> (add --save-deployment to remember it).\n\
             Deployment records file: {}",
            store.path().display()
        )
    })
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).wrap_err_with(|| {
            format!("Failed to create {} directory", env_dir.display())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::write(&file_path, b"").wrap_err_with(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).wrap_err("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(eyre!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .wrap_err("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).wrap_err("Failed to write deployment record")?;
    Ok(())
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn local_address() -> Address {
        Address::from([0x42u8; 20])
    }

    #[test]
    fn store__creates_empty_record_file() {
        let tmp = tempfile::tempdir().unwrap();

        let store = DeploymentStore::at(tmp.path(), DeploymentEnv::Local).unwrap();

        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn store__roundtrips_saved_record() {
        // given
        let tmp = tempfile::tempdir().unwrap();
        let store = DeploymentStore::at(tmp.path(), DeploymentEnv::Local).unwrap();
        let record =
            DeploymentRecord::new(local_address(), "http://localhost:8545", Some(31_337));

        // when
        store.save(&record).unwrap();

        // then
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.address().unwrap(), local_address());
    }

    #[test]
    fn store__reads_last_entry_of_a_list() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DeploymentStore::at(tmp.path(), DeploymentEnv::Local).unwrap();
        let older = DeploymentRecord::new(Address::ZERO, "http://old", None);
        let newer = DeploymentRecord::new(local_address(), "http://new", None);
        fs::write(store.path(), serde_json::to_vec(&vec![older, newer.clone()]).unwrap())
            .unwrap();

        assert_eq!(store.load().unwrap(), Some(newer));
    }

    #[test]
    fn store__rejects_malformed_json() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DeploymentStore::at(tmp.path(), DeploymentEnv::Local).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn resolve_contract_address__prefers_explicit_then_record_then_builtin() {
        // given
        let tmp = tempfile::tempdir().unwrap();
        let store = DeploymentStore::at(tmp.path(), DeploymentEnv::Sepolia).unwrap();
        let builtin = Address::from_str(SEPOLIA_CITY_MANAGER).unwrap();

        // then
        assert_eq!(
            resolve_contract_address(DeploymentEnv::Sepolia, None, &store).unwrap(),
            builtin
        );
        store
            .save(&DeploymentRecord::new(local_address(), "http://rpc", None))
            .unwrap();
        assert_eq!(
            resolve_contract_address(DeploymentEnv::Sepolia, None, &store).unwrap(),
            local_address()
        );
        assert_eq!(
            resolve_contract_address(DeploymentEnv::Sepolia, Some(Address::ZERO), &store)
                .unwrap(),
            Address::ZERO
        );
    }

    #[test]
    fn resolve_contract_address__fails_for_local_without_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DeploymentStore::at(tmp.path(), DeploymentEnv::Local).unwrap();

        let err = resolve_contract_address(DeploymentEnv::Local, None, &store).unwrap_err();

        assert!(err.to_string().contains("--contract"));
    }
}
