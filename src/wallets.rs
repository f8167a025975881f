use alloy::signers::local::{
    MnemonicBuilder,
    PrivateKeySigner,
    coins_bip39::English,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use itertools::Itertools;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        if name.starts_with('.') {
            continue;
        }
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

pub fn select_wallet(dir: &Path, name: Option<&str>) -> Result<Option<WalletDescriptor>> {
    if let Some(name) = name {
        return find_wallet(dir, name).map(Some);
    }
    let mut wallets = list_wallets(dir)?;
    match wallets.len() {
        0 => Ok(None),
        1 => Ok(wallets.pop()),
        _ => Err(eyre!(
            "Multiple wallets found in {} ({}); choose one with --wallet <name>",
            dir.to_string_lossy(),
            wallets.iter().map(|w| w.name.as_str()).join(", ")
        )),
    }
}

// Scrypt makes this slow; call it off the async runtime.
pub fn unlock_signer(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;

    if secret.len() == 32 {
        return PrivateKeySigner::from_slice(&secret).map_err(|e| {
            eyre!("Wallet '{}' holds an invalid private key: {e}", descriptor.name)
        });
    }

    if let Ok(mnemonic) = std::str::from_utf8(&secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            return MnemonicBuilder::<English>::default()
                .phrase(mnemonic.trim())
                .build()
                .map_err(|e| {
                    eyre!("Wallet '{}' holds an invalid mnemonic: {e}", descriptor.name)
                });
        }
    }

    Err(eyre!(
        "Wallet '{}' contained unsupported key material",
        descriptor.name
    ))
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "{}").unwrap();
    }

    #[test]
    fn list_wallets__returns_empty_for_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");

        let wallets = list_wallets(&missing).unwrap();

        assert!(wallets.is_empty());
    }

    #[test]
    fn list_wallets__sorts_and_skips_hidden_files_and_dirs() {
        // given
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "zed");
        touch(tmp.path(), "alice");
        touch(tmp.path(), ".DS_Store");
        fs::create_dir(tmp.path().join("nested")).unwrap();

        // when
        let names: Vec<String> = list_wallets(tmp.path())
            .unwrap()
            .into_iter()
            .map(|w| w.name)
            .collect();

        // then
        assert_eq!(names, vec!["alice".to_string(), "zed".to_string()]);
    }

    #[test]
    fn select_wallet__returns_none_when_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();

        let selected = select_wallet(tmp.path(), None).unwrap();

        assert_eq!(selected, None);
    }

    #[test]
    fn select_wallet__picks_the_only_wallet() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "player");

        let selected = select_wallet(tmp.path(), None).unwrap().unwrap();

        assert_eq!(selected.name, "player");
    }

    #[test]
    fn select_wallet__requires_name_when_ambiguous() {
        // given
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "alice");
        touch(tmp.path(), "bob");

        // when
        let err = select_wallet(tmp.path(), None).unwrap_err();

        // then
        let msg = err.to_string();
        assert!(msg.contains("alice, bob"), "{msg}");
    }

    #[test]
    fn select_wallet__errors_on_unknown_name() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "alice");

        assert!(select_wallet(tmp.path(), Some("carol")).is_err());
        assert_eq!(
            select_wallet(tmp.path(), Some("alice")).unwrap().unwrap().name,
            "alice"
        );
    }

    #[test]
    fn resolve_wallet_dir__uses_explicit_path() {
        let dir = resolve_wallet_dir(Some("/tmp/keys")).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/keys"));
    }

    #[test]
    fn unlock_signer__rejects_garbage_keystore() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "broken");
        let descriptor = WalletDescriptor::new("broken", tmp.path().join("broken"));

        let err = unlock_signer(&descriptor, "hunter2").unwrap_err();

        assert!(err.to_string().contains("Invalid password"));
    }
}
