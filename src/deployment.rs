use crate::port::Contracts;
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
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// The contract pair a network runs, as remembered between sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub network_url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    pub token_address: String,
    pub lottery_address: String,
    pub token_decimals: u8,
    #[serde(default)]
    pub token_ticker: Option<String>,
}

impl DeploymentRecord {
    pub fn new(
        network_url: impl Into<String>,
        chain_id: Option<u64>,
        contracts: &Contracts,
        token_ticker: Option<String>,
    ) -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            network_url: network_url.into(),
            chain_id,
            token_address: contracts.token.to_string(),
            lottery_address: contracts.lottery.to_string(),
            token_decimals: contracts.token_decimals,
            token_ticker,
        }
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    /// Store under `.deployments/` in the working directory.
    pub fn new(env: DeploymentEnv) -> Self {
        Self::new_in(DEPLOYMENTS_ROOT, env)
    }

    pub fn new_in(root: impl AsRef<Path>, env: DeploymentEnv) -> Self {
        let path = root.as_ref().join(env.dir_name()).join(DEPLOYMENTS_FILE);
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing was recorded for this network yet.
    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_record(&self.path)
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).wrap_err_with(|| {
                format!("Failed to create deployment directory {}", dir.display())
            })?;
        }
        write_record(&self.path, record)
    }
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).wrap_err("Failed to read deployment record")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    // older files kept a list; the last entry is the current one
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
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy_primitives::Address;
    use tempdir::TempDir;

    fn contracts() -> Contracts {
        Contracts {
            token: Address::repeat_byte(0x70),
            lottery: Address::repeat_byte(0x10),
            token_decimals: 18,
        }
    }

    #[test]
    fn load__missing_file_is_none() {
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::new_in(dir.path(), DeploymentEnv::Local);

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save__then_load_returns_record() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::new_in(dir.path(), DeploymentEnv::Test);
        let record = DeploymentRecord::new(
            "http://localhost:8545",
            Some(31337),
            &contracts(),
            Some("LOT".to_string()),
        );

        // when
        store.save(&record).unwrap();
        let loaded = store.load().unwrap();

        // then
        assert_eq!(loaded, Some(record));
        assert!(store.path().ends_with("test/deployments.json"));
    }

    #[test]
    fn load__list_of_records_returns_last() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::new_in(dir.path(), DeploymentEnv::Local);
        let first = DeploymentRecord::new("http://a", None, &contracts(), None);
        let mut second = first.clone();
        second.network_url = "http://b".to_string();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            serde_json::to_vec(&vec![first, second.clone()]).unwrap(),
        )
        .unwrap();

        // when
        let loaded = store.load().unwrap();

        // then
        assert_eq!(loaded, Some(second));
    }

    #[test]
    fn load__garbage_is_an_error() {
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::new_in(dir.path(), DeploymentEnv::Local);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        assert!(store.load().is_err());
    }
}
