use crate::{
    error::{
        LotteryError,
        Result,
    },
    provider::{
        Eip1193Provider,
        ProviderError,
    },
    token_types::IERC20,
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use alloy_sol_types::SolCall;
use serde::Deserialize;
use serde_json::{
    Value,
    json,
};
use std::{
    str::FromStr,
    time::Duration,
};
use tokio::time;
use tracing::{
    debug,
    info,
};

pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(20);
pub const DEFAULT_TRANSACTION_DEADLINE: Duration = Duration::from_secs(180);
const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The fixed contract pair the client talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contracts {
    pub token: Address,
    pub lottery: Address,
    pub token_decimals: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadlines {
    /// Applies to every read and to account queries.
    pub read: Duration,
    /// Covers submission, signing in the wallet and waiting for the receipt.
    pub transaction: Duration,
    pub receipt_poll: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            read: DEFAULT_READ_DEADLINE,
            transaction: DEFAULT_TRANSACTION_DEADLINE,
            receipt_poll: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
}

/// Typed read/write handle over an injected wallet provider.
pub struct LedgerPort<P> {
    provider: P,
    contracts: Contracts,
    deadlines: Deadlines,
}

impl<P> LedgerPort<P> {
    pub fn new(provider: P, contracts: Contracts, deadlines: Deadlines) -> Self {
        Self {
            provider,
            contracts,
            deadlines,
        }
    }

    /// `None` when no provider was injected.
    pub fn attach(
        provider: Option<P>,
        contracts: Contracts,
        deadlines: Deadlines,
    ) -> Option<Self> {
        provider.map(|provider| Self::new(provider, contracts, deadlines))
    }

    pub fn contracts(&self) -> &Contracts {
        &self.contracts
    }

    pub fn deadlines(&self) -> &Deadlines {
        &self.deadlines
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: Eip1193Provider> LedgerPort<P> {
    pub async fn request_access(&self) -> Result<()> {
        let operation = "eth_requestAccounts";
        let limit = self.deadlines.transaction;
        let value = time::timeout(limit, self.provider.request(operation, json!([])))
            .await
            .map_err(|_| timeout(operation, limit))?
            .map_err(|err| match err {
                err if err.user_rejected() => {
                    LotteryError::ConnectionRejected("account access was declined".to_string())
                }
                ProviderError::Rpc { message, .. } => LotteryError::ConnectionRejected(message),
                other => LotteryError::Network(other.to_string()),
            })?;
        let accounts = parse_accounts(&value)?;
        if accounts.is_empty() {
            return Err(LotteryError::ConnectionRejected(
                "wallet returned no accounts".to_string(),
            ));
        }
        info!(account = %accounts[0], "wallet access granted");
        Ok(())
    }

    /// The first authorized account. `NoSigner` when the wallet has not granted access.
    pub async fn signer_identity(&self) -> Result<Address> {
        let operation = "eth_accounts";
        let limit = self.deadlines.read;
        let value = time::timeout(limit, self.provider.request(operation, json!([])))
            .await
            .map_err(|_| timeout(operation, limit))?
            .map_err(|err| LotteryError::Network(format!("{operation}: {err}")))?;
        parse_accounts(&value)?
            .into_iter()
            .next()
            .ok_or(LotteryError::NoSigner)
    }

    pub async fn read_token_balance(&self, owner: Address) -> Result<U256> {
        let call = IERC20::balanceOfCall { account: owner };
        let ret = self.call_read_only(self.contracts.token, call).await?;
        Ok(ret._0)
    }

    pub async fn read_allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        let call = IERC20::allowanceCall { owner, spender };
        let ret = self.call_read_only(self.contracts.token, call).await?;
        Ok(ret._0)
    }

    pub async fn call_read_only<C: SolCall>(
        &self,
        contract: Address,
        call: C,
    ) -> Result<C::Return> {
        let operation = format!("eth_call {}", C::SIGNATURE);
        let params = json!([
            {
                "to": contract.to_string(),
                "data": encode_hex(&call.abi_encode()),
            },
            "latest"
        ]);
        let limit = self.deadlines.read;
        let value = time::timeout(limit, self.provider.request("eth_call", params))
            .await
            .map_err(|_| timeout(&operation, limit))?
            .map_err(|err| LotteryError::Network(format!("{operation}: {err}")))?;
        let bytes = decode_hex_value(&value)?;
        C::abi_decode_returns(&bytes, true).map_err(|err| {
            LotteryError::Network(format!("{operation} returned undecodable data: {err}"))
        })
    }

    /// Submits `call` from the signer and waits for the receipt. A reverted receipt is a
    /// `Transaction` error.
    pub async fn call_authenticated<C: SolCall>(
        &self,
        contract: Address,
        call: C,
    ) -> Result<TransactionReceipt> {
        let operation = format!("transaction {}", C::SIGNATURE);
        let limit = self.deadlines.transaction;
        time::timeout(
            limit,
            self.submit_and_confirm(&operation, contract, call.abi_encode()),
        )
        .await
        .map_err(|_| timeout(&operation, limit))?
    }

    async fn submit_and_confirm(
        &self,
        operation: &str,
        contract: Address,
        data: Vec<u8>,
    ) -> Result<TransactionReceipt> {
        let from = self.signer_identity().await?;
        let params = json!([{
            "from": from.to_string(),
            "to": contract.to_string(),
            "data": encode_hex(&data),
        }]);
        let hash_value = self
            .provider
            .request("eth_sendTransaction", params)
            .await
            .map_err(|err| transaction_error(operation, err))?;
        let hash = parse_b256(&hash_value)?;
        info!(%operation, hash = %encode_hex(hash.as_slice()), "transaction submitted");

        loop {
            let value = self
                .provider
                .request(
                    "eth_getTransactionReceipt",
                    json!([encode_hex(hash.as_slice())]),
                )
                .await
                .map_err(|err| {
                    LotteryError::Network(format!("receipt for {operation}: {err}"))
                })?;
            if !value.is_null() {
                let dto: ReceiptDto = serde_json::from_value(value).map_err(|err| {
                    LotteryError::Network(format!("malformed receipt for {operation}: {err}"))
                })?;
                return dto.into_receipt(operation);
            }
            debug!(%operation, "receipt not available yet");
            time::sleep(self.deadlines.receipt_poll).await;
        }
    }
}

fn timeout(operation: &str, after: Duration) -> LotteryError {
    LotteryError::Timeout {
        operation: operation.to_string(),
        after,
    }
}

fn transaction_error(operation: &str, err: ProviderError) -> LotteryError {
    match err {
        err if err.user_rejected() => {
            LotteryError::Transaction(format!("{operation} was rejected by the signer"))
        }
        ProviderError::Rpc { message, .. } => {
            LotteryError::Transaction(format!("{operation}: {message}"))
        }
        other => LotteryError::Network(format!("{operation}: {other}")),
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex_value(value: &Value) -> Result<Vec<u8>> {
    let raw = value
        .as_str()
        .ok_or_else(|| LotteryError::Network(format!("expected hex string, got {value}")))?;
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|err| LotteryError::Network(format!("invalid hex '{raw}': {err}")))
}

fn parse_b256(value: &Value) -> Result<B256> {
    let raw = value.as_str().ok_or_else(|| {
        LotteryError::Network(format!("expected transaction hash, got {value}"))
    })?;
    B256::from_str(raw)
        .map_err(|err| LotteryError::Network(format!("invalid transaction hash '{raw}': {err}")))
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>> {
    let entries = value.as_array().ok_or_else(|| {
        LotteryError::Network(format!("expected a list of accounts, got {value}"))
    })?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .and_then(|raw| Address::from_str(raw).ok())
                .ok_or_else(|| LotteryError::Network(format!("invalid account {entry}")))
        })
        .collect()
}

fn parse_quantity(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptDto {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ReceiptDto {
    fn into_receipt(self, operation: &str) -> Result<TransactionReceipt> {
        let transaction_hash = parse_b256(&Value::String(self.transaction_hash.clone()))?;
        let succeeded = match self.status.as_deref() {
            Some(status) => parse_quantity(status) == Some(1),
            // pre-byzantium receipts carry no status
            None => true,
        };
        if !succeeded {
            return Err(LotteryError::Transaction(format!(
                "{operation} reverted in {}",
                self.transaction_hash
            )));
        }
        Ok(TransactionReceipt {
            transaction_hash,
            block_number: self.block_number.as_deref().and_then(parse_quantity),
        })
    }
}
