use crate::{
    amounts::TokenAmount,
    lottery_types::ILottery,
    orchestrator::ActionOrchestrator,
    port::{
        Contracts,
        Deadlines,
        LedgerPort,
        encode_hex,
    },
    provider::{
        Eip1193Provider,
        ProviderError,
        USER_REJECTED_CODE,
    },
    store::SessionStore,
    token_types::IERC20,
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use alloy_sol_types::{
    SolCall,
    SolInterface,
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    str::FromStr,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};
use tokio::sync::watch;

pub const TEST_DECIMALS: u8 = 18;
pub const GENESIS_SECS: u64 = 1_700_000_000;
const COOLDOWN_SECS: u64 = 300;

pub fn token_address() -> Address {
    Address::repeat_byte(0x70)
}

pub fn lottery_address() -> Address {
    Address::repeat_byte(0x10)
}

pub fn owner_account() -> Address {
    Address::with_last_byte(0x01)
}

pub fn manager_account() -> Address {
    Address::with_last_byte(0x02)
}

pub fn player_account() -> Address {
    Address::with_last_byte(0x03)
}

pub fn tokens(whole: u64) -> U256 {
    TokenAmount::whole(whole, TEST_DECIMALS).base_units()
}

pub fn contracts() -> Contracts {
    Contracts {
        token: token_address(),
        lottery: lottery_address(),
        token_decimals: TEST_DECIMALS,
    }
}

pub fn test_deadlines() -> Deadlines {
    Deadlines {
        read: Duration::from_secs(5),
        transaction: Duration::from_secs(30),
        receipt_poll: Duration::from_millis(10),
    }
}

/// A store and orchestrator wired to `wallet`, nothing read yet.
pub fn session(
    wallet: &FakeWallet,
) -> (Arc<SessionStore<FakeWallet>>, ActionOrchestrator<FakeWallet>) {
    let port = LedgerPort::new(wallet.clone(), contracts(), test_deadlines());
    let store = Arc::new(SessionStore::new(Some(port)));
    let orchestrator = ActionOrchestrator::new(store.clone());
    (store, orchestrator)
}

/// Both contracts and the wallet in one place.
#[derive(Debug, Clone)]
pub struct FakeChain {
    pub now_secs: u64,
    pub balances: HashMap<Address, U256>,
    pub allowances: HashMap<(Address, Address), U256>,
    pub owner: Address,
    pub managers: [Address; 2],
    pub ticket_price: U256,
    pub price_pool: U256,
    pub last_draw_secs: u64,
    pub entries: Vec<(Address, u64)>,
    /// The account the wallet hands out on `eth_requestAccounts`.
    pub wallet_account: Address,
    /// Currently authorized account, what `eth_accounts` returns.
    pub authorized: Option<Address>,
    pub reject_access: bool,
    /// Function names whose transactions the user rejects, e.g. `"approve"`.
    pub rejected_transactions: HashSet<String>,
    /// Function names whose `eth_call` fails.
    pub failing_reads: HashSet<String>,
    /// Function names whose `eth_call` never answers.
    pub hanging_reads: HashSet<String>,
    /// Receipt polls answered with `null` before the receipt shows up.
    pub receipt_delay_polls: u32,
    pub calls: Vec<String>,
    receipts: HashMap<B256, (Value, u32)>,
    next_tx: u64,
}

impl Default for FakeChain {
    fn default() -> Self {
        let balances = [owner_account(), manager_account(), player_account()]
            .into_iter()
            .map(|account| (account, tokens(100)))
            .collect();
        Self {
            now_secs: GENESIS_SECS,
            balances,
            allowances: HashMap::new(),
            owner: owner_account(),
            managers: [manager_account(), Address::ZERO],
            ticket_price: tokens(5),
            price_pool: U256::ZERO,
            last_draw_secs: GENESIS_SECS - 1_000,
            entries: Vec::new(),
            wallet_account: player_account(),
            authorized: None,
            reject_access: false,
            rejected_transactions: HashSet::new(),
            failing_reads: HashSet::new(),
            hanging_reads: HashSet::new(),
            receipt_delay_polls: 0,
            calls: Vec::new(),
            receipts: HashMap::new(),
            next_tx: 1,
        }
    }
}

impl FakeChain {
    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    fn lottery_read(&mut self, call: ILottery::ILotteryCalls) -> Result<Vec<u8>, String> {
        use ILottery::ILotteryCalls as C;
        Ok(match call {
            C::ticketPrice(_) => {
                ILottery::ticketPriceCall::abi_encode_returns(&(self.ticket_price,))
            }
            C::pricePool(_) => ILottery::pricePoolCall::abi_encode_returns(&(self.price_pool,)),
            C::managers(call) => {
                let slot = usize::try_from(call.index)
                    .ok()
                    .and_then(|index| self.managers.get(index).copied())
                    .ok_or("managers: index out of bounds")?;
                ILottery::managersCall::abi_encode_returns(&(slot,))
            }
            C::owner(_) => ILottery::ownerCall::abi_encode_returns(&(self.owner,)),
            C::lastDrawTime(_) => ILottery::lastDrawTimeCall::abi_encode_returns(&(
                U256::from(self.last_draw_secs),
            )),
            _ => return Err("not a view function".to_string()),
        })
    }

    fn token_read(&mut self, call: IERC20::IERC20Calls) -> Result<Vec<u8>, String> {
        use IERC20::IERC20Calls as C;
        Ok(match call {
            C::balanceOf(call) => {
                IERC20::balanceOfCall::abi_encode_returns(&(self.balance(call.account),))
            }
            C::allowance(call) => IERC20::allowanceCall::abi_encode_returns(&(
                self.allowance(call.owner, call.spender),
            )),
            C::approve(_) => return Err("not a view function".to_string()),
        })
    }

    /// Applies a transaction; `Err` is a revert reason.
    fn execute(&mut self, from: Address, to: Address, data: &[u8]) -> Result<(), String> {
        if to == token_address() {
            return match IERC20::IERC20Calls::abi_decode(data, true) {
                Ok(IERC20::IERC20Calls::approve(call)) => {
                    self.allowances.insert((from, call.spender), call.amount);
                    Ok(())
                }
                Ok(_) => Err("view function sent as transaction".to_string()),
                Err(err) => Err(err.to_string()),
            };
        }
        if to != lottery_address() {
            return Err(format!("no contract at {to}"));
        }
        use ILottery::ILotteryCalls as C;
        match C::abi_decode(data, true).map_err(|err| err.to_string())? {
            C::enter(call) => {
                let count = u64::try_from(call.ticketCount).map_err(|err| err.to_string())?;
                if count == 0 {
                    return Err("no tickets".to_string());
                }
                let cost = self
                    .ticket_price
                    .checked_mul(call.ticketCount)
                    .ok_or("cost overflow")?;
                let allowance = self.allowance(from, lottery_address());
                if allowance < cost {
                    return Err("insufficient allowance".to_string());
                }
                let balance = self.balance(from);
                if balance < cost {
                    return Err("insufficient balance".to_string());
                }
                self.balances.insert(from, balance - cost);
                if allowance != U256::MAX {
                    self.allowances
                        .insert((from, lottery_address()), allowance - cost);
                }
                self.price_pool += cost;
                self.entries.push((from, count));
                Ok(())
            }
            C::setManager(call) => {
                if from != self.owner {
                    return Err("only owner".to_string());
                }
                let slot = if call.isFirstSlot { 0 } else { 1 };
                self.managers[slot] = call.manager;
                Ok(())
            }
            C::setTicketPrice(call) => {
                if from != self.owner {
                    return Err("only owner".to_string());
                }
                if call.amount.is_zero() {
                    return Err("price must be positive".to_string());
                }
                self.ticket_price = call.amount;
                Ok(())
            }
            C::draw(_) => {
                if from != self.owner && !self.managers.contains(&from) {
                    return Err("only managers".to_string());
                }
                if self.now_secs < self.last_draw_secs + COOLDOWN_SECS {
                    return Err("cooldown".to_string());
                }
                if self.price_pool.is_zero() {
                    return Err("empty pool".to_string());
                }
                if let Some((winner, _)) = self.entries.first().copied() {
                    let balance = self.balance(winner);
                    self.balances.insert(winner, balance + self.price_pool);
                }
                self.price_pool = U256::ZERO;
                self.entries.clear();
                self.last_draw_secs = self.now_secs;
                Ok(())
            }
            _ => Err("view function sent as transaction".to_string()),
        }
    }

    fn store_receipt(&mut self, succeeded: bool) -> B256 {
        let hash = B256::left_padding_from(&self.next_tx.to_be_bytes());
        let receipt = json!({
            "transactionHash": encode_hex(hash.as_slice()),
            "blockNumber": format!("0x{:x}", self.next_tx),
            "status": if succeeded { "0x1" } else { "0x0" },
        });
        self.receipts
            .insert(hash, (receipt, self.receipt_delay_polls));
        self.next_tx += 1;
        hash
    }
}

/// In-process wallet provider over a simulated chain.
#[derive(Clone)]
pub struct FakeWallet {
    chain: Arc<Mutex<FakeChain>>,
    hold: Arc<watch::Sender<bool>>,
}

impl Default for FakeWallet {
    fn default() -> Self {
        Self::new(FakeChain::default())
    }
}

impl FakeWallet {
    pub fn new(chain: FakeChain) -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            chain: Arc::new(Mutex::new(chain)),
            hold: Arc::new(hold),
        }
    }

    /// A wallet that already authorized `account`.
    pub fn connected_as(account: Address) -> Self {
        Self::new(FakeChain {
            wallet_account: account,
            authorized: Some(account),
            ..FakeChain::default()
        })
    }

    pub fn chain(&self) -> MutexGuard<'_, FakeChain> {
        self.chain.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.chain().calls.clone()
    }

    /// Function names of submitted transactions, in order.
    pub fn transactions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| {
                call.strip_prefix("eth_sendTransaction:")
                    .map(str::to_string)
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.chain().calls.clear();
    }

    /// Transactions wait before reaching the chain until `release_transactions`.
    pub fn hold_transactions(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_transactions(&self) {
        self.hold.send_replace(false);
    }

    fn log(&self, entry: String) {
        self.chain().calls.push(entry);
    }

    async fn eth_call(&self, params: &Value) -> Result<Value, ProviderError> {
        let (to, data) = transaction_fields(params)?;
        let (name, outcome) = {
            let mut chain = self.chain();
            if to == lottery_address() {
                let call = ILottery::ILotteryCalls::abi_decode(&data, true)
                    .map_err(|err| ProviderError::Malformed(err.to_string()))?;
                let name = lottery_function_name(&call);
                (name, chain.lottery_read(call))
            } else if to == token_address() {
                let call = IERC20::IERC20Calls::abi_decode(&data, true)
                    .map_err(|err| ProviderError::Malformed(err.to_string()))?;
                let name = token_function_name(&call);
                (name, chain.token_read(call))
            } else {
                return Err(ProviderError::Malformed(format!("no contract at {to}")));
            }
        };
        self.log(format!("eth_call:{name}"));

        let (hangs, fails) = {
            let chain = self.chain();
            (
                chain.hanging_reads.contains(name),
                chain.failing_reads.contains(name),
            )
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        if fails {
            return Err(ProviderError::Transport(format!("{name} unavailable")));
        }
        let encoded = outcome.map_err(ProviderError::Malformed)?;
        Ok(json!(encode_hex(&encoded)))
    }

    async fn send_transaction(&self, params: &Value) -> Result<Value, ProviderError> {
        let (to, data) = transaction_fields(params)?;
        let from = params[0]["from"]
            .as_str()
            .and_then(|raw| Address::from_str(raw).ok())
            .ok_or_else(|| ProviderError::Malformed("missing sender".to_string()))?;
        let name = transaction_function_name(to, &data);
        self.log(format!("eth_sendTransaction:{name}"));

        let mut held = self.hold.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        let mut chain = self.chain();
        if chain.authorized != Some(from) {
            return Err(ProviderError::Rpc {
                code: 4100,
                message: format!("{from} is not authorized"),
            });
        }
        if chain.rejected_transactions.contains(name) {
            return Err(ProviderError::Rpc {
                code: USER_REJECTED_CODE,
                message: "User rejected the request.".to_string(),
            });
        }
        let succeeded = chain.execute(from, to, &data).is_ok();
        let hash = chain.store_receipt(succeeded);
        Ok(json!(encode_hex(hash.as_slice())))
    }

    fn receipt(&self, params: &Value) -> Result<Value, ProviderError> {
        let hash = params[0]
            .as_str()
            .and_then(|raw| B256::from_str(raw).ok())
            .ok_or_else(|| ProviderError::Malformed("missing transaction hash".to_string()))?;
        let mut chain = self.chain();
        let Some((receipt, delay)) = chain.receipts.get_mut(&hash) else {
            return Ok(Value::Null);
        };
        if *delay > 0 {
            *delay -= 1;
            return Ok(Value::Null);
        }
        Ok(receipt.clone())
    }
}

impl Eip1193Provider for FakeWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match method {
            "eth_chainId" => Ok(json!("0x7a69")),
            "eth_accounts" => {
                self.log(method.to_string());
                let accounts: Vec<String> = self
                    .chain()
                    .authorized
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                Ok(json!(accounts))
            }
            "eth_requestAccounts" => {
                self.log(method.to_string());
                let mut chain = self.chain();
                if chain.reject_access {
                    return Err(ProviderError::Rpc {
                        code: USER_REJECTED_CODE,
                        message: "User rejected the request.".to_string(),
                    });
                }
                let account = chain.wallet_account;
                chain.authorized = Some(account);
                Ok(json!([account.to_string()]))
            }
            "eth_call" => self.eth_call(&params).await,
            "eth_sendTransaction" => self.send_transaction(&params).await,
            "eth_getTransactionReceipt" => self.receipt(&params),
            other => Err(ProviderError::Rpc {
                code: -32601,
                message: format!("method {other} not supported"),
            }),
        }
    }
}

fn transaction_fields(params: &Value) -> Result<(Address, Vec<u8>), ProviderError> {
    let tx = &params[0];
    let to = tx["to"]
        .as_str()
        .and_then(|raw| Address::from_str(raw).ok())
        .ok_or_else(|| ProviderError::Malformed("missing recipient".to_string()))?;
    let data = tx["data"]
        .as_str()
        .and_then(|raw| hex::decode(raw.trim_start_matches("0x")).ok())
        .ok_or_else(|| ProviderError::Malformed("missing calldata".to_string()))?;
    Ok((to, data))
}

fn lottery_function_name(call: &ILottery::ILotteryCalls) -> &'static str {
    use ILottery::ILotteryCalls as C;
    match call {
        C::ticketPrice(_) => "ticketPrice",
        C::pricePool(_) => "pricePool",
        C::managers(_) => "managers",
        C::owner(_) => "owner",
        C::lastDrawTime(_) => "lastDrawTime",
        C::enter(_) => "enter",
        C::setManager(_) => "setManager",
        C::setTicketPrice(_) => "setTicketPrice",
        C::draw(_) => "draw",
    }
}

fn token_function_name(call: &IERC20::IERC20Calls) -> &'static str {
    use IERC20::IERC20Calls as C;
    match call {
        C::balanceOf(_) => "balanceOf",
        C::allowance(_) => "allowance",
        C::approve(_) => "approve",
    }
}

fn transaction_function_name(to: Address, data: &[u8]) -> &'static str {
    if to == lottery_address() {
        ILottery::ILotteryCalls::abi_decode(data, true)
            .map(|call| lottery_function_name(&call))
            .unwrap_or("unknown")
    } else if to == token_address() {
        IERC20::IERC20Calls::abi_decode(data, true)
            .map(|call| token_function_name(&call))
            .unwrap_or("unknown")
    } else {
        "unknown"
    }
}
