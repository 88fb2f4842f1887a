use crate::{
    amounts::TokenAmount,
    error::{
        LotteryError,
        Result,
    },
    lottery_types::ILottery,
    port::LedgerPort,
    provider::Eip1193Provider,
};
use alloy_primitives::{
    Address,
    U256,
};
use futures::join;
use tracing::{
    debug,
    warn,
};

/// Unix time in milliseconds.
pub type UnixMillis = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerState {
    pub address: Address,
    pub approved: bool,
    pub allowance: Option<TokenAmount>,
    pub balance: Option<TokenAmount>,
    /// Set by `connect()` before the first refresh confirmed the identity.
    pub provisional: bool,
}

impl SignerState {
    pub fn provisional(address: Address) -> Self {
        Self {
            address,
            approved: false,
            allowance: None,
            balance: None,
            provisional: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Disconnected,
    Connected(SignerState),
}

/// Point-in-time picture of the lottery and the local session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub owner: Option<Address>,
    pub manager1: Option<Address>,
    pub manager2: Option<Address>,
    pub ticket_price: Option<TokenAmount>,
    pub price_pool: Option<TokenAmount>,
    pub last_draw_time: Option<UnixMillis>,
    pub identity: Identity,
    pub busy: bool,
    pub load_message: String,
}

impl StateSnapshot {
    pub fn connected(&self) -> bool {
        matches!(self.identity, Identity::Connected(_))
    }

    pub fn signer(&self) -> Option<&SignerState> {
        match &self.identity {
            Identity::Connected(signer) => Some(signer),
            Identity::Disconnected => None,
        }
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.signer().map(|signer| signer.address)
    }

    /// Always false while disconnected.
    pub fn token_transaction_approved(&self) -> bool {
        self.signer().is_some_and(|signer| signer.approved)
    }
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub snapshot: StateSnapshot,
    pub errors: Vec<LotteryError>,
}

impl SyncOutcome {
    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "snapshot read failed");
                self.errors.push(err);
                None
            }
        }
    }
}

/// Builds a fresh snapshot from the ledger. Never fails as a whole: every failed read is
/// collected in `errors` and leaves its field empty.
pub async fn build<P: Eip1193Provider>(port: Option<&LedgerPort<P>>) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let Some(port) = port else {
        debug!("no wallet provider, returning empty snapshot");
        return outcome;
    };
    let lottery = port.contracts().lottery;
    let decimals = port.contracts().token_decimals;

    let (price, pool, first, second, owner, last_draw) = join!(
        port.call_read_only(lottery, ILottery::ticketPriceCall {}),
        port.call_read_only(lottery, ILottery::pricePoolCall {}),
        port.call_read_only(
            lottery,
            ILottery::managersCall {
                index: U256::from(0u8)
            }
        ),
        port.call_read_only(
            lottery,
            ILottery::managersCall {
                index: U256::from(1u8)
            }
        ),
        port.call_read_only(lottery, ILottery::ownerCall {}),
        port.call_read_only(lottery, ILottery::lastDrawTimeCall {}),
    );

    let ticket_price = outcome
        .record(price)
        .map(|ret| TokenAmount::new(ret._0, decimals));
    outcome.snapshot.ticket_price = ticket_price;
    outcome.snapshot.price_pool = outcome
        .record(pool)
        .map(|ret| TokenAmount::new(ret._0, decimals));
    outcome.snapshot.manager1 = outcome.record(first).and_then(|ret| assigned(ret._0));
    outcome.snapshot.manager2 = outcome.record(second).and_then(|ret| assigned(ret._0));
    outcome.snapshot.owner = outcome.record(owner).and_then(|ret| assigned(ret._0));
    let last_draw = last_draw.and_then(|ret| seconds_to_millis(ret._0));
    outcome.snapshot.last_draw_time = outcome.record(last_draw);

    let address = match port.signer_identity().await {
        Ok(address) => address,
        Err(LotteryError::NoSigner) => return outcome,
        Err(err) => {
            outcome.record::<()>(Err(err));
            return outcome;
        }
    };

    let (allowance, balance) = join!(
        port.read_allowance(address, lottery),
        port.read_token_balance(address),
    );
    let allowance = outcome.record(allowance);
    let balance = outcome.record(balance);
    outcome.snapshot.identity = Identity::Connected(SignerState {
        address,
        approved: allowance.is_some_and(|allowance| covers_one_ticket(allowance, ticket_price)),
        allowance: allowance.map(|units| TokenAmount::new(units, decimals)),
        balance: balance.map(|units| TokenAmount::new(units, decimals)),
        provisional: false,
    });
    outcome
}

/// A non-zero allowance that covers at least one ticket. Without a known price any
/// non-zero allowance counts.
pub fn covers_one_ticket(allowance: U256, ticket_price: Option<TokenAmount>) -> bool {
    if allowance.is_zero() {
        return false;
    }
    ticket_price.is_none_or(|price| allowance >= price.base_units())
}

fn assigned(address: Address) -> Option<Address> {
    (address != Address::ZERO).then_some(address)
}

fn seconds_to_millis(seconds: U256) -> Result<UnixMillis> {
    u64::try_from(seconds)
        .ok()
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| secs.checked_mul(1000))
        .ok_or_else(|| LotteryError::Network(format!("lastDrawTime {seconds} is out of range")))
}
