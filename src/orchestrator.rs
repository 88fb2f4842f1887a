use crate::{
    amounts::{
        parse_address,
        parse_token_amount,
    },
    eligibility,
    error::{
        LotteryError,
        Result,
    },
    lottery_types::ILottery,
    port::LedgerPort,
    provider::Eip1193Provider,
    snapshot::{
        Identity,
        SignerState,
        UnixMillis,
    },
    store::SessionStore,
    token_types::IERC20,
};
use alloy_primitives::{
    Address,
    U256,
};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerSlot {
    First,
    Second,
}

impl ManagerSlot {
    pub fn is_first(self) -> bool {
        matches!(self, ManagerSlot::First)
    }
}

impl fmt::Display for ManagerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerSlot::First => write!(f, "manager 1"),
            ManagerSlot::Second => write!(f, "manager 2"),
        }
    }
}

/// Released on drop, so a cancelled action future frees the slot too.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs the state-changing actions, one at a time.
///
/// Every action validates its input first, then holds the single-flight slot while it marks
/// the store busy, talks to the ledger, clears busy, reports the outcome and refreshes.
pub struct ActionOrchestrator<P> {
    store: Arc<SessionStore<P>>,
    in_flight: AtomicBool,
}

impl<P: Eip1193Provider> ActionOrchestrator<P> {
    pub fn new(store: Arc<SessionStore<P>>) -> Self {
        Self {
            store,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore<P>> {
        &self.store
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Requests wallet access and sets the identity right away; the refresh that follows
    /// confirms it and fills in approval and balance.
    pub async fn connect(&self) -> Result<Address> {
        let port = self.require_port()?;
        let store = &self.store;
        self.run_gated(
            "Connecting wallet",
            |address| format!("Connected as {address}"),
            async move {
                port.request_access().await?;
                let address = port.signer_identity().await?;
                store.update(|snapshot| {
                    snapshot.identity = Identity::Connected(SignerState::provisional(address));
                });
                Ok(address)
            },
        )
        .await
    }

    /// Makes sure the lottery may spend at least `required` base units. Returns whether an
    /// approval had to be submitted.
    pub async fn ensure_approval(&self, required: U256) -> Result<bool> {
        let port = self.require_port()?;
        self.require_connected()?;
        self.run_gated(
            "Approving token spending",
            approval_status,
            ensure_allowance(port, required),
        )
        .await
    }

    /// Approves enough for one ticket at the current price.
    pub async fn approve(&self) -> Result<bool> {
        let port = self.require_port()?;
        self.require_connected()?;
        self.run_gated("Approving token spending", approval_status, async move {
            let price = read_ticket_price(port).await?;
            ensure_allowance(port, price.max(U256::from(1u8))).await
        })
        .await
    }

    pub async fn buy_tickets(&self, count: u64) -> Result<()> {
        let port = self.require_port()?;
        if count == 0 {
            return self.reject(LotteryError::validation("ticket count must be at least 1"));
        }
        self.require_connected()?;
        self.run_gated(
            "Buying tickets",
            |_| format!("Bought {count} ticket(s)"),
            async move {
                let price = read_ticket_price(port).await?;
                let required = price.checked_mul(U256::from(count)).ok_or_else(|| {
                    LotteryError::validation(format!("{count} tickets overflow the price"))
                })?;
                ensure_allowance(port, required).await?;
                let receipt = port
                    .call_authenticated(
                        port.contracts().lottery,
                        ILottery::enterCall {
                            ticketCount: U256::from(count),
                        },
                    )
                    .await?;
                info!(count, block = ?receipt.block_number, "tickets bought");
                Ok(())
            },
        )
        .await
    }

    pub async fn set_manager(&self, slot: ManagerSlot, raw_address: &str) -> Result<()> {
        let port = self.require_port()?;
        let manager = match parse_address(raw_address) {
            Ok(address) => address,
            Err(err) => return self.reject(err),
        };
        self.require_connected()?;
        self.run_gated(
            "Updating manager",
            |_| format!("Set {slot} to {manager}"),
            async move {
                port.call_authenticated(
                    port.contracts().lottery,
                    ILottery::setManagerCall {
                        isFirstSlot: slot.is_first(),
                        manager,
                    },
                )
                .await?;
                Ok(())
            },
        )
        .await
    }

    /// `raw_price` is a decimal token amount such as `"5"` or `"0.5"`.
    pub async fn set_ticket_price(&self, raw_price: &str) -> Result<()> {
        let port = self.require_port()?;
        let decimals = port.contracts().token_decimals;
        let amount = match parse_token_amount(raw_price, decimals) {
            Ok(amount) if amount.is_zero() => {
                return self.reject(LotteryError::validation("ticket price must be above 0"));
            }
            Ok(amount) => amount,
            Err(err) => return self.reject(err),
        };
        self.require_connected()?;
        let shown = raw_price.trim().to_string();
        self.run_gated(
            "Updating ticket price",
            |_| format!("Ticket price set to {shown}"),
            async move {
                port.call_authenticated(
                    port.contracts().lottery,
                    ILottery::setTicketPriceCall { amount },
                )
                .await?;
                Ok(())
            },
        )
        .await
    }

    /// Checks role, cooldown and pool against the current snapshot at `now` before drawing.
    pub async fn draw_lottery(&self, now: UnixMillis) -> Result<()> {
        let port = self.require_port()?;
        self.require_connected()?;
        if let Some(blocker) = eligibility::draw_blocker(&self.store.snapshot(), now) {
            return self.reject(LotteryError::validation(blocker.to_string()));
        }
        self.run_gated("Drawing the lottery", |_| "Lottery drawn".to_string(), async move {
            port.call_authenticated(port.contracts().lottery, ILottery::drawCall {})
                .await?;
            Ok(())
        })
        .await
    }

    async fn run_gated<T>(
        &self,
        message: &str,
        status: impl FnOnce(&T) -> String,
        action: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            return self.reject(LotteryError::Busy);
        };
        info!(%message, "action started");
        self.store.update(|snapshot| {
            snapshot.busy = true;
            snapshot.load_message = message.to_string();
        });

        let result = action.await;

        self.store.update(|snapshot| {
            snapshot.busy = false;
            snapshot.load_message.clear();
        });
        self.store.mark_dirty();
        // reported before the refresh so that refresh failures stay listed.
        // report_error is the one place a failure gets logged.
        match &result {
            Ok(value) => self.store.set_status(status(value)),
            Err(err) => self.store.report_error(err),
        }
        self.store.refresh().await;
        result
    }

    fn require_port(&self) -> Result<&LedgerPort<P>> {
        match self.store.port() {
            Some(port) => Ok(port),
            None => self.reject(LotteryError::ProviderAbsent),
        }
    }

    fn require_connected(&self) -> Result<()> {
        if self.store.snapshot().connected() {
            Ok(())
        } else {
            self.reject(LotteryError::NoSigner)
        }
    }

    fn reject<T>(&self, err: LotteryError) -> Result<T> {
        self.store.report_error(&err);
        Err(err)
    }
}

fn approval_status(submitted: &bool) -> String {
    if *submitted {
        "Token spending approved".to_string()
    } else {
        "Allowance already sufficient".to_string()
    }
}

async fn read_ticket_price<P: Eip1193Provider>(port: &LedgerPort<P>) -> Result<U256> {
    let ret = port
        .call_read_only(port.contracts().lottery, ILottery::ticketPriceCall {})
        .await?;
    Ok(ret._0)
}

/// Not gated on its own; callers hold the single-flight slot.
async fn ensure_allowance<P: Eip1193Provider>(
    port: &LedgerPort<P>,
    required: U256,
) -> Result<bool> {
    let lottery = port.contracts().lottery;
    let attempt = async {
        let signer = port.signer_identity().await?;
        let current = port.read_allowance(signer, lottery).await?;
        if current >= required {
            return Ok(false);
        }
        info!(%current, %required, "allowance too low, requesting approval");
        port.call_authenticated(
            port.contracts().token,
            IERC20::approveCall {
                spender: lottery,
                amount: U256::MAX,
            },
        )
        .await?;
        Ok::<_, LotteryError>(true)
    };
    attempt.await.map_err(LotteryError::allowance)
}
