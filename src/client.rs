use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use futures::future::LocalBoxFuture;
use lottery_client::{
    LotteryError,
    config::{
        AppConfig,
        resolve_contracts,
    },
    deployment::{
        DeploymentRecord,
        DeploymentStore,
    },
    orchestrator::ActionOrchestrator,
    port::LedgerPort,
    provider::{
        Eip1193Provider,
        HttpProvider,
        detect_provider,
    },
    store::SessionStore,
};
use serde_json::json;
use std::{
    fs,
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    self,
    MissedTickBehavior,
};
use tracing::{
    info,
    warn,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;

const REDRAW_INTERVAL: Duration = Duration::from_secs(1);

/// Logs go to a daily file; the terminal belongs to the UI. Keep the guard alive until exit.
pub fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "lottery-client.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("failed to install log subscriber: {err}"))?;
    Ok(guard)
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let env = config.network.deployment_env();
    let deployments = DeploymentStore::new(env);
    let saved = deployments
        .load()
        .wrap_err_with(|| format!("Failed to load the {env} deployment record"))?;
    let resolved = resolve_contracts(&config, saved.as_ref())?;
    info!(
        network = %env,
        url = config.network.url(),
        token = %resolved.contracts.token,
        lottery = %resolved.contracts.lottery,
        "contracts resolved"
    );

    let provider = detect_provider(config.network.url(), config.read_timeout).await;
    if config.save_deployment {
        let chain_id = match &provider {
            Some(provider) => chain_id(provider).await,
            None => None,
        };
        let record = DeploymentRecord::new(
            config.network.url(),
            chain_id,
            &resolved.contracts,
            Some(resolved.ticker.clone()),
        );
        deployments.save(&record)?;
        info!(path = %deployments.path().display(), "deployment recorded");
    }

    let port = LedgerPort::attach(provider, resolved.contracts, config.deadlines());
    let store = Arc::new(SessionStore::new(port));
    if store.port().is_none() {
        store.report_error(&LotteryError::ProviderAbsent);
    }
    let orchestrator = ActionOrchestrator::new(store);
    let mut ui_state = ui::UiState::new(resolved.ticker);
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        &orchestrator,
        &mut ui_state,
        &mut input_events,
        config.poll_interval,
    )
    .await;
    ui::terminal_exit()?;
    res
}

async fn chain_id(provider: &HttpProvider) -> Option<u64> {
    let value = provider.request("eth_chainId", json!([])).await.ok()?;
    let raw = value.as_str()?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

fn view<P>(store: &SessionStore<P>) -> ui::View {
    ui::View {
        snapshot: store.snapshot(),
        notices: store.notices(),
        now: now_millis(),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Resolves once the pending action finishes; never while there is none.
async fn settle(pending: &mut Option<LocalBoxFuture<'_, ()>>) {
    match pending {
        Some(action) => action.await,
        None => std::future::pending().await,
    }
}

/// Overdue ticks are dropped rather than fired back to back after a slow refresh.
fn poll_ticker(period: Duration) -> time::Interval {
    let mut poll = time::interval(period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    poll
}

/// A refresh the loop polls as its pending operation, so input keeps flowing meanwhile.
fn background_refresh<'a, P: Eip1193Provider + 'a>(
    store: Arc<SessionStore<P>>,
) -> LocalBoxFuture<'a, ()> {
    Box::pin(async move { store.refresh().await })
}

fn start_action<'a, P: Eip1193Provider>(
    orchestrator: &'a ActionOrchestrator<P>,
    event: ui::UserEvent,
) -> Option<LocalBoxFuture<'a, ()>> {
    // outcomes end up in the store's notices
    let action: LocalBoxFuture<'a, ()> = match event {
        ui::UserEvent::Login => Box::pin(async move {
            let _ = orchestrator.connect().await;
        }),
        ui::UserEvent::Approve => Box::pin(async move {
            let _ = orchestrator.approve().await;
        }),
        ui::UserEvent::BuyTickets(count) => Box::pin(async move {
            let _ = orchestrator.buy_tickets(count).await;
        }),
        ui::UserEvent::SetManager { slot, address } => Box::pin(async move {
            let _ = orchestrator.set_manager(slot, &address).await;
        }),
        ui::UserEvent::SetPrice(price) => Box::pin(async move {
            let _ = orchestrator.set_ticket_price(&price).await;
        }),
        ui::UserEvent::Draw => Box::pin(async move {
            let _ = orchestrator.draw_lottery(now_millis()).await;
        }),
        ui::UserEvent::Quit | ui::UserEvent::Redraw | ui::UserEvent::Refresh => return None,
    };
    Some(action)
}

async fn run_loop<P: Eip1193Provider>(
    orchestrator: &ActionOrchestrator<P>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
    poll_interval: Duration,
) -> Result<()> {
    tracing::info!("Running app loop");
    let store = orchestrator.store().clone();
    let mut updates = store.subscribe();
    let mut poll = poll_ticker(poll_interval);
    let mut redraw = time::interval(REDRAW_INTERVAL);
    let mut pending: Option<LocalBoxFuture<'_, ()>> = None;

    ui::draw(ui_state, &view(&store)).wrap_err("initial draw failed")?;
    loop {
        tokio::select! {
            _ = settle(&mut pending) => {
                pending = None;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = poll.tick() => {
                // an action refreshes on its own when it finishes
                if pending.is_none() {
                    pending = Some(background_refresh(store.clone()));
                }
            }
            _ = redraw.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Refresh => {
                        if pending.is_none() {
                            pending = Some(background_refresh(store.clone()));
                        }
                    }
                    action => {
                        if pending.is_some() {
                            warn!(?action, "ignored while another operation is running");
                            store.report_error(&LotteryError::Busy);
                        } else {
                            pending = start_action(orchestrator, action);
                        }
                    }
                }
            }
        }
        ui::draw(ui_state, &view(&store)).wrap_err("draw failed")?;
    }
    Ok(())
}
