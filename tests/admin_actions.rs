#![allow(non_snake_case)]
use alloy_primitives::U256;
use lottery_client::{
    LotteryError,
    eligibility,
    orchestrator::ManagerSlot,
    snapshot::UnixMillis,
    test_helpers::{
        FakeWallet,
        GENESIS_SECS,
        manager_account,
        owner_account,
        player_account,
        session,
        tokens,
    },
};

fn genesis_millis() -> UnixMillis {
    i64::try_from(GENESIS_SECS).unwrap() * 1000
}

#[tokio::test]
async fn set_ticket_price__owner__refresh_shows_new_price() {
    // given
    let wallet = FakeWallet::connected_as(owner_account());
    wallet.chain().ticket_price = tokens(2);
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    assert_eq!(store.snapshot().ticket_price.unwrap().to_string(), "2");

    // when
    orchestrator.set_ticket_price("5").await.unwrap();

    // then
    assert_eq!(wallet.transactions(), vec!["setTicketPrice"]);
    assert_eq!(wallet.chain().ticket_price, tokens(5));
    assert_eq!(store.snapshot().ticket_price.unwrap().to_string(), "5");
    assert_eq!(store.notices().status, "Ticket price set to 5");
}

#[tokio::test]
async fn set_ticket_price__fractional_amount__scaled_by_decimals() {
    let wallet = FakeWallet::connected_as(owner_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    orchestrator.set_ticket_price("0.5").await.unwrap();

    assert_eq!(store.snapshot().ticket_price.unwrap().to_string(), "0.5");
}

#[tokio::test]
async fn set_ticket_price__invalid_input__no_calls() {
    // given
    let wallet = FakeWallet::connected_as(owner_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    wallet.clear_calls();

    for raw in ["abc", "0", "-1", ""] {
        // when
        let result = orchestrator.set_ticket_price(raw).await;

        // then
        assert!(
            matches!(result, Err(LotteryError::Validation(_))),
            "{raw:?} should be rejected"
        );
    }
    assert!(wallet.calls().is_empty());
    assert_eq!(wallet.chain().ticket_price, tokens(5));
    assert_eq!(store.notices().errors.len(), 4);
}

#[tokio::test]
async fn set_manager__owner__assigns_slot() {
    // given
    let wallet = FakeWallet::connected_as(owner_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    assert_eq!(store.snapshot().manager2, None);

    // when
    orchestrator
        .set_manager(ManagerSlot::Second, &player_account().to_string())
        .await
        .unwrap();

    // then
    assert_eq!(wallet.transactions(), vec!["setManager"]);
    assert_eq!(wallet.chain().managers, [manager_account(), player_account()]);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.manager1, Some(manager_account()));
    assert_eq!(snapshot.manager2, Some(player_account()));
}

#[tokio::test]
async fn set_manager__invalid_address__no_network_calls() {
    // given
    let wallet = FakeWallet::connected_as(owner_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    wallet.clear_calls();

    for raw in ["0x1234", "not-an-address", ""] {
        // when
        let result = orchestrator.set_manager(ManagerSlot::First, raw).await;

        // then
        assert!(
            matches!(result, Err(LotteryError::Validation(_))),
            "{raw:?} should be rejected"
        );
    }
    assert!(wallet.calls().is_empty());
    assert_eq!(store.snapshot().manager1, Some(manager_account()));
}

#[tokio::test]
async fn set_manager__non_owner__transaction_reverts() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    let result = orchestrator
        .set_manager(ManagerSlot::First, &player_account().to_string())
        .await;

    // then
    assert!(matches!(result, Err(LotteryError::Transaction(_))));
    assert_eq!(wallet.chain().managers[0], manager_account());
    assert!(!store.snapshot().busy);
}

#[tokio::test]
async fn draw_lottery__manager_after_cooldown__pays_out() {
    // given
    let wallet = FakeWallet::connected_as(manager_account());
    {
        let mut chain = wallet.chain();
        chain.price_pool = tokens(10);
        chain.entries.push((player_account(), 2));
        chain.last_draw_secs = GENESIS_SECS - 400;
    }
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    assert!(eligibility::can_draw_now(&store.snapshot(), genesis_millis()));

    // when
    orchestrator.draw_lottery(genesis_millis()).await.unwrap();

    // then
    assert_eq!(wallet.transactions(), vec!["draw"]);
    assert_eq!(wallet.chain().balance(player_account()), tokens(110));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.price_pool.unwrap().to_string(), "0");
    assert_eq!(snapshot.last_draw_time, Some(genesis_millis()));
    assert_eq!(store.notices().status, "Lottery drawn");
}

#[tokio::test]
async fn draw_lottery__recent_draw_and_empty_pool__rejected_without_calls() {
    // given
    let wallet = FakeWallet::connected_as(manager_account());
    wallet.chain().last_draw_secs = GENESIS_SECS - 200;
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    wallet.clear_calls();
    let snapshot = store.snapshot();
    assert!(eligibility::is_manager(&snapshot));
    assert!(!eligibility::can_draw_now(&snapshot, genesis_millis()));
    assert_eq!(
        eligibility::seconds_until_draw(&snapshot, genesis_millis()),
        Some(100)
    );

    // when
    let result = orchestrator.draw_lottery(genesis_millis()).await;

    // then
    let err = result.unwrap_err();
    assert!(matches!(err, LotteryError::Validation(_)));
    assert!(err.to_string().contains("100s"), "{err}");
    assert!(wallet.calls().is_empty());
}

#[tokio::test]
async fn draw_lottery__pool_below_one_token__rejected_without_calls() {
    // given
    let wallet = FakeWallet::connected_as(owner_account());
    wallet.chain().price_pool = tokens(1) / U256::from(2u8);
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    wallet.clear_calls();

    // when
    let result = orchestrator.draw_lottery(genesis_millis()).await;

    // then
    let err = result.unwrap_err();
    assert!(err.to_string().contains("at least one token"), "{err}");
    assert!(wallet.calls().is_empty());
}

#[tokio::test]
async fn draw_lottery__plain_player__rejected_without_calls() {
    let wallet = FakeWallet::connected_as(player_account());
    wallet.chain().price_pool = tokens(10);
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    wallet.clear_calls();

    let result = orchestrator.draw_lottery(genesis_millis()).await;

    assert!(matches!(result, Err(LotteryError::Validation(_))));
    assert!(wallet.calls().is_empty());
    assert_eq!(wallet.chain().price_pool, tokens(10));
}
