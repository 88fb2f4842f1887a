#![allow(non_snake_case)]
use alloy_primitives::U256;
use lottery_client::{
    LotteryError,
    test_helpers::{
        FakeWallet,
        lottery_address,
        player_account,
        session,
        tokens,
    },
};

#[tokio::test]
async fn buy_tickets__unapproved_signer__approves_then_enters() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    assert!(!store.snapshot().token_transaction_approved());

    // when
    orchestrator.buy_tickets(3).await.unwrap();

    // then
    assert_eq!(wallet.transactions(), vec!["approve", "enter"]);
    {
        let chain = wallet.chain();
        assert_eq!(chain.allowance(player_account(), lottery_address()), U256::MAX);
        assert_eq!(chain.price_pool, tokens(15));
        assert_eq!(chain.balance(player_account()), tokens(85));
        assert_eq!(chain.entries, vec![(player_account(), 3)]);
    }
    let snapshot = store.snapshot();
    assert!(!snapshot.busy);
    assert!(snapshot.load_message.is_empty());
    assert!(snapshot.token_transaction_approved());
    assert_eq!(snapshot.price_pool.unwrap().to_string(), "15");
    assert_eq!(snapshot.signer().unwrap().balance.unwrap().to_string(), "85");
    assert_eq!(store.notices().status, "Bought 3 ticket(s)");
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn buy_tickets__approval_rejected__enter_never_sent() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    wallet
        .chain()
        .rejected_transactions
        .insert("approve".to_string());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    let result = orchestrator.buy_tickets(2).await;

    // then
    let err = result.unwrap_err();
    assert!(matches!(err, LotteryError::Allowance(_)), "{err:?}");
    assert_eq!(wallet.transactions(), vec!["approve"]);
    assert!(wallet.chain().entries.is_empty());
    assert!(!store.snapshot().busy);
    assert!(!store.notices().errors.is_empty());
}

#[tokio::test]
async fn buy_tickets__existing_allowance__skips_approval() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    wallet
        .chain()
        .allowances
        .insert((player_account(), lottery_address()), U256::MAX);
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    orchestrator.buy_tickets(1).await.unwrap();

    // then
    assert_eq!(wallet.transactions(), vec!["enter"]);
    assert_eq!(wallet.chain().price_pool, tokens(5));
}

#[tokio::test]
async fn buy_tickets__allowance_for_fewer_tickets__approves_again() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    wallet
        .chain()
        .allowances
        .insert((player_account(), lottery_address()), tokens(5));
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    assert!(store.snapshot().token_transaction_approved());

    // when
    orchestrator.buy_tickets(2).await.unwrap();

    // then
    assert_eq!(wallet.transactions(), vec!["approve", "enter"]);
    assert_eq!(wallet.chain().price_pool, tokens(10));
}

#[tokio::test]
async fn buy_tickets__zero_count__validation_without_calls() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    wallet.clear_calls();

    // when
    let result = orchestrator.buy_tickets(0).await;

    // then
    assert!(matches!(result, Err(LotteryError::Validation(_))));
    assert!(wallet.calls().is_empty());
    assert_eq!(store.notices().errors.len(), 1);
    assert!(!store.snapshot().busy);
}

#[tokio::test]
async fn buy_tickets__disconnected__no_signer_without_calls() {
    // given
    let wallet = FakeWallet::default();
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;
    wallet.clear_calls();

    // when
    let result = orchestrator.buy_tickets(1).await;

    // then
    assert!(matches!(result, Err(LotteryError::NoSigner)));
    assert!(wallet.calls().is_empty());
}

#[tokio::test]
async fn buy_tickets__insufficient_balance__reverts_and_clears_busy() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    {
        let mut chain = wallet.chain();
        chain
            .allowances
            .insert((player_account(), lottery_address()), U256::MAX);
        chain.balances.insert(player_account(), tokens(1));
    }
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    let result = orchestrator.buy_tickets(1).await;

    // then
    let err = result.unwrap_err();
    assert!(matches!(err, LotteryError::Transaction(_)), "{err:?}");
    assert!(err.to_string().contains("reverted"), "{err}");
    assert!(wallet.chain().entries.is_empty());
    let snapshot = store.snapshot();
    assert!(!snapshot.busy);
    assert_eq!(snapshot.price_pool.unwrap().to_string(), "0");
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn buy_tickets__receipt_arrives_late__still_confirms() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    {
        let mut chain = wallet.chain();
        chain
            .allowances
            .insert((player_account(), lottery_address()), U256::MAX);
        chain.receipt_delay_polls = 3;
    }
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    orchestrator.buy_tickets(1).await.unwrap();

    // then
    assert_eq!(wallet.chain().entries, vec![(player_account(), 1)]);
    assert_eq!(store.notices().status, "Bought 1 ticket(s)");
}

#[tokio::test]
async fn ensure_approval__called_twice__approves_once() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    let first = orchestrator.ensure_approval(tokens(5)).await.unwrap();
    let second = orchestrator.ensure_approval(tokens(5)).await.unwrap();

    // then
    assert!(first);
    assert!(!second);
    assert_eq!(wallet.transactions(), vec!["approve"]);
    assert_eq!(store.notices().status, "Allowance already sufficient");
}

#[tokio::test]
async fn ensure_approval__already_approved__no_writes() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    wallet
        .chain()
        .allowances
        .insert((player_account(), lottery_address()), tokens(50));
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    let submitted = orchestrator.ensure_approval(tokens(5)).await.unwrap();

    // then
    assert!(!submitted);
    assert!(wallet.transactions().is_empty());
}

#[tokio::test]
async fn approve__unapproved_signer__snapshot_turns_approved() {
    // given
    let wallet = FakeWallet::connected_as(player_account());
    let (store, orchestrator) = session(&wallet);
    store.refresh().await;

    // when
    let submitted = orchestrator.approve().await.unwrap();

    // then
    assert!(submitted);
    assert_eq!(wallet.transactions(), vec!["approve"]);
    assert!(store.snapshot().token_transaction_approved());
    assert_eq!(store.notices().status, "Token spending approved");
}
