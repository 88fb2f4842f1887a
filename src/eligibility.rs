//! Pure role and timing checks over a snapshot. Every time-dependent check takes `now`
//! explicitly.

use crate::snapshot::{
    StateSnapshot,
    UnixMillis,
};
use std::fmt;

pub const DRAW_COOLDOWN_SECS: u64 = 300;
const DRAW_COOLDOWN_MILLIS: i64 = DRAW_COOLDOWN_SECS as i64 * 1000;

pub fn is_owner(snapshot: &StateSnapshot) -> bool {
    match (snapshot.signer_address(), snapshot.owner) {
        (Some(signer), Some(owner)) => signer == owner,
        _ => false,
    }
}

/// The owner counts as a manager.
pub fn is_manager(snapshot: &StateSnapshot) -> bool {
    let Some(signer) = snapshot.signer_address() else {
        return false;
    };
    [snapshot.owner, snapshot.manager1, snapshot.manager2]
        .into_iter()
        .flatten()
        .any(|address| address == signer)
}

/// Seconds left in the cooldown, rounded up. `None` while the last draw time is unknown.
pub fn seconds_until_draw(snapshot: &StateSnapshot, now: UnixMillis) -> Option<u64> {
    let last_draw = snapshot.last_draw_time?;
    let elapsed = now.saturating_sub(last_draw);
    let remaining = DRAW_COOLDOWN_MILLIS.saturating_sub(elapsed);
    if remaining <= 0 {
        return Some(0);
    }
    Some((remaining as u64).div_ceil(1000))
}

pub fn can_draw_now(snapshot: &StateSnapshot, now: UnixMillis) -> bool {
    seconds_until_draw(snapshot, now) == Some(0)
}

pub fn can_buy(snapshot: &StateSnapshot) -> bool {
    snapshot.connected() && snapshot.token_transaction_approved()
}

pub fn pool_is_drawable(snapshot: &StateSnapshot) -> bool {
    snapshot
        .price_pool
        .is_some_and(|pool| pool.at_least_one_token())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawBlocker {
    NotManager,
    Cooldown { seconds_left: u64 },
    LastDrawUnknown,
    PoolTooSmall,
}

impl fmt::Display for DrawBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawBlocker::NotManager => write!(f, "only the owner or a manager can draw"),
            DrawBlocker::Cooldown { seconds_left } => {
                write!(f, "next draw possible in {seconds_left}s")
            }
            DrawBlocker::LastDrawUnknown => write!(f, "last draw time is not known yet"),
            DrawBlocker::PoolTooSmall => write!(f, "price pool needs at least one token"),
        }
    }
}

/// First reason a draw would be refused, or `None` when it may go ahead.
pub fn draw_blocker(snapshot: &StateSnapshot, now: UnixMillis) -> Option<DrawBlocker> {
    if !is_manager(snapshot) {
        return Some(DrawBlocker::NotManager);
    }
    match seconds_until_draw(snapshot, now) {
        None => return Some(DrawBlocker::LastDrawUnknown),
        Some(0) => {}
        Some(seconds_left) => return Some(DrawBlocker::Cooldown { seconds_left }),
    }
    if !pool_is_drawable(snapshot) {
        return Some(DrawBlocker::PoolTooSmall);
    }
    None
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        amounts::TokenAmount,
        snapshot::{
            Identity,
            SignerState,
        },
    };
    use alloy_primitives::{
        Address,
        U256,
    };
    use proptest::prelude::*;

    const NOW: UnixMillis = 1_700_000_000_000;

    fn owner() -> Address {
        Address::with_last_byte(1)
    }

    fn manager() -> Address {
        Address::with_last_byte(2)
    }

    fn stranger() -> Address {
        Address::with_last_byte(9)
    }

    fn snapshot_for(signer: Option<Address>) -> StateSnapshot {
        StateSnapshot {
            owner: Some(owner()),
            manager1: Some(manager()),
            manager2: None,
            ticket_price: Some(TokenAmount::whole(5, 18)),
            price_pool: Some(TokenAmount::whole(10, 18)),
            last_draw_time: Some(NOW - 400_000),
            identity: match signer {
                Some(address) => Identity::Connected(SignerState {
                    address,
                    approved: true,
                    allowance: None,
                    balance: None,
                    provisional: false,
                }),
                None => Identity::Disconnected,
            },
            ..StateSnapshot::default()
        }
    }

    #[test]
    fn roles__disconnected_viewer_has_none() {
        let snapshot = snapshot_for(None);

        assert!(!is_owner(&snapshot));
        assert!(!is_manager(&snapshot));
        assert!(!can_buy(&snapshot));
        assert_eq!(draw_blocker(&snapshot, NOW), Some(DrawBlocker::NotManager));
    }

    #[test]
    fn roles__owner_is_also_manager() {
        let snapshot = snapshot_for(Some(owner()));

        assert!(is_owner(&snapshot));
        assert!(is_manager(&snapshot));
    }

    #[test]
    fn roles__manager_is_not_owner() {
        let snapshot = snapshot_for(Some(manager()));

        assert!(!is_owner(&snapshot));
        assert!(is_manager(&snapshot));
    }

    #[test]
    fn roles__stranger_is_neither() {
        let snapshot = snapshot_for(Some(stranger()));

        assert!(!is_owner(&snapshot));
        assert!(!is_manager(&snapshot));
    }

    #[test]
    fn can_buy__requires_approval() {
        let mut snapshot = snapshot_for(Some(stranger()));
        if let Identity::Connected(signer) = &mut snapshot.identity {
            signer.approved = false;
        }

        assert!(!can_buy(&snapshot));
    }

    #[test]
    fn seconds_until_draw__rounds_up() {
        // given
        let mut snapshot = snapshot_for(Some(manager()));
        snapshot.last_draw_time = Some(NOW - 200_000 - 1);

        // when
        let left = seconds_until_draw(&snapshot, NOW);

        // then
        assert_eq!(left, Some(100));
    }

    #[test]
    fn seconds_until_draw__unknown_last_draw() {
        let mut snapshot = snapshot_for(Some(manager()));
        snapshot.last_draw_time = None;

        assert_eq!(seconds_until_draw(&snapshot, NOW), None);
        assert!(!can_draw_now(&snapshot, NOW));
        assert_eq!(
            draw_blocker(&snapshot, NOW),
            Some(DrawBlocker::LastDrawUnknown)
        );
    }

    #[test]
    fn draw_blocker__manager_recent_draw_empty_pool__unavailable() {
        // given
        let mut snapshot = snapshot_for(Some(manager()));
        snapshot.last_draw_time = Some(NOW - 200_000);
        snapshot.price_pool = Some(TokenAmount::new(U256::ZERO, 18));

        // when
        let blocker = draw_blocker(&snapshot, NOW);

        // then
        assert!(!can_draw_now(&snapshot, NOW));
        assert!(!pool_is_drawable(&snapshot));
        assert_eq!(blocker, Some(DrawBlocker::Cooldown { seconds_left: 100 }));
    }

    #[test]
    fn draw_blocker__elapsed_cooldown_with_small_pool() {
        let mut snapshot = snapshot_for(Some(manager()));
        snapshot.price_pool = Some(TokenAmount::new(U256::from(1u8), 18));

        assert_eq!(draw_blocker(&snapshot, NOW), Some(DrawBlocker::PoolTooSmall));
    }

    #[test]
    fn draw_blocker__everything_ready() {
        let snapshot = snapshot_for(Some(manager()));

        assert_eq!(draw_blocker(&snapshot, NOW), None);
    }

    proptest! {
        #[test]
        fn can_draw_now__is_monotonic_in_time(
            last_draw in 0i64..2_000_000_000_000,
            offset in -1_000_000i64..1_000_000,
            step in 0i64..1_000_000,
        ) {
            let mut snapshot = snapshot_for(Some(manager()));
            snapshot.last_draw_time = Some(last_draw);
            let earlier = last_draw + offset;
            let later = earlier + step;

            if can_draw_now(&snapshot, earlier) {
                prop_assert!(can_draw_now(&snapshot, later));
            }
            let before = seconds_until_draw(&snapshot, earlier).unwrap();
            let after = seconds_until_draw(&snapshot, later).unwrap();
            prop_assert!(after <= before);
        }
    }
}
