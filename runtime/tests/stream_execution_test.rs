//! Integration tests for `Effect::Stream` and `Effect::Cancellable` execution
//!
//! Streams model polling loops: they yield progress actions and finally a
//! result. Cancellation must stop the stream and suppress anything it still
//! yields.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use futures::stream;
use gatecheck_core::{CancelToken, SmallVec, effect::Effect, reducer::Reducer, smallvec};
use gatecheck_runtime::Store;
use std::time::Duration;

#[derive(Clone, Debug, Default)]
struct PollState {
    ticks: Vec<u32>,
    found: Option<String>,
    token: Option<CancelToken>,
}

#[derive(Clone, Debug, PartialEq)]
enum PollAction {
    Start { ticks_before_hit: u32 },
    Tick { n: u32 },
    Found { code: String },
    Stop,
    Replay { items: Vec<u32> },
}

#[derive(Clone)]
struct PollReducer;

impl Reducer for PollReducer {
    type State = PollState;
    type Action = PollAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            PollAction::Start { ticks_before_hit } => {
                let token = CancelToken::new();
                state.token = Some(token.clone());
                let polling = stream::unfold(0, move |n| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    match n.cmp(&ticks_before_hit) {
                        std::cmp::Ordering::Less => Some((PollAction::Tick { n }, n + 1)),
                        std::cmp::Ordering::Equal => Some((
                            PollAction::Found {
                                code: "TKT-1".to_string(),
                            },
                            n + 1,
                        )),
                        std::cmp::Ordering::Greater => None,
                    }
                });
                smallvec![Effect::Stream(Box::pin(polling)).cancellable(token)]
            },
            PollAction::Tick { n } => {
                state.ticks.push(n);
                smallvec![Effect::None]
            },
            PollAction::Found { code } => {
                state.found = Some(code);
                if let Some(token) = state.token.take() {
                    token.cancel();
                }
                smallvec![Effect::None]
            },
            PollAction::Stop => {
                if let Some(token) = state.token.take() {
                    token.cancel();
                }
                smallvec![Effect::None]
            },
            PollAction::Replay { items } => {
                smallvec![Effect::Stream(Box::pin(stream::iter(
                    items.into_iter().map(|n| PollAction::Tick { n })
                )))]
            },
        }
    }
}

#[tokio::test]
async fn test_stream_items_arrive_in_order() {
    let store = Store::new(PollState::default(), PollReducer, ());

    let mut handle = store
        .send(PollAction::Replay {
            items: vec![3, 1, 2],
        })
        .await
        .unwrap();
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

    let ticks = store.state(|s| s.ticks.clone()).await;
    assert_eq!(ticks, vec![3, 1, 2]);
}

#[tokio::test]
async fn test_empty_stream_completes() {
    let store = Store::new(PollState::default(), PollReducer, ());

    let mut handle = store.send(PollAction::Replay { items: vec![] }).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

    assert!(store.state(|s| s.ticks.is_empty()).await);
}

#[tokio::test]
async fn test_poll_loop_reports_progress_then_result() {
    let store = Store::new(PollState::default(), PollReducer, ());

    let found = store
        .send_and_wait_for(
            PollAction::Start {
                ticks_before_hit: 3,
            },
            |a| matches!(a, PollAction::Found { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(
        found,
        PollAction::Found {
            code: "TKT-1".to_string()
        }
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    let (ticks, code) = store.state(|s| (s.ticks.clone(), s.found.clone())).await;
    assert_eq!(ticks, vec![0, 1, 2]);
    assert_eq!(code.as_deref(), Some("TKT-1"));
}

#[tokio::test]
async fn test_stop_cancels_poll_loop() {
    let store = Store::new(PollState::default(), PollReducer, ());

    let mut handle = store
        .send(PollAction::Start {
            ticks_before_hit: 1_000,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    store.send(PollAction::Stop).await.unwrap();

    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
    let after_stop = store.state(|s| s.ticks.len()).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.state(|s| s.ticks.len()).await, after_stop);
    assert!(store.state(|s| s.found.is_none()).await);
    assert_eq!(store.pending_effects(), 0);
}
