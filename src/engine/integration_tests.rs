// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;

use crate::config::{Attributes, SchedulerConfig};
use crate::engine::{
    Decider, KillSwitches, Materializer, MaterializerSettings, Scheduler,
    SharedKillSwitch, StageContext, StageState, SupervisionDecision,
};
use crate::errors::{
    GraphBuildError, MaterializeError, SendError, StageFault, StageRuntimeError, TerminationError,
};
use crate::graph::{ElementType, Flow, GraphBuilder, Keep, Sink, Source, StageSpec};
use crate::stages::{AskSettings, OfferOutcome, OverflowPolicy};
use crate::traits::{FnResponder, Responder, StageLogic};

/// Integration tests running whole graphs on the current tokio runtime
#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("division by zero")]
    struct DivideByZero;

    fn materializer(buffer_size: usize) -> Materializer {
        let scheduler = Scheduler::from_current(&SchedulerConfig::default()).unwrap();
        Materializer::new(
            scheduler,
            MaterializerSettings {
                buffer_size,
                decider: Decider::stopping(),
            },
        )
    }

    fn reciprocals() -> Source<String> {
        Source::from_iter(vec![9, 8, 7, 6, 0, 5, 4, 3, 2, 1]).try_map(|n: i32| {
            if n == 0 {
                Err(DivideByZero)
            } else {
                Ok(format!("1/{}", n))
            }
        })
    }

    fn fault_of(error: &TerminationError) -> Option<&StageFault> {
        error.runtime_error().and_then(StageRuntimeError::fault)
    }

    // ---- graph validation ----

    #[tokio::test]
    async fn test_unrunnable_graph_starts_no_stage() {
        let mat = materializer(4);
        let mut builder = GraphBuilder::new();
        let (_inlet, _outlet, _) = builder.add_flow(Flow::<i32, i32>::map(|n| n + 1));
        let err = mat
            .materialize(&builder.build(), &Attributes::new())
            .unwrap_err();
        match err {
            MaterializeError::GraphNotRunnable(GraphBuildError::IncompleteGraph { unconnected }) => {
                assert_eq!(unconnected.len(), 2)
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(mat.scheduler().active_graphs().is_empty());
    }

    // ---- backpressure ----

    #[tokio::test]
    async fn test_fast_source_is_held_back_by_idle_consumer() {
        let mat = materializer(2);
        let (graph, mut stream) = Source::from_iter(0..100_000)
            .to_mat(Sink::stream(), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = graph.snapshot();
        let edge = &snapshot.edges[0];
        assert_eq!(edge.capacity, 2);
        assert!(edge.pushed <= 4, "source ran ahead: {:?}", edge);
        assert!(edge.high_water <= edge.capacity);

        assert!(matches!(stream.next().await, Some(Ok(0))));
        assert!(matches!(stream.next().await, Some(Ok(1))));
        drop(stream);
        graph.terminated().await;
    }

    struct Eager;

    #[async_trait]
    impl StageLogic for Eager {
        async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
            for n in 0..8u32 {
                ctx.push(0, n)?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_push_without_credit_is_a_protocol_violation() {
        let mat = materializer(1);
        let eager = Source::<u32>::from_spec(StageSpec::from_logic(
            "eager",
            Vec::new(),
            vec![ElementType::of::<u32>()],
            || Eager,
        ));
        let err = eager.run_with(Sink::seq(), &mat).unwrap().await.unwrap_err();
        assert!(matches!(fault_of(&err), Some(StageFault::ProtocolViolation { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queues_never_exceed_capacity_under_load() {
        let mat = materializer(3);
        let (graph, total) = Source::from_iter(0..20_000u64)
            .map(|n: u64| n * 2)
            .merge(Source::from_iter(0..20_000u64))
            .filter(|n: &u64| n % 3 == 0)
            .to_mat(Sink::fold(0u64, |acc: u64, n: u64| acc + n), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        let expected: u64 = (0..20_000u64)
            .map(|n| n * 2)
            .chain(0..20_000u64)
            .filter(|n| n % 3 == 0)
            .sum();
        assert_eq!(total.await.unwrap(), expected);
        graph.terminated().await;
        for edge in graph.snapshot().edges {
            assert!(edge.high_water <= edge.capacity, "{:?}", edge);
        }
    }

    // ---- junctions ----

    #[tokio::test]
    async fn test_zip_stops_at_shorter_input() {
        let mat = materializer(4);
        let (graph, pairs) = Source::from_iter(vec![1, 2, 3])
            .zip(Source::repeat("x"))
            .to_mat(Sink::seq(), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        assert_eq!(pairs.await.unwrap(), vec![(1, "x"), (2, "x"), (3, "x")]);
        graph.terminated().await;
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.stage("repeat").unwrap().state, StageState::Cancelled);
        assert_eq!(snapshot.stage("zip").unwrap().state, StageState::Completed);
    }

    #[tokio::test]
    async fn test_zip_stops_when_shorter_right_input_completes() {
        let mat = materializer(4);
        let (graph, pairs) = Source::repeat(0u8)
            .zip(Source::from_iter(vec!['a', 'b', 'c']))
            .to_mat(Sink::seq(), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        assert_eq!(pairs.await.unwrap(), vec![(0, 'a'), (0, 'b'), (0, 'c')]);
        graph.terminated().await;
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.stage("repeat").unwrap().state, StageState::Cancelled);
        assert_eq!(snapshot.stage("from_iter").unwrap().state, StageState::Completed);
        assert_eq!(snapshot.stage("zip").unwrap().state, StageState::Completed);
    }

    #[tokio::test]
    async fn test_merge_emits_every_input_element() {
        let mat = materializer(2);
        let merged = Source::from_iter(0..50)
            .merge(Source::from_iter(100..130))
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(merged.len(), 80);
        let low: Vec<i32> = merged.iter().copied().filter(|n| *n < 100).collect();
        let high: Vec<i32> = merged.iter().copied().filter(|n| *n >= 100).collect();
        assert_eq!(low, (0..50).collect::<Vec<_>>());
        assert_eq!(high, (100..130).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_merge_fails_on_first_failed_input() {
        let mat = materializer(2);
        let err = Source::repeat(1)
            .merge(Source::failed(StageRuntimeError::msg("left is down")))
            .run_with(Sink::ignore(), &mat)
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "left is down");
    }

    #[tokio::test]
    async fn test_broadcast_delivers_each_element_to_every_branch() {
        let mat = materializer(2);
        let (side, main) = Source::from_iter(0..100)
            .also_to_mat(Sink::seq(), Keep::right)
            .to_mat(Sink::seq(), Keep::both)
            .run(&mat)
            .unwrap();
        let expected: Vec<i32> = (0..100).collect();
        assert_eq!(main.await.unwrap(), expected);
        assert_eq!(side.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_broadcast_is_paced_by_slowest_branch() {
        let mat = materializer(2);
        let (graph, (idle, main)) = Source::from_iter(0..10_000)
            .also_to_mat(Sink::stream(), Keep::right)
            .to_mat(Sink::seq(), Keep::both)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let pushed = graph
            .snapshot()
            .edges
            .iter()
            .find(|e| e.label.starts_with("from_iter"))
            .map(|e| e.pushed)
            .unwrap();
        assert!(pushed <= 8, "upstream advanced past the idle branch: {}", pushed);

        // Once the idle branch goes away the remaining branch runs to completion.
        drop(idle);
        assert_eq!(main.await.unwrap().len(), 10_000);
    }

    // ---- supervision ----

    #[tokio::test]
    async fn test_resume_skips_only_the_failing_element() {
        let mat = materializer(4);
        let decider = Decider::new(|e: &StageRuntimeError| {
            if e.is::<DivideByZero>() {
                SupervisionDecision::Resume
            } else {
                SupervisionDecision::Stop
            }
        });
        let out = reciprocals()
            .with_attributes(Attributes::supervision(decider))
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(
            out,
            vec!["1/9", "1/8", "1/7", "1/6", "1/5", "1/4", "1/3", "1/2", "1/1"]
        );
    }

    #[tokio::test]
    async fn test_stop_fails_stream_after_prior_elements() {
        let mat = materializer(4);
        let mut stream = reciprocals().run_with(Sink::stream(), &mat).unwrap();
        let mut seen = Vec::new();
        let error = loop {
            match stream.next().await {
                Some(Ok(item)) => seen.push(item),
                Some(Err(error)) => break error,
                None => panic!("stream completed instead of failing"),
            }
        };
        assert_eq!(seen, vec!["1/9", "1/8", "1/7", "1/6"]);
        assert!(error.downcast_ref::<DivideByZero>().is_some());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_restart_resets_stage_state() {
        let mat = materializer(4);
        let totals = Source::from_iter(vec![1, 2, -1, 3, 4])
            .stateful_map(
                || 0,
                |total: &mut i32, n: i32| {
                    if n < 0 {
                        return Err(StageRuntimeError::msg("negative"));
                    }
                    *total += n;
                    Ok(*total)
                },
            )
            .with_attributes(Attributes::supervision(Decider::restarting()))
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(totals, vec![1, 3, 3, 7]);
    }

    #[tokio::test]
    async fn test_panicking_stage_fails_the_stream() {
        let mat = materializer(4);
        let err = Source::from_iter(1..=3)
            .map(|n: i32| {
                if n == 2 {
                    panic!("two");
                }
                n
            })
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    // ---- recovery ----

    #[tokio::test]
    async fn test_recover_without_fallback_completes_cleanly() {
        let mat = materializer(4);
        let out = reciprocals()
            .recover(|_| None)
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out, vec!["1/9", "1/8", "1/7", "1/6"]);
    }

    #[tokio::test]
    async fn test_recover_with_fallback_emits_one_element() {
        let mat = materializer(4);
        let out = reciprocals()
            .recover(|e| e.downcast_ref::<DivideByZero>().map(|_| "inf".to_string()))
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out, vec!["1/9", "1/8", "1/7", "1/6", "inf"]);
    }

    #[tokio::test]
    async fn test_recover_with_retries_splices_replacement() {
        let mat = materializer(4);
        let out = Source::<i32>::failed(StageRuntimeError::msg("primary down"))
            .recover_with_retries(1, |_| Some(Source::from_iter(vec![7, 8, 9])))
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_recover_with_retries_gives_up_after_max_attempts() {
        let mat = materializer(4);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut stream = Source::from_iter(1..=4)
            .try_map(|n: i32| {
                if n == 3 {
                    Err(StageRuntimeError::msg("three"))
                } else {
                    Ok(n)
                }
            })
            .recover_with_retries(2, move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Some(Source::failed(StageRuntimeError::msg("still down")))
            })
            .run_with(Sink::stream(), &mat)
            .unwrap();
        assert!(matches!(stream.next().await, Some(Ok(1))));
        assert!(matches!(stream.next().await, Some(Ok(2))));
        match stream.next().await {
            Some(Err(error)) => assert_eq!(error.to_string(), "still down"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    // ---- ask ----

    #[tokio::test]
    async fn test_ask_preserves_input_order() {
        let mat = materializer(4);
        let slow_first = FnResponder::new(|n: u64| async move {
            tokio::time::sleep(Duration::from_millis(5 * (10 - n))).await;
            Ok::<_, StageRuntimeError>(n * 10)
        });
        let out = Source::from_iter(1..=8u64)
            .ask(slow_first, AskSettings::new(4, Duration::from_secs(5)))
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out, vec![10, 20, 30, 40, 50, 60, 70, 80]);
    }

    struct StallsOnTwo;

    #[async_trait]
    impl Responder<i32, i32> for StallsOnTwo {
        async fn ask(&self, n: i32) -> Result<i32, StageRuntimeError> {
            if n == 2 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_ask_timeout_is_supervised() {
        let mat = materializer(4);
        let settings = AskSettings::new(1, Duration::from_millis(20));

        let err = Source::from_iter(1..=3)
            .ask(StallsOnTwo, settings)
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(fault_of(&err), Some(StageFault::AskTimeout { .. })));

        let out = Source::from_iter(1..=3)
            .ask(StallsOnTwo, settings)
            .with_attributes(Attributes::supervision(Decider::resuming()))
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out, vec![1, 3]);
    }

    // ---- cancellation ----

    #[tokio::test]
    async fn test_graceful_kill_switch_yields_exactly_observed_elements() {
        let mat = materializer(4);
        let ((endpoint, switch), mut stream) = Source::<u32, _>::queue(16, OverflowPolicy::DropNewest)
            .via_mat(KillSwitches::single(), Keep::both)
            .to_mat(Sink::stream(), Keep::both)
            .run(&mat)
            .unwrap();
        for n in 0..3 {
            endpoint.try_send(n).unwrap();
        }
        for n in 0..3 {
            assert!(matches!(stream.next().await, Some(Ok(v)) if v == n));
        }
        switch.shutdown();
        let _ = endpoint.try_send(99);
        assert!(stream.next().await.is_none());
        assert!(switch.is_cancelled());
    }

    #[tokio::test]
    async fn test_graceful_kill_switch_on_endless_source_yields_only_observed() {
        let mat = materializer(4);
        let (switch, mut stream) = Source::repeat(1u32)
            .via_mat(KillSwitches::single(), Keep::right)
            .to_mat(Sink::stream(), Keep::both)
            .run(&mat)
            .unwrap();
        for _ in 0..3 {
            assert!(matches!(stream.next().await, Some(Ok(1))));
        }
        // let the source run ahead if it can
        tokio::time::sleep(Duration::from_millis(20)).await;
        switch.shutdown();
        let rest = stream.collect_all().await.unwrap();
        assert!(rest.is_empty(), "{} elements after shutdown", rest.len());
        assert!(switch.is_cancelled());
    }

    #[tokio::test]
    async fn test_abrupt_kill_switch_fails_downstream() {
        let mat = materializer(4);
        let (switch, done) = Source::repeat(1)
            .via_mat(KillSwitches::single(), Keep::right)
            .to_mat(Sink::ignore(), Keep::both)
            .run(&mat)
            .unwrap();
        tokio::task::yield_now().await;
        switch.abort(StageRuntimeError::new(DivideByZero));
        let err = done.await.unwrap_err();
        assert!(err.downcast_ref::<DivideByZero>().is_some());

        let (switch, done) = Source::repeat(1)
            .via_mat(KillSwitches::single(), Keep::right)
            .to_mat(Sink::ignore(), Keep::both)
            .run(&mat)
            .unwrap();
        switch.cancel(false);
        assert!(done.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_shared_kill_switch_stops_every_graph() {
        let mat = materializer(4);
        let switch = SharedKillSwitch::new("fleet");
        let first = Source::repeat(1u8)
            .via(switch.flow())
            .run_with(Sink::ignore(), &mat)
            .unwrap();
        let second = Source::repeat(2u8)
            .via(switch.flow())
            .run_with(Sink::ignore(), &mat)
            .unwrap();
        tokio::task::yield_now().await;
        switch.shutdown();
        first.await.unwrap();
        second.await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_kill_switch_attached_after_trigger() {
        let mat = materializer(4);
        let switch = SharedKillSwitch::new("late");
        switch.cancel(true);
        let out = Source::repeat(1)
            .via(switch.flow())
            .run_with(Sink::seq(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_abort_resolves_sinks_to_cancelled() {
        let mat = materializer(4);
        let (graph, done) = Source::repeat(1)
            .to_mat(Sink::ignore(), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        tokio::task::yield_now().await;
        graph.abort();
        assert!(done.await.unwrap_err().is_cancelled());
        graph.terminated().await;
        assert!(graph
            .snapshot()
            .stages
            .iter()
            .all(|s| s.state == StageState::Cancelled));
    }

    #[tokio::test]
    async fn test_scheduler_shutdown_cancels_live_graphs() {
        let mat = materializer(4);
        let done = Source::repeat(1)
            .run_with(Sink::ignore(), &mat)
            .unwrap();
        tokio::task::yield_now().await;
        mat.scheduler().shutdown();
        assert!(done.await.unwrap_err().is_cancelled());
        assert!(matches!(
            Source::single(1).run_with(Sink::ignore(), &mat),
            Err(MaterializeError::SchedulerShutdown)
        ));
    }

    #[tokio::test]
    async fn test_take_cancels_upstream() {
        let mat = materializer(4);
        let (graph, out) = Source::repeat(5)
            .take(3)
            .to_mat(Sink::seq(), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        assert_eq!(out.await.unwrap(), vec![5, 5, 5]);
        graph.terminated().await;
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.stage("repeat").unwrap().state, StageState::Cancelled);
        assert_eq!(snapshot.stage("take").unwrap().state, StageState::Completed);
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_upstream() {
        let mat = materializer(2);
        let (graph, mut stream) = Source::repeat(7)
            .named("sevens")
            .to_mat(Sink::stream(), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        assert!(matches!(stream.next().await, Some(Ok(7))));
        drop(stream);
        graph.terminated().await;
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.stage("sevens").unwrap().state, StageState::Cancelled);
        assert_eq!(snapshot.stage("stream").unwrap().state, StageState::Cancelled);
    }

    #[tokio::test]
    async fn test_dropping_stream_reaches_idle_injection_source() {
        let mat = materializer(4);
        let (graph, (endpoint, mut stream)) =
            Source::<i32, _>::queue(8, OverflowPolicy::DropNewest)
                .map(|n: i32| n + 1)
                .to_mat(Sink::stream(), Keep::both)
                .materialize(&mat, &Attributes::new())
                .unwrap();
        endpoint.try_send(1).unwrap();
        assert!(matches!(stream.next().await, Some(Ok(2))));
        drop(stream);
        tokio::time::timeout(Duration::from_secs(2), graph.terminated())
            .await
            .expect("graph kept running after the consumer left");
        assert!(endpoint.is_closed());
        let snapshot = graph.snapshot();
        for name in ["queue", "map", "stream"] {
            assert_eq!(snapshot.stage(name).unwrap().state, StageState::Cancelled, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_cancel_passes_stage_waiting_on_idle_upstream() {
        let mat = materializer(4);
        let (graph, (endpoint, first)) = Source::<i32, _>::queue(8, OverflowPolicy::DropNewest)
            .map(|n: i32| n * 10)
            .to_mat(Sink::head(), Keep::both)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        endpoint.try_send(4).unwrap();
        assert_eq!(first.await.unwrap(), Some(40));
        tokio::time::timeout(Duration::from_secs(2), graph.terminated())
            .await
            .expect("cancel stopped at the idle map stage");
        assert!(endpoint.is_closed());
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.stage("map").unwrap().state, StageState::Cancelled);
        assert_eq!(snapshot.stage("queue").unwrap().state, StageState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_passes_merge_waiting_on_idle_inputs() {
        let mat = materializer(4);
        let (graph, (endpoint, out)) = Source::<i32, _>::queue(8, OverflowPolicy::DropNewest)
            .merge(Source::<i32, _>::queue(8, OverflowPolicy::DropNewest))
            .take(1)
            .to_mat(Sink::seq(), Keep::both)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        endpoint.try_send(5).unwrap();
        assert_eq!(out.await.unwrap(), vec![5]);
        tokio::time::timeout(Duration::from_secs(2), graph.terminated())
            .await
            .expect("cancel stopped at the idle merge stage");
        assert!(endpoint.is_closed());
        assert_eq!(graph.snapshot().stage("merge").unwrap().state, StageState::Cancelled);
    }

    #[tokio::test]
    async fn test_element_stream_is_a_futures_stream() {
        let mat = materializer(2);
        let stream = Source::from_iter(vec!["a", "b"])
            .run_with(Sink::stream(), &mat)
            .unwrap();
        let items: Vec<&str> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(items, vec!["a", "b"]);
    }

    // ---- injection ----

    #[tokio::test]
    async fn test_close_after_k_sends_yields_exactly_k() {
        let mat = materializer(2);
        let (endpoint, out) = Source::<usize, _>::queue(8, OverflowPolicy::DropNewest)
            .to_mat(Sink::seq(), Keep::both)
            .run(&mat)
            .unwrap();
        for n in 0..5 {
            assert_eq!(endpoint.try_send(n), Ok(OfferOutcome::Enqueued));
        }
        endpoint.close();
        assert_eq!(endpoint.try_send(5), Err(SendError::Closed));
        assert_eq!(out.await.unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_overflow_policies() {
        let mat = materializer(2);

        let (endpoint, out) = Source::<u8, _>::queue(2, OverflowPolicy::DropOldest)
            .to_mat(Sink::seq(), Keep::both)
            .run(&mat)
            .unwrap();
        endpoint.try_send(1).unwrap();
        endpoint.try_send(2).unwrap();
        assert_eq!(endpoint.try_send(3), Ok(OfferOutcome::DroppedOldest));
        endpoint.close();
        assert_eq!(out.await.unwrap(), vec![2, 3]);

        let (endpoint, out) = Source::<u8, _>::queue(2, OverflowPolicy::Fail)
            .to_mat(Sink::seq(), Keep::both)
            .run(&mat)
            .unwrap();
        endpoint.try_send(1).unwrap();
        endpoint.try_send(2).unwrap();
        assert_eq!(endpoint.try_send(3), Err(SendError::Overflow { capacity: 2 }));
        let err = out.await.unwrap_err();
        assert!(matches!(fault_of(&err), Some(StageFault::BufferOverflow { capacity: 2 })));

        let (endpoint, out) = Source::<u8, _>::queue(1, OverflowPolicy::Block)
            .to_mat(Sink::seq(), Keep::both)
            .run(&mat)
            .unwrap();
        endpoint.try_send(1).unwrap();
        assert_eq!(endpoint.try_send(2), Err(SendError::Full));
        assert_eq!(endpoint.send(2).await, Ok(OfferOutcome::Enqueued));
        endpoint.close();
        assert_eq!(out.await.unwrap(), vec![1, 2]);
    }

    // ---- snapshots ----

    #[tokio::test]
    async fn test_snapshot_serializes_stage_states() {
        let mat = materializer(4);
        let (graph, done) = Source::from_iter(1..=10)
            .named("numbers")
            .to_mat(Sink::ignore().named("drain"), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        done.await.unwrap();
        graph.terminated().await;
        let json = serde_json::to_value(graph.snapshot()).unwrap();
        assert_eq!(json["terminated"], true);
        assert_eq!(json["stages"][0]["name"], "numbers");
        assert_eq!(json["stages"][0]["state"], "completed");
        assert_eq!(json["edges"][0]["label"], "numbers.out(0)->drain.in(0)");
        assert_eq!(json["edges"][0]["pushed"], 10);
    }

    #[tokio::test]
    async fn test_head_takes_first_element_and_cancels_upstream() {
        let mat = materializer(1);
        let (graph, first) = Source::repeat(0)
            .to_mat(Sink::head(), Keep::right)
            .materialize(&mat, &Attributes::new())
            .unwrap();
        assert_eq!(first.await.unwrap(), Some(0));
        graph.terminated().await;
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.stage("repeat").unwrap().state, StageState::Cancelled);
        assert_eq!(snapshot.stage("head").unwrap().state, StageState::Completed);

        let none = Source::<u8>::empty()
            .run_with(Sink::head(), &mat)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(none, None);
    }
}
