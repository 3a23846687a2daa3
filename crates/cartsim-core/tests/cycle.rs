use cartsim_core::{
    Catalog, FinishedSpan, FixedPolicy, MemorySink, Outcome, RandomPolicy, SimulationEngine,
    SinkSet, SpanSink, SpanStatus, Timestamp,
};
use std::collections::HashSet;
use std::sync::Arc;

fn sinks(n: usize) -> (SinkSet, Vec<Arc<MemorySink>>) {
    let memory: Vec<Arc<MemorySink>> = (0..n)
        .map(|i| Arc::new(MemorySink::new(format!("memory-{i}"))))
        .collect();
    let set = SinkSet::new(
        memory
            .iter()
            .map(|s| s.clone() as Arc<dyn SpanSink>)
            .collect(),
    );
    (set, memory)
}

fn split_root(spans: &[Arc<FinishedSpan>]) -> (Arc<FinishedSpan>, Vec<Arc<FinishedSpan>>) {
    let root = spans
        .iter()
        .find(|s| s.is_root())
        .cloned()
        .expect("cycle must export a root span");
    let children = spans.iter().filter(|s| !s.is_root()).cloned().collect();
    (root, children)
}

#[tokio::test(start_paused = true)]
async fn test_cycle_builds_one_root_and_six_children() {
    let (set, memory) = sinks(2);
    let engine = SimulationEngine::new(set).with_policy(Arc::new(RandomPolicy::seeded(11)));

    let handle = engine.run_cycle();
    let root_id = handle.root_span_id;
    let trace_id = handle.trace_id;
    let report = handle.join().await;
    assert_eq!(report.completed, 6);
    assert!(report.failed.is_empty());

    for sink in &memory {
        let spans = sink.spans();
        assert_eq!(spans.len(), 7, "sink {} missed spans", sink.name());

        // Exactly once per sink
        let ids: HashSet<_> = spans.iter().map(|s| s.span_id).collect();
        assert_eq!(ids.len(), 7);

        let (root, children) = split_root(&spans);
        assert_eq!(root.span_id, root_id);
        assert_eq!(root.name, "Shopping Cart");
        assert_eq!(root.status, SpanStatus::Ok);
        assert!(root.events.is_empty());

        for child in &children {
            assert_eq!(child.parent_span_id, Some(root_id));
            assert_eq!(child.trace_id, trace_id);
            assert!(child.start_time >= root.start_time);
            assert_ne!(child.status, SpanStatus::Unset);
        }

        let names: HashSet<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), 6);
        assert!(names.contains("VALIDATE CREDIT CARD EXTERNAL SERVICE"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_child_events_are_start_then_finish() {
    let (set, memory) = sinks(1);
    let engine = SimulationEngine::new(set).with_policy(Arc::new(RandomPolicy::seeded(3)));

    engine.run_cycle().join().await;

    let (_, children) = split_root(&memory[0].spans());
    for child in children {
        assert_eq!(child.events.len(), 2);
        assert_eq!(child.events[0].message, format!("Starting work on {}", child.name));
        assert_eq!(child.events[1].message, format!("Finishing work on {}", child.name));

        let t_start = child.events[0].timestamp;
        let t_finish = child.events[1].timestamp;
        assert!(t_start <= t_finish);
        assert!(t_finish <= child.end_time);
    }
}

#[tokio::test(start_paused = true)]
async fn test_root_ends_before_children() {
    let (set, memory) = sinks(1);
    let engine =
        SimulationEngine::new(set).with_policy(Arc::new(FixedPolicy::full_duration(Outcome::Ok)));

    let handle = engine.run_cycle();
    let returned_at = Timestamp::now();

    // Only the root is out while the children sleep
    assert_eq!(memory[0].len(), 1);
    handle.join().await;

    let (root, children) = split_root(&memory[0].spans());
    assert!(root.end_time <= returned_at);
    for child in children {
        assert!(root.end_time < child.end_time, "{} ended with its root", child.name);
    }
}

#[tokio::test(start_paused = true)]
async fn test_root_end_never_after_children_with_random_durations() {
    let (set, memory) = sinks(1);
    let engine = SimulationEngine::new(set).with_policy(Arc::new(RandomPolicy::seeded(5)));

    for _ in 0..20 {
        engine.run_cycle().join().await;
    }

    let spans = memory[0].spans();
    assert_eq!(spans.len(), 20 * 7);

    let roots: Vec<_> = spans.iter().filter(|s| s.is_root()).collect();
    for child in spans.iter().filter(|s| !s.is_root()) {
        let root = roots
            .iter()
            .find(|r| Some(r.span_id) == child.parent_span_id)
            .expect("child without root");
        assert!(root.end_time <= child.end_time);
    }
}

#[tokio::test(start_paused = true)]
async fn test_credit_card_validation_fails_about_ninety_percent() {
    let (set, memory) = sinks(1);
    let engine = SimulationEngine::new(set).with_policy(Arc::new(RandomPolicy::seeded(2024)));

    for _ in 0..1000 {
        engine.run_cycle_for(&[2]).join().await;
    }

    let children: Vec<_> = memory[0]
        .spans()
        .into_iter()
        .filter(|s| !s.is_root())
        .collect();
    assert_eq!(children.len(), 1000);

    let errors = children
        .iter()
        .filter(|s| s.status == SpanStatus::Error)
        .count();
    let rate = errors as f64 / children.len() as f64;
    assert!((0.85..=0.95).contains(&rate), "error rate {rate}");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_operation_does_not_abort_cycle() {
    let (set, memory) = sinks(1);
    let engine = SimulationEngine::new(set).with_policy(Arc::new(RandomPolicy::seeded(9)));

    let handle = engine.run_cycle_for(&[0, 1, 2, 3, 4, 99]);
    assert_eq!(handle.skipped, vec![99]);

    let report = handle.join().await;
    assert_eq!(report.completed, 5);

    let (root, children) = split_root(&memory[0].spans());
    assert_eq!(root.status, SpanStatus::Ok);
    assert_eq!(children.len(), 5);
    assert_eq!(engine.stats().operations_skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_cycles_complete_independently() {
    let (set, memory) = sinks(1);
    let engine = SimulationEngine::new(set).with_policy(Arc::new(RandomPolicy::seeded(1)));

    let handles: Vec<_> = (0..3).map(|_| engine.run_cycle()).collect();
    let traces: HashSet<_> = handles.iter().map(|h| h.trace_id).collect();
    assert_eq!(traces.len(), 3);

    // All three roots are out before any child
    assert_eq!(memory[0].len(), 3);

    for handle in handles {
        assert_eq!(handle.join().await.completed, 6);
    }

    let spans = memory[0].spans();
    assert_eq!(spans.len(), 21);
    for trace in traces {
        assert_eq!(spans.iter().filter(|s| s.trace_id == trace).count(), 7);
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_catalog_finishes_instantly() {
    let (set, memory) = sinks(1);
    let catalog = Arc::new(Catalog::shopping_cart().with_typical_duration_ms(0));
    let engine = SimulationEngine::new(set)
        .with_catalog(catalog)
        .with_policy(Arc::new(RandomPolicy::seeded(4)));

    engine.run_cycle().join().await;

    let (root, children) = split_root(&memory[0].spans());
    for child in children {
        assert_eq!(child.duration(), std::time::Duration::ZERO);
        assert!(child.end_time >= root.end_time);
    }
}

#[tokio::test(start_paused = true)]
async fn test_huge_typical_duration_still_launches() {
    let (set, memory) = sinks(1);
    let catalog = Arc::new(Catalog::shopping_cart().with_typical_duration_ms(u64::MAX / 100));
    let engine = SimulationEngine::new(set)
        .with_catalog(catalog)
        .with_policy(Arc::new(RandomPolicy::seeded(8)));

    // Children sleep effectively forever; only the launch is checked
    let handle = engine.run_cycle();
    assert_eq!(handle.launched(), 6);
    assert!(handle.skipped.is_empty());

    let spans = memory[0].spans();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].is_root());
    assert_eq!(engine.stats().in_flight(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cycles_deliver_each_span_once_per_sink() {
    const CYCLES: usize = 10;

    let (set, memory) = sinks(2);
    let catalog = Arc::new(Catalog::shopping_cart().with_typical_duration_ms(5));
    let engine = SimulationEngine::new(set)
        .with_catalog(catalog)
        .with_policy(Arc::new(RandomPolicy::new()));

    let launchers: Vec<_> = (0..CYCLES)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_cycle().join().await })
        })
        .collect();
    for launcher in launchers {
        let report = launcher.await.unwrap();
        assert_eq!(report.completed, 6);
    }

    for sink in &memory {
        let spans = sink.spans();
        assert_eq!(spans.len(), CYCLES * 7, "sink {}", sink.name());

        let ids: HashSet<_> = spans.iter().map(|s| s.span_id).collect();
        assert_eq!(ids.len(), CYCLES * 7, "sink {} saw a span twice", sink.name());

        let traces: HashSet<_> = spans.iter().map(|s| s.trace_id).collect();
        assert_eq!(traces.len(), CYCLES);
        for trace in traces {
            assert_eq!(spans.iter().filter(|s| s.trace_id == trace).count(), 7);
        }
    }
}
