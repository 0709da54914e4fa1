use tickmixer::execution::{Evaluator, Hub, MixingWorker, TimelineWorker};
use tickmixer::mixer::Mixer;
use tickmixer::models::{CurveId, Mode, Rate};
use tickmixer::strategy::StrategyKind;
use std::sync::Arc;

/// One minute of zigzag ticks per cell, long enough for every family window
/// on the raw curve.
fn tape(count: usize) -> Vec<Rate> {
    (0..count)
        .map(|i| {
            let ask = 100.0 + (i % 7) as f64;
            Rate::new("EUR_USD", i as i64 * 60_000, ask, ask - 1.0)
        })
        .collect()
}

#[test]
fn test_ticks_to_leads_pipeline() {
    let _ = tracing_subscriber::fmt::try_init();

    let hub = Arc::new(Hub::new());
    let mut timelines = TimelineWorker::new(hub.clone(), 60);
    let evaluator = Evaluator::new(hub.clone(), 64);
    let mixing = MixingWorker::new(hub.clone(), Mixer::new(10, 8, 75.0, 75.0, 5));

    // 1. Ticks become curve snapshots.
    hub.publish_rates("EUR_USD", tape(131));
    timelines.cycle().unwrap();

    let raw = CurveId::raw("EUR_USD");
    let snapshot = hub.snapshot(&raw).expect("raw curve published");
    assert_eq!(snapshot.builds.len(), 130);
    assert!(hub.snapshot(&CurveId::smooth("EUR_USD", 2)).is_some());

    // 2. Snapshots become full per-family batch coverage.
    evaluator.cycle().unwrap();
    assert!(hub
        .entry_batches(&raw, &StrategyKind::entry_kinds())
        .is_some());
    assert_eq!(
        hub.exit_batches(&raw, &StrategyKind::exit_kinds())
            .unwrap()
            .len(),
        5
    );

    // 3. Batches mix into leads and clear.
    mixing.cycle().unwrap();
    assert!(!hub.batched_curves().contains(&raw));

    // Surviving entry leads all cleared the barrier; surviving exit leads
    // all stayed under it.
    for lead in hub.take_entry_leads(&raw) {
        assert!(lead.score_for(lead.mode) > 75.0);
    }
    // Last tick of the tape: ask 104.0, bid 103.0.
    for mut lead in hub.take_exit_leads(&raw) {
        let entry = match lead.mode {
            Mode::Long => 103.0,
            Mode::Short => 104.0,
        };
        lead.score(lead.mode, entry);
        assert!(lead.score_for(lead.mode) < 75.0);
    }
}

#[test]
fn test_replayed_ticks_do_not_regress_the_quote() {
    let hub = Arc::new(Hub::new());
    let mut timelines = TimelineWorker::new(hub.clone(), 60);

    hub.publish_rates("EUR_USD", tape(10));
    timelines.cycle().unwrap();
    let newest = hub.current("EUR_USD").unwrap();

    // A stale replay neither moves the live quote nor grows the curve.
    let before = hub.snapshot(&CurveId::raw("EUR_USD")).unwrap().builds.len();
    hub.publish_rates("EUR_USD", tape(5));
    timelines.cycle().unwrap();

    assert_eq!(hub.current("EUR_USD").unwrap().time, newest.time);
    let after = hub.snapshot(&CurveId::raw("EUR_USD")).unwrap().builds.len();
    assert_eq!(after, before);
}
