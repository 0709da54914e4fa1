use super::Hub;
use crate::curve::Timeline;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Integrates drained ticks into each market's curve ladder and republishes
/// snapshots for the curves that gained builds.
pub struct TimelineWorker {
    hub: Arc<Hub>,
    seconds: u64,
    timelines: HashMap<String, Timeline>,
}

impl TimelineWorker {
    pub fn new(hub: Arc<Hub>, seconds: u64) -> Self {
        Self {
            hub,
            seconds,
            timelines: HashMap::new(),
        }
    }

    pub fn cycle(&mut self) -> Result<()> {
        let drained = self.hub.drain_rates();

        for (market, rates) in drained {
            let timeline = self
                .timelines
                .entry(market.clone())
                .or_insert_with(|| Timeline::new(market.clone(), self.seconds));

            let changed = timeline.integrate(&rates);
            for id in changed {
                if let Some(snapshot) = timeline.snapshot(id.smooth) {
                    self.hub.publish_snapshot(snapshot);
                }
            }
        }

        Ok(())
    }
}
