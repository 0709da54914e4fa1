use super::Hub;
use crate::mixer::Mixer;
use crate::strategy::StrategyKind;
use crate::Result;
use std::sync::Arc;

/// Drives the combinatorial mixer over every fully-batched curve and
/// publishes the surviving leads.
pub struct MixingWorker {
    hub: Arc<Hub>,
    mixer: Mixer,
    entry_kinds: Vec<StrategyKind>,
    exit_kinds: Vec<StrategyKind>,
}

impl MixingWorker {
    pub fn new(hub: Arc<Hub>, mixer: Mixer) -> Self {
        Self::scoped(
            hub,
            mixer,
            StrategyKind::entry_kinds(),
            StrategyKind::exit_kinds(),
        )
    }

    /// Restrict mixing to a subset of families.
    pub fn scoped(
        hub: Arc<Hub>,
        mixer: Mixer,
        entry_kinds: Vec<StrategyKind>,
        exit_kinds: Vec<StrategyKind>,
    ) -> Self {
        Self {
            hub,
            mixer,
            entry_kinds,
            exit_kinds,
        }
    }

    pub fn cycle(&self) -> Result<()> {
        for curve in self.hub.batched_curves() {
            // A curve mixes only once every family reported in, and exits
            // need a live quote to stand in for the entry price.
            let entries = self.hub.entry_batches(&curve, &self.entry_kinds);
            let exits = self.hub.exit_batches(&curve, &self.exit_kinds);
            let rate = self.hub.current(&curve.market);

            let (Some(entries), Some(exits), Some(rate)) = (entries, exits, rate) else {
                continue;
            };

            let entry_leads = match self.mixer.mix_entries(&entries) {
                Ok(leads) => leads,
                Err(error) => {
                    tracing::warn!("Mixing pass aborted on {}: {}", curve, error);
                    continue;
                }
            };
            let exit_leads = match self.mixer.mix_exits(&rate, &exits) {
                Ok(leads) => leads,
                Err(error) => {
                    tracing::warn!("Mixing pass aborted on {}: {}", curve, error);
                    continue;
                }
            };

            if !entry_leads.is_empty() || !exit_leads.is_empty() {
                tracing::debug!(
                    "Mixed {} entry and {} exit leads on {}",
                    entry_leads.len(),
                    exit_leads.len(),
                    curve
                );
            }

            self.hub.publish_entry_leads(curve.clone(), entry_leads);
            self.hub.publish_exit_leads(curve.clone(), exit_leads);
            self.hub.clear_batches(&curve);
        }

        Ok(())
    }
}
