use super::{
    ChaosStrategy, ForwardStrategy, GrowthStrategy, MarginStrategy, OppositesStrategy, Strategy,
    StrategyKind,
};
use crate::curve::Variation;
use crate::models::QuoteSide;
use serde::{Deserialize, Serialize};

// ===== Per-family configuration =====

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChaosConfig {
    pub size: usize,
    pub floor: f64,
    pub side: QuoteSide,
    pub variation: Variation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthConfig {
    pub size: usize,
    pub level: f64,
    pub side: QuoteSide,
    pub variation: Variation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginConfig {
    pub profit: f64,
    pub loss: f64,
    pub variation: Variation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OppositesConfig {
    pub size: usize,
    pub incoming: f64,
    pub exiting: f64,
    pub reverse: bool,
    pub variation: Variation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardConfig {
    pub forward: usize,
    pub backward: usize,
    pub offset: usize,
    pub difference: f64,
    pub side: QuoteSide,
    pub variation: Variation,
}

/// Serializable snapshot of one strategy's full configuration. This is the
/// form persisted inside mixins and rebuilt into a live strategy when a
/// stored lead is re-scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyEntity {
    Chaos(ChaosConfig),
    Growth(GrowthConfig),
    Margin(MarginConfig),
    Opposites(OppositesConfig),
    Forward(ForwardConfig),
}

impl StrategyEntity {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyEntity::Chaos(_) => StrategyKind::Chaos,
            StrategyEntity::Growth(_) => StrategyKind::Growth,
            StrategyEntity::Margin(_) => StrategyKind::Margin,
            StrategyEntity::Opposites(_) => StrategyKind::Opposites,
            StrategyEntity::Forward(_) => StrategyKind::Forward,
        }
    }

    /// Rebuild a live strategy carrying this configuration.
    pub fn as_strategy(&self) -> Box<dyn Strategy> {
        match *self {
            StrategyEntity::Chaos(c) => {
                Box::new(ChaosStrategy::new(c.size, c.floor, c.side, c.variation))
            }
            StrategyEntity::Growth(c) => {
                Box::new(GrowthStrategy::new(c.size, c.level, c.side, c.variation))
            }
            StrategyEntity::Margin(c) => {
                Box::new(MarginStrategy::new(c.profit, c.loss, c.variation))
            }
            StrategyEntity::Opposites(c) => Box::new(OppositesStrategy::new(
                c.size, c.incoming, c.exiting, c.reverse, c.variation,
            )),
            StrategyEntity::Forward(c) => Box::new(ForwardStrategy::new(
                c.forward,
                c.backward,
                c.offset,
                c.difference,
                c.side,
                c.variation,
            )),
        }
    }

    /// Stable identity over the serialized configuration. Serialization of
    /// these plain enums cannot fail.
    pub fn hash_key(&self) -> i64 {
        let json = serde_json::to_string(self).expect("serializable configuration");
        fnv1a(json.as_bytes())
    }
}

/// FNV-1a 64, cast into the signed space the database column uses.
fn fnv1a(bytes: &[u8]) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as i64
}

/// One weighted strategy inside a persisted mixin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixinComponent {
    pub entity: StrategyEntity,
    pub weight: f64,
}

/// Persisted form of a lead: the curve it was mixed on plus its weighted
/// strategy configurations, deduplicated by content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mixin {
    pub hash: i64,
    pub market: String,
    pub smooth: usize,
    pub components: Vec<MixinComponent>,
}

impl Mixin {
    pub fn new(market: impl Into<String>, smooth: usize, components: Vec<MixinComponent>) -> Self {
        let market = market.into();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(market.as_bytes());
        bytes.extend_from_slice(&smooth.to_le_bytes());
        for component in &components {
            bytes.extend_from_slice(&component.entity.hash_key().to_le_bytes());
            bytes.extend_from_slice(&component.weight.to_le_bytes());
        }

        Self {
            hash: fnv1a(&bytes),
            market,
            smooth,
            components,
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    /// Rebuild the live strategies, in component order.
    pub fn strategies(&self) -> Vec<Box<dyn Strategy>> {
        self.components
            .iter()
            .map(|c| c.entity.as_strategy())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entity() -> StrategyEntity {
        StrategyEntity::Growth(GrowthConfig {
            size: 4,
            level: 16.0,
            side: QuoteSide::Ask,
            variation: Variation::Average,
        })
    }

    #[test]
    fn test_entity_round_trip() {
        for entity in [
            StrategyEntity::Chaos(ChaosConfig {
                size: 8,
                floor: 48.0,
                side: QuoteSide::Bid,
                variation: Variation::Maximum,
            }),
            sample_entity(),
            StrategyEntity::Margin(MarginConfig {
                profit: 50.0,
                loss: 100.0,
                variation: Variation::Average,
            }),
            StrategyEntity::Opposites(OppositesConfig {
                size: 16,
                incoming: 10.0,
                exiting: 20.0,
                reverse: true,
                variation: Variation::Minimum,
            }),
            StrategyEntity::Forward(ForwardConfig {
                forward: 2,
                backward: 4,
                offset: 8,
                difference: 50.0,
                side: QuoteSide::Ask,
                variation: Variation::Average,
            }),
        ] {
            let json = serde_json::to_string(&entity).unwrap();
            let back: StrategyEntity = serde_json::from_str(&json).unwrap();
            assert_eq!(back, entity);
            assert_eq!(back.hash_key(), entity.hash_key());
            assert_eq!(back.as_strategy().kind(), entity.kind());
        }
    }

    #[test]
    fn test_rebuilt_strategy_carries_configuration() {
        let strategy = sample_entity().as_strategy();
        assert_eq!(strategy.kind(), StrategyKind::Growth);
        assert_eq!(strategy.window(), 4);
        assert_eq!(strategy.as_entity(), sample_entity());
    }

    #[test]
    fn test_hash_distinguishes_configurations() {
        let a = sample_entity();
        let b = StrategyEntity::Growth(GrowthConfig {
            size: 4,
            level: 28.0,
            side: QuoteSide::Ask,
            variation: Variation::Average,
        });
        assert_ne!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn test_mixin_hash_depends_on_weights() {
        let component = |weight| MixinComponent {
            entity: sample_entity(),
            weight,
        };
        let a = Mixin::new("EUR_USD", 0, vec![component(60.0), component(40.0)]);
        let b = Mixin::new("EUR_USD", 0, vec![component(40.0), component(60.0)]);
        let c = Mixin::new("EUR_USD", 0, vec![component(60.0), component(40.0)]);

        assert_ne!(a.hash, b.hash);
        assert_eq!(a.hash, c.hash);
        assert_eq!(a.weights(), vec![60.0, 40.0]);
        assert_eq!(a.strategies().len(), 2);
    }

    #[test]
    fn test_mixin_serde_round_trip() {
        let mixin = Mixin::new(
            "EUR_USD",
            8,
            vec![MixinComponent {
                entity: sample_entity(),
                weight: 100.0,
            }],
        );
        let json = serde_json::to_string(&mixin).unwrap();
        let back: Mixin = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mixin);
    }
}
