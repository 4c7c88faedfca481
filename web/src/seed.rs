//! First-start lot layout.

use crate::config::SeedConfig;
use lotkeeper_core::{HolderKey, LotError, LotStore, ReservationClass, SpaceFilter, SpaceLabel};
use lotkeeper_runtime::Lot;

/// Sample reservation holders registered alongside a seeded layout.
pub const SAMPLE_HOLDERS: [(i64, &str); 3] = [
    (12_345_678, "Juan Pérez"),
    (87_654_321, "María Gómez"),
    (11_223_344, "Carlos López"),
];

/// What [`seed_lot`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Spaces created
    pub spaces: u32,
    /// Holders registered
    pub holders: usize,
}

/// Creates `config.total` spaces labeled `01`, `02`, ... with the first
/// `config.reserved` in the reserved class, then the sample holders.
///
/// Does nothing when seeding is disabled or the store already has spaces.
///
/// # Errors
///
/// Store failures.
pub async fn seed_lot(
    lot: &Lot,
    store: &dyn LotStore,
    config: SeedConfig,
) -> Result<SeedReport, LotError> {
    if !config.enabled {
        return Ok(SeedReport::default());
    }
    if !store.spaces(SpaceFilter::all()).await?.is_empty() {
        tracing::debug!("Store already has spaces, skipping seed");
        return Ok(SeedReport::default());
    }

    let width = config.total.to_string().len().max(2);
    let admin = lot.admin();
    for number in 1..=config.total {
        let class = if number <= config.reserved {
            ReservationClass::Reserved
        } else {
            ReservationClass::Open
        };
        admin
            .create_space(SpaceLabel::numbered(number, width).as_str(), class)
            .await?;
    }

    let mut holders = 0;
    for (key, name) in SAMPLE_HOLDERS {
        match admin.register_holder(HolderKey::new(key), name).await {
            Ok(_) => holders += 1,
            Err(LotError::DuplicateHolder(_)) => {}
            Err(other) => return Err(other),
        }
    }

    tracing::info!(
        spaces = config.total,
        reserved = config.reserved.min(config.total),
        holders,
        "Lot seeded"
    );
    Ok(SeedReport {
        spaces: config.total,
        holders,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lotkeeper_core::{NoopPublisher, OccupancyState};
    use lotkeeper_runtime::LotEnvironment;
    use lotkeeper_testing::{InMemoryLotStore, test_clock};
    use std::sync::Arc;

    fn lot(store: &InMemoryLotStore) -> Lot {
        Lot::new(LotEnvironment::new(
            Arc::new(store.clone()),
            Arc::new(NoopPublisher),
            Arc::new(test_clock()),
        ))
    }

    #[tokio::test]
    async fn seeds_an_empty_store_once() {
        let store = InMemoryLotStore::new();
        let lot = lot(&store);
        let config = SeedConfig {
            enabled: true,
            reserved: 2,
            total: 12,
        };

        let report = seed_lot(&lot, &store, config).await.unwrap();
        assert_eq!(
            report,
            SeedReport {
                spaces: 12,
                holders: 3,
            }
        );

        let spaces = store.spaces(SpaceFilter::all()).await.unwrap();
        assert_eq!(spaces.len(), 12);
        assert_eq!(spaces[0].label.as_str(), "01");
        assert_eq!(spaces[11].label.as_str(), "12");
        let reserved: Vec<_> = spaces
            .iter()
            .filter(|s| s.class == ReservationClass::Reserved)
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(reserved, ["01", "02"]);
        assert!(spaces.iter().all(|s| s.state == OccupancyState::Free));
        assert_eq!(store.holders().await.unwrap().len(), 3);

        let again = seed_lot(&lot, &store, config).await.unwrap();
        assert_eq!(again, SeedReport::default());
        assert_eq!(store.spaces(SpaceFilter::all()).await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn disabled_seed_leaves_the_store_empty() {
        let store = InMemoryLotStore::new();
        let config = SeedConfig {
            enabled: false,
            ..SeedConfig::default()
        };
        seed_lot(&lot(&store), &store, config).await.unwrap();
        assert!(store.spaces(SpaceFilter::all()).await.unwrap().is_empty());
    }
}
