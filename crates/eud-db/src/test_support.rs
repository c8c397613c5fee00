//! Shared test utilities for eud-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use eud_config::ProgressionConfig;
    use eud_core::entities::Art;
    use eud_core::enums::EconomicLayer;

    use crate::EudDb;
    use crate::repos::catalog::{NewArt, NewPart, NewStage};
    use crate::service::EudService;
    use crate::trail::writer::TrailWriter;

    /// In-memory service with the trail disabled and default tunables.
    pub async fn test_service() -> EudService {
        test_service_with(ProgressionConfig::default()).await
    }

    /// In-memory service with custom progression tunables.
    pub async fn test_service_with(progression: ProgressionConfig) -> EudService {
        let db = EudDb::open_local(":memory:").await.unwrap();
        EudService::from_db(db, TrailWriter::disabled(), progression)
    }

    /// In-memory service with the trail writing to `trail_dir`.
    pub async fn test_service_with_trail(trail_dir: std::path::PathBuf) -> EudService {
        let db = EudDb::open_local(":memory:").await.unwrap();
        let trail = TrailWriter::new(trail_dir).unwrap();
        EudService::from_db(db, trail, ProgressionConfig::default())
    }

    /// Rank 1 port-layer profile.
    pub async fn seed_profile(svc: &EudService, user_id: &str) {
        svc.create_profile(user_id, 1, EconomicLayer::Port).await.unwrap();
    }

    /// Art with `parts` parts named `P0..` and one stage per threshold.
    pub async fn seed_art(svc: &EudService, name: &str, parts: u32, thresholds: &[u8]) -> Art {
        let art = svc.create_art(&NewArt::new(name)).await.unwrap();
        for i in 0..parts {
            svc.add_art_part(&art.id, &NewPart::new(format!("P{i}"))).await.unwrap();
        }
        for (i, threshold) in thresholds.iter().enumerate() {
            svc.add_art_stage(&art.id, &NewStage::new(format!("S{i}"), *threshold))
                .await
                .unwrap();
        }
        art
    }
}
