//! Integrity reconciliation: detect and repair data-model invariant
//! violations across all images
//!
//! Self-heals what is unambiguous (orphan images, byte-identical duplicate
//! primaries, primaries whose object is gone) and reports what is not
//! (conflicting primaries, images with no primary at all).

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{image_repo, variant_repo};
use crate::error::Result;
use crate::models::ImageVariant;
use crate::services::variants;
use crate::storage::{ObjectStore, StorageError};

/// Outcome of one reconciliation run
#[derive(Debug, Default)]
pub struct IntegrityReport {
    /// Images with zero variants, deleted outright
    pub orphans_deleted: Vec<Uuid>,
    /// Images whose duplicate primaries collapsed to one survivor
    pub healed: Vec<Uuid>,
    /// Images left with more than one distinct primary object; ambiguous,
    /// nothing deleted
    pub unresolved_conflicts: Vec<Uuid>,
    /// Images with no primary variant; reported, not healed
    pub missing_primary: Vec<Uuid>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphans_deleted.is_empty()
            && self.healed.is_empty()
            && self.unresolved_conflicts.is_empty()
            && self.missing_primary.is_empty()
    }
}

/// What to do with a set of duplicate primary rows, decided purely from
/// their integrity tags. `None` means the stored object is missing.
#[derive(Debug, PartialEq, Eq)]
pub struct PrimaryCleanup {
    /// Rows to delete: missing objects and byte-identical duplicates
    pub delete: Vec<Uuid>,
    /// Distinct tags among the survivors; more than one is unresolvable
    pub distinct_tags: usize,
}

/// First row with a given tag survives; later rows with an already-seen tag
/// and rows with no object are deleted.
pub fn plan_primary_cleanup(candidates: &[(Uuid, Option<String>)]) -> PrimaryCleanup {
    let mut delete = Vec::new();
    let mut seen_tags: Vec<&str> = Vec::new();

    for (id, tag) in candidates {
        match tag {
            None => delete.push(*id),
            Some(tag) if seen_tags.contains(&tag.as_str()) => delete.push(*id),
            Some(tag) => seen_tags.push(tag),
        }
    }

    PrimaryCleanup {
        delete,
        distinct_tags: seen_tags.len(),
    }
}

pub struct Reconciler<'a> {
    pub pool: &'a PgPool,
    pub store: &'a dyn ObjectStore,
}

impl Reconciler<'_> {
    pub async fn run(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        // Orphan check: an image with no variants has nothing to serve
        for image_id in image_repo::ids_without_variants(self.pool).await? {
            warn!(%image_id, "image has no variants, deleting");
            image_repo::delete(self.pool, image_id).await?;
            report.orphans_deleted.push(image_id);
        }

        for image in image_repo::list_all(self.pool).await? {
            let primaries = variant_repo::find_primaries(self.pool, image.id).await?;

            match primaries.len() {
                0 => {
                    warn!(image_id = %image.id, "image has no primary variant");
                    report.missing_primary.push(image.id);
                }
                1 => {}
                _ => self.heal_duplicate_primaries(image.id, primaries, &mut report).await?,
            }
        }

        info!(
            orphans = report.orphans_deleted.len(),
            healed = report.healed.len(),
            unresolved = report.unresolved_conflicts.len(),
            missing_primary = report.missing_primary.len(),
            "reconciliation finished"
        );

        Ok(report)
    }

    async fn heal_duplicate_primaries(
        &self,
        image_id: Uuid,
        primaries: Vec<ImageVariant>,
        report: &mut IntegrityReport,
    ) -> Result<()> {
        let mut candidates = Vec::with_capacity(primaries.len());

        for variant in &primaries {
            match self.store.etag(&variant.storage_key()).await {
                Ok(tag) => candidates.push((variant.id, Some(tag))),
                Err(StorageError::NotFound(_)) => candidates.push((variant.id, None)),
                // Anything but a clean "gone" aborts this image
                Err(e) => return Err(e.into()),
            }
        }

        let plan = plan_primary_cleanup(&candidates);

        for variant in &primaries {
            if plan.delete.contains(&variant.id) {
                warn!(image_id = %image_id, variant_id = %variant.id, "deleting redundant primary variant");
                variants::delete_variant(self.pool, self.store, variant).await?;
            }
        }

        if plan.distinct_tags > 1 {
            warn!(%image_id, "multiple distinct primary objects remain, not healing");
            report.unresolved_conflicts.push(image_id);
        } else if !plan.delete.is_empty() {
            info!(%image_id, deleted = plan.delete.len(), "duplicate primaries collapsed");
            report.healed.push(image_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn identical_tags_keep_only_the_first() {
        let plan = plan_primary_cleanup(&[
            (id(1), Some("abc".into())),
            (id(2), Some("abc".into())),
            (id(3), Some("abc".into())),
        ]);

        assert_eq!(plan.delete, vec![id(2), id(3)]);
        assert_eq!(plan.distinct_tags, 1);
    }

    #[test]
    fn differing_tags_delete_nothing_and_stay_conflicted() {
        let plan = plan_primary_cleanup(&[
            (id(1), Some("abc".into())),
            (id(2), Some("def".into())),
        ]);

        assert!(plan.delete.is_empty());
        assert_eq!(plan.distinct_tags, 2);
    }

    #[test]
    fn missing_objects_are_always_deleted() {
        let plan = plan_primary_cleanup(&[
            (id(1), None),
            (id(2), Some("abc".into())),
            (id(3), None),
        ]);

        assert_eq!(plan.delete, vec![id(1), id(3)]);
        assert_eq!(plan.distinct_tags, 1);
    }

    #[test]
    fn mixed_duplicates_and_conflicts() {
        // two distinct tags survive even after dropping a duplicate
        let plan = plan_primary_cleanup(&[
            (id(1), Some("abc".into())),
            (id(2), Some("def".into())),
            (id(3), Some("abc".into())),
        ]);

        assert_eq!(plan.delete, vec![id(3)]);
        assert_eq!(plan.distinct_tags, 2);
    }

    #[test]
    fn all_objects_missing_deletes_everything() {
        let plan = plan_primary_cleanup(&[(id(1), None), (id(2), None)]);
        assert_eq!(plan.delete, vec![id(1), id(2)]);
        assert_eq!(plan.distinct_tags, 0);
    }

    #[tokio::test]
    async fn store_tags_drive_the_cleanup_plan() {
        use crate::models::storage_key;
        use crate::storage::memory::MemoryStore;
        use bytes::Bytes;

        // two byte-identical primaries and one whose object is gone
        let store = MemoryStore::new();
        for vid in [id(1), id(2)] {
            store
                .upload(&storage_key(vid, "jpg"), Bytes::from_static(b"pixels"), "image/jpeg")
                .await
                .unwrap();
        }

        let mut candidates = Vec::new();
        for vid in [id(1), id(2), id(3)] {
            let tag = match store.etag(&storage_key(vid, "jpg")).await {
                Ok(tag) => Some(tag),
                Err(StorageError::NotFound(_)) => None,
                Err(e) => panic!("unexpected storage error: {e}"),
            };
            candidates.push((vid, tag));
        }

        let plan = plan_primary_cleanup(&candidates);
        assert_eq!(plan.delete, vec![id(2), id(3)]);
        assert_eq!(plan.distinct_tags, 1);
    }
}
