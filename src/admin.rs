//! Back-office submissions.
//!
//! An admin form stages a record plus image files. Submitting validates the
//! record, uploads every image concurrently under a content-addressed path,
//! writes the URLs into the record and then writes the document. If the write
//! fails, blobs created by this submission are deleted again.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::blob::image_path;
use crate::error::StoreError;
use crate::gateway::{run_blocking, Gateway};
use crate::models::{trees, Collection, Destination, HeroSlide, Offer, Record, Star, Villa};

/// An uploaded image waiting to be stored.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A staged form: the record, its images keyed by slot, and the version the
/// editor loaded (for optimistic concurrency on updates).
#[derive(Debug, Clone)]
pub struct Submission<T> {
    pub record: T,
    pub images: HashMap<String, ImageFile>,
    pub expected_version: Option<u64>,
}

impl<T> Submission<T> {
    pub fn new(record: T) -> Self {
        Self {
            record,
            images: HashMap::new(),
            expected_version: None,
        }
    }

    pub fn with_image(mut self, slot: &str, file: ImageFile) -> Self {
        self.images.insert(slot.to_string(), file);
        self
    }
}

/// Slot name for single-image entities.
pub const IMAGE_SLOT: &str = "image";

#[derive(Clone)]
pub struct Admin {
    gateway: Gateway,
    max_upload_bytes: usize,
    locks: PathLocks,
}

/// One validated image with its content-addressed path.
struct Staged {
    slot: String,
    path: String,
    bytes: Vec<u8>,
}

/// Per-path async locks for blob paths in flight.
#[derive(Clone, Default)]
struct PathLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PathLocks {
    /// Lock every distinct path, in sorted order so two submissions sharing
    /// several images can't deadlock.
    async fn acquire<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Vec<OwnedMutexGuard<()>> {
        let mut paths: Vec<&str> = paths.into_iter().collect();
        paths.sort_unstable();
        paths.dedup();

        let mut guards = Vec::with_capacity(paths.len());
        for path in paths {
            let lock = {
                let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                map.entry(path.to_string()).or_default().clone()
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Forget locks nobody holds or waits on.
    fn prune(&self) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Blobs written by one submission.
struct Uploaded {
    urls: HashMap<String, String>,
    created: Vec<String>,
}

impl Admin {
    pub fn new(gateway: Gateway, max_upload_bytes: usize) -> Self {
        Self {
            gateway,
            max_upload_bytes,
            locks: PathLocks::default(),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Run synchronous admin work (offers, deletes) on the blocking pool.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Admin) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let admin = self.clone();
        run_blocking(move || f(admin)).await
    }

    /// Store one image outside any form. Returns `(path, url)`.
    pub async fn upload_image(&self, prefix: &str, name: &str, file: ImageFile) -> Result<(String, String), StoreError> {
        let path = image_path(prefix, name, &file.bytes, self.max_upload_bytes)
            .map_err(|e| StoreError::Invalid(format!("{} ({})", e, file.file_name)))?;
        let guards = self.locks.acquire([path.as_str()]).await;
        let result = self.gateway.upload_image(&file.bytes, &path).await;
        drop(guards);
        self.locks.prune();
        Ok((path, result?))
    }

    /// Validate every image and derive its path before anything is written.
    fn stage(&self, prefix: &str, name: &str, images: HashMap<String, ImageFile>) -> Result<Vec<Staged>, StoreError> {
        images
            .into_iter()
            .map(|(slot, file)| {
                let path = image_path(prefix, name, &file.bytes, self.max_upload_bytes)
                    .map_err(|e| StoreError::Invalid(format!("{} ({})", e, file.file_name)))?;
                Ok(Staged {
                    slot,
                    path,
                    bytes: file.bytes,
                })
            })
            .collect()
    }

    async fn upload_all(&self, staged: Vec<Staged>) -> Result<Uploaded, StoreError> {
        let results = join_all(
            staged
                .iter()
                .map(|s| self.gateway.upload_blob(&s.path, &s.bytes)),
        )
        .await;

        let mut uploaded = Uploaded {
            urls: HashMap::new(),
            created: vec![],
        };
        let mut first_err = None;
        for (staged, result) in staged.into_iter().zip(results) {
            match result {
                Ok(blob) => {
                    if blob.created {
                        uploaded.created.push(blob.path.clone());
                    }
                    uploaded.urls.insert(staged.slot, blob.url);
                }
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(err) = first_err {
            self.compensate(&uploaded.created).await;
            return Err(err);
        }
        Ok(uploaded)
    }

    /// Best-effort removal of blobs orphaned by a failed submission. Callers
    /// hold the path locks, so no other submission can have adopted them.
    async fn compensate(&self, created: &[String]) {
        for path in created {
            if let Err(e) = self.gateway.delete_blob(path).await {
                tracing::error!(path = %path, error = %e, "failed to remove orphaned upload");
            }
        }
        if !created.is_empty() {
            tracing::warn!(count = created.len(), "removed uploads from failed submission");
        }
    }

    /// Upload, then hand the URLs to `write`. Undo new uploads if `write` fails.
    async fn with_uploads<T, F>(
        &self,
        prefix: &str,
        name: &str,
        images: HashMap<String, ImageFile>,
        write: F,
    ) -> Result<Record<T>, StoreError>
    where
        F: FnOnce(&HashMap<String, String>) -> Result<Record<T>, StoreError>,
    {
        let staged = self.stage(prefix, name, images)?;
        // Held from upload through write/compensate: a concurrent submission with
        // the same image (same content-addressed path) waits here instead of
        // adopting a blob we might still delete
        let guards = self
            .locks
            .acquire(staged.iter().map(|s| s.path.as_str()))
            .await;

        let result = match self.upload_all(staged).await {
            Ok(uploaded) => match write(&uploaded.urls) {
                Ok(record) => Ok(record),
                Err(e) => {
                    self.compensate(&uploaded.created).await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        drop(guards);
        self.locks.prune();
        result
    }

    /// Fails fast on updates to missing documents, before anything is uploaded.
    fn ensure_exists(&self, tree: &'static str, id: Option<&str>) -> Result<(), StoreError> {
        if let Some(id) = id {
            if self.gateway.storage().get::<serde_json::Value>(tree, id)?.is_none() {
                return Err(StoreError::not_found(crate::storage::entity_name(tree), id));
            }
        }
        Ok(())
    }

    // --- villas ---

    /// Image slots are `hero:{heroImage.id}` and `space:{space.id}`.
    pub async fn submit_villa(&self, id: Option<&str>, submission: Submission<Villa>) -> Result<Record<Villa>, StoreError> {
        let Submission {
            mut record,
            images,
            expected_version,
        } = submission;

        if record.name.trim().is_empty() || record.location.trim().is_empty() {
            return Err(StoreError::Invalid("villa: name and location are required".into()));
        }
        for slot in images.keys() {
            let known = match slot.split_once(':') {
                Some(("hero", hid)) => record.hero_images.iter().any(|h| h.id == hid),
                Some(("space", sid)) => record.spaces.iter().any(|s| s.id == sid),
                _ => false,
            };
            if !known {
                return Err(StoreError::Invalid(format!("villa: unknown image slot {:?}", slot)));
            }
        }
        self.ensure_exists(trees::VILLAS, id)?;

        let name = record.name.clone();
        let gateway = &self.gateway;
        self.with_uploads("villas", &name, images, move |urls| {
            for hero in &mut record.hero_images {
                if let Some(url) = urls.get(&format!("hero:{}", hero.id)) {
                    hero.url = url.clone();
                }
            }
            for space in &mut record.spaces {
                if let Some(url) = urls.get(&format!("space:{}", space.id)) {
                    space.image_url = Some(url.clone());
                }
            }
            match id {
                Some(id) => gateway.update_villa(id, &record, expected_version),
                None => gateway.save_villa(record),
            }
        })
        .await
    }

    pub fn remove_villa(&self, id: &str) -> Result<(), StoreError> {
        self.gateway.delete_villa(id)
    }

    // --- collections ---

    pub async fn submit_collection(
        &self,
        id: Option<&str>,
        submission: Submission<Collection>,
    ) -> Result<Record<Collection>, StoreError> {
        let Submission {
            mut record,
            images,
            expected_version,
        } = submission;
        if record.title.trim().is_empty() {
            return Err(StoreError::Invalid("collection: title is required".into()));
        }
        check_single_slot(&images, "collection")?;
        self.ensure_exists(trees::COLLECTIONS, id)?;

        let name = record.title.clone();
        let gateway = &self.gateway;
        self.with_uploads("collections", &name, images, move |urls| {
            if let Some(url) = urls.get(IMAGE_SLOT) {
                record.image = url.clone();
            }
            match id {
                Some(id) => gateway.update_collection(id, &record, expected_version),
                None => gateway.save_collection(record),
            }
        })
        .await
    }

    pub fn remove_collection(&self, id: &str) -> Result<(), StoreError> {
        self.gateway.delete_collection(id)
    }

    // --- offers ---

    pub fn submit_offer(&self, id: Option<&str>, offer: Offer, expected_version: Option<u64>) -> Result<Record<Offer>, StoreError> {
        if offer.title.trim().is_empty() || offer.code.trim().is_empty() {
            return Err(StoreError::Invalid("offer: title and code are required".into()));
        }
        match id {
            Some(id) => self.gateway.update_offer(id, &offer, expected_version),
            None => self.gateway.save_offer(offer),
        }
    }

    pub fn remove_offer(&self, id: &str) -> Result<bool, StoreError> {
        self.gateway.delete_offer(id)
    }

    // --- celebrity stays ---

    pub async fn submit_star(&self, id: Option<&str>, submission: Submission<Star>) -> Result<Record<Star>, StoreError> {
        let Submission {
            mut record,
            images,
            expected_version,
        } = submission;
        if record.name.trim().is_empty() {
            return Err(StoreError::Invalid("celebrity stay: name is required".into()));
        }
        check_single_slot(&images, "celebrity stay")?;
        self.ensure_exists(trees::STARS, id)?;

        let name = record.name.clone();
        let gateway = &self.gateway;
        self.with_uploads("stars", &name, images, move |urls| {
            if let Some(url) = urls.get(IMAGE_SLOT) {
                record.image = url.clone();
            }
            match id {
                Some(id) => gateway.update_star(id, &record, expected_version),
                None => gateway.save_star(record),
            }
        })
        .await
    }

    pub fn remove_star(&self, id: &str) -> Result<bool, StoreError> {
        self.gateway.delete_star(id)
    }

    // --- destinations ---

    pub async fn submit_destination(
        &self,
        id: Option<&str>,
        submission: Submission<Destination>,
    ) -> Result<Record<Destination>, StoreError> {
        let Submission {
            mut record,
            images,
            expected_version,
        } = submission;
        let has_image = images.contains_key(IMAGE_SLOT) || !record.image.trim().is_empty();
        if record.place.trim().is_empty() || !has_image {
            return Err(StoreError::Invalid(
                "Please provide both a destination name and an image.".into(),
            ));
        }
        check_single_slot(&images, "destination")?;
        self.ensure_exists(trees::DESTINATIONS, id)?;

        let name = record.place.clone();
        let gateway = &self.gateway;
        self.with_uploads("destinations", &name, images, move |urls| {
            if let Some(url) = urls.get(IMAGE_SLOT) {
                record.image = url.clone();
            }
            match id {
                Some(id) => gateway.update_destination(id, &record, expected_version),
                None => gateway.save_destination(record),
            }
        })
        .await
    }

    pub fn remove_destination(&self, id: &str) -> Result<bool, StoreError> {
        self.gateway.delete_destination(id)
    }

    // --- hero slides ---

    pub async fn submit_slide(&self, id: Option<&str>, submission: Submission<HeroSlide>) -> Result<Record<HeroSlide>, StoreError> {
        let Submission {
            mut record,
            images,
            expected_version,
        } = submission;
        if record.title.trim().is_empty() {
            return Err(StoreError::Invalid("slide: title is required".into()));
        }
        check_single_slot(&images, "slide")?;
        self.ensure_exists(trees::SLIDES, id)?;

        let name = record.title.clone();
        let gateway = &self.gateway;
        self.with_uploads("slides", &name, images, move |urls| {
            if let Some(url) = urls.get(IMAGE_SLOT) {
                record.image = url.clone();
            }
            match id {
                Some(id) => gateway.update_slide(id, &record, expected_version),
                None => gateway.save_slide(record),
            }
        })
        .await
    }

    pub fn remove_slide(&self, id: &str) -> Result<bool, StoreError> {
        self.gateway.delete_slide(id)
    }
}

fn check_single_slot(images: &HashMap<String, ImageFile>, entity: &str) -> Result<(), StoreError> {
    match images.keys().find(|k| k.as_str() != IMAGE_SLOT) {
        Some(slot) => Err(StoreError::Invalid(format!("{}: unknown image slot {:?}", entity, slot))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::tests::{JPEG, PNG};
    use crate::gateway::tests::{test_gateway, villa};
    use crate::models::{HeroImage, OfferType, Space};

    fn admin() -> Admin {
        Admin::new(test_gateway(), 1024)
    }

    fn png(name: &str) -> ImageFile {
        ImageFile {
            file_name: name.into(),
            bytes: PNG.to_vec(),
        }
    }

    fn villa_with_slots() -> Villa {
        let mut v = villa("Two Villa", "Karjat, Maharashtra", 4.6);
        v.hero_images.push(HeroImage {
            id: "1".into(),
            name: "front.png".into(),
            url: String::new(),
        });
        v.spaces.push(Space {
            id: "s1".into(),
            title: "Bedroom 1".into(),
            image_url: None,
            details: vec!["King bed".into()],
        });
        v
    }

    async fn blob_exists(admin: &Admin, url: &str) -> bool {
        let path = url.split("/blobs/").nth(1).unwrap();
        admin.gateway.blobs.exists(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_submit_villa_uploads_and_links_images() {
        let admin = admin();
        let submission = Submission::new(villa_with_slots())
            .with_image("hero:1", png("front.png"))
            .with_image(
                "space:s1",
                ImageFile {
                    file_name: "bed.jpg".into(),
                    bytes: JPEG.to_vec(),
                },
            );

        let saved = admin.submit_villa(None, submission).await.unwrap();
        let hero_url = &saved.data.hero_images[0].url;
        assert!(hero_url.contains("/blobs/villas/two-villa/"));
        assert!(saved.data.spaces[0].image_url.as_deref().unwrap().ends_with(".jpg"));
        assert!(blob_exists(&admin, hero_url).await);

        let fetched = admin.gateway.fetch_villa_by_id(&saved.id).unwrap().unwrap();
        assert_eq!(fetched.data, saved.data);
    }

    #[tokio::test]
    async fn test_resubmitting_same_image_reuses_path() {
        let admin = admin();
        let first = admin
            .submit_villa(None, Submission::new(villa_with_slots()).with_image("hero:1", png("a.png")))
            .await
            .unwrap();
        let second = admin
            .submit_villa(None, Submission::new(villa_with_slots()).with_image("hero:1", png("b.png")))
            .await
            .unwrap();
        assert_eq!(first.data.hero_images[0].url, second.data.hero_images[0].url);
    }

    #[tokio::test]
    async fn test_unknown_slot_rejected_before_upload() {
        let admin = admin();
        let err = admin
            .submit_villa(None, Submission::new(villa_with_slots()).with_image("hero:99", png("x.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(admin.gateway.fetch_villas().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_removes_new_uploads() {
        let admin = admin();
        let saved = admin.submit_villa(None, Submission::new(villa_with_slots())).await.unwrap();
        admin
            .submit_villa(Some(&saved.id), Submission::new(villa_with_slots()))
            .await
            .unwrap();

        // Stale version: the document write fails after the upload succeeded
        let stale = Submission {
            expected_version: Some(1),
            ..Submission::new(villa_with_slots()).with_image("hero:1", png("new.png"))
        };
        let err = admin.submit_villa(Some(&saved.id), stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let path = image_path("villas", "Two Villa", PNG, 1024).unwrap();
        assert!(!admin.gateway.blobs.exists(&path).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_submission_keeps_image_adopted_by_concurrent_one() {
        for _ in 0..8 {
            let admin = admin();
            let saved = admin.submit_villa(None, Submission::new(villa_with_slots())).await.unwrap();
            admin
                .submit_villa(Some(&saved.id), Submission::new(villa_with_slots()))
                .await
                .unwrap();

            let stale = Submission {
                expected_version: Some(1),
                ..Submission::new(villa_with_slots()).with_image("hero:1", png("stale.png"))
            };
            let fresh = Submission::new(villa_with_slots()).with_image("hero:1", png("fresh.png"));
            let (a, b) = tokio::join!(
                admin.submit_villa(Some(&saved.id), stale),
                admin.submit_villa(None, fresh),
            );

            assert!(matches!(a.unwrap_err(), StoreError::Conflict { .. }));
            let created = b.unwrap();
            assert!(blob_exists(&admin, &created.data.hero_images[0].url).await);
            assert_eq!(admin.locks.len(), 0);
        }
    }

    #[tokio::test]
    async fn test_path_locks_serialize_same_path_and_prune() {
        let locks = PathLocks::default();
        let held = locks.acquire(["villas/a/1.png", "villas/a/1.png", "villas/b/2.png"]).await;
        assert_eq!(held.len(), 2);

        let other = locks.clone();
        let waiter = tokio::spawn(async move { other.acquire(["villas/a/1.png"]).await.len() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 1);
        locks.prune();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_villa_uploads_nothing() {
        let admin = admin();
        let err = admin
            .submit_villa(Some("missing"), Submission::new(villa_with_slots()).with_image("hero:1", png("x.png")))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let path = image_path("villas", "Two Villa", PNG, 1024).unwrap();
        assert!(!admin.gateway.blobs.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_oversized_or_bogus_image_rejected() {
        let admin = Admin::new(test_gateway(), 4);
        let err = admin
            .submit_star(
                None,
                Submission::new(Star {
                    name: "Star".into(),
                    location: "Goa".into(),
                    image: String::new(),
                })
                .with_image(IMAGE_SLOT, png("big.png")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_destination_requires_name_and_image() {
        let admin = admin();
        let err = admin
            .submit_destination(
                None,
                Submission::new(Destination {
                    place: "Goa".into(),
                    image: String::new(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(&err, StoreError::Invalid(m) if m.starts_with("Please provide both")));

        let saved = admin
            .submit_destination(
                None,
                Submission::new(Destination {
                    place: "Goa".into(),
                    image: String::new(),
                })
                .with_image(IMAGE_SLOT, png("goa.png")),
            )
            .await
            .unwrap();
        assert!(saved.data.image.contains("/blobs/destinations/goa/"));
    }

    #[tokio::test]
    async fn test_collection_and_slide_create_update_delete() {
        let admin = admin();
        let collection = admin
            .submit_collection(
                None,
                Submission::new(Collection {
                    title: "Romantic Getaways".into(),
                    description: String::new(),
                    image: String::new(),
                    villas: vec![],
                })
                .with_image(IMAGE_SLOT, png("c.png")),
            )
            .await
            .unwrap();
        assert!(collection.data.image.contains("/collections/romantic-getaways/"));

        let mut renamed = collection.data.clone();
        renamed.title = "Romantic Escapes".into();
        let updated = admin
            .submit_collection(Some(&collection.id), Submission::new(renamed))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.data.image, collection.data.image);

        admin.remove_collection(&collection.id).unwrap();
        assert!(admin.remove_collection(&collection.id).unwrap_err().is_not_found());

        let slide = admin
            .submit_slide(
                None,
                Submission::new(HeroSlide {
                    title: "Introducing Vio".into(),
                    button: "Experience the Future of Luxury".into(),
                    image: "/images/interior_style_design.jpg".into(),
                    position: 4,
                }),
            )
            .await
            .unwrap();
        assert!(admin.remove_slide(&slide.id).unwrap());
    }

    #[tokio::test]
    async fn test_standalone_upload_returns_public_url() {
        let admin = admin();
        let (path, url) = admin.upload_image("misc", "Banner", png("banner.png")).await.unwrap();
        assert!(path.starts_with("misc/banner/"));
        assert!(url.ends_with(&path));
        assert!(admin.gateway.blobs.exists(&path).await.unwrap());
    }

    #[test]
    fn test_offer_validation_and_update() {
        let admin = admin();
        let bad = Offer {
            title: "".into(),
            description: String::new(),
            code: "X".into(),
            kind: OfferType::BankOffer,
        };
        assert!(admin.submit_offer(None, bad, None).is_err());

        let offer = Offer {
            title: "HDFC".into(),
            description: "10% off".into(),
            code: "HDFC10".into(),
            kind: OfferType::BankOffer,
        };
        let saved = admin.submit_offer(None, offer.clone(), None).unwrap();
        let changed = Offer {
            kind: OfferType::StayvistaOffer,
            ..offer
        };
        let updated = admin.submit_offer(Some(&saved.id), changed, Some(1)).unwrap();
        assert_eq!(updated.data.kind, OfferType::StayvistaOffer);
        assert!(admin.remove_offer(&saved.id).unwrap());
        assert!(!admin.remove_offer(&saved.id).unwrap());
    }
}
