//! Data-access gateway: page-level reads and writes over the document store.
//!
//! Every operation returns a `Result`, so callers can tell an empty catalogue
//! from a failed read.

use chrono::{DateTime, Months, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::blob::{BlobStore, StoredBlob};
use crate::config::TrendingConfig;
use crate::error::StoreError;
use crate::models::{
    trees, Booking, Collection, Destination, HeroSlide, Offer, OfferType, Record, Star, Villa,
    VillaCard,
};
use crate::query::{Direction, Query};
use crate::storage::{entity_name, Storage};

/// Best-rated always shows this many cards, independent of the trending limit.
pub const BEST_RATED_LIMIT: usize = 10;

/// Run synchronous store work on the blocking pool. A panic inside `f`
/// comes back as an error.
pub async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

/// Offer tab selection. `"All"` (or nothing) shows every offer, `"Bank offers"`
/// shows bank offers, and any other label shows StayVista offers.
pub fn parse_offer_filter(label: Option<&str>) -> Option<OfferType> {
    match label.map(str::trim) {
        None | Some("") | Some("All") => None,
        Some("Bank offers") | Some("bank_offer") => Some(OfferType::BankOffer),
        Some(_) => Some(OfferType::StayvistaOffer),
    }
}

/// Everything the landing page shows, loaded in one fan-out.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    pub slides: Vec<Record<HeroSlide>>,
    pub collections: Vec<Record<Collection>>,
    pub trending: Vec<VillaCard>,
    pub best_rated: Vec<VillaCard>,
    pub destinations: Vec<Record<Destination>>,
    pub offers: Vec<Record<Offer>>,
    pub stars: Vec<Record<Star>>,
}

/// Disagreement between `Collection::villas` and `Villa::collection`.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDrift {
    /// Listed on the collection but the villa points elsewhere (or nowhere).
    pub listed_only: Vec<String>,
    /// The villa points at the collection but isn't listed on it.
    pub tagged_only: Vec<String>,
}

#[derive(Clone)]
pub struct Gateway {
    pub(crate) storage: Storage,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) trending: TrendingConfig,
}

impl Gateway {
    pub fn new(storage: Storage, blobs: Arc<dyn BlobStore>, trending: TrendingConfig) -> Self {
        Self {
            storage,
            blobs,
            trending,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // --- generic helpers ---

    fn list<T: DeserializeOwned>(&self, tree: &str) -> Result<Vec<Record<T>>, StoreError> {
        let records = self.storage.all(tree)?;
        tracing::debug!(tree, count = records.len(), "fetched documents");
        Ok(records)
    }

    fn save<T: Serialize>(&self, tree: &'static str, data: T) -> Result<Record<T>, StoreError> {
        let record = self.storage.insert(tree, data)?;
        tracing::info!(tree, id = %record.id, "created {}", entity_name(tree));
        Ok(record)
    }

    fn replace<T>(
        &self,
        tree: &'static str,
        id: &str,
        data: &T,
        expected_version: Option<u64>,
    ) -> Result<Record<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let record = self
            .storage
            .update(tree, id, serde_json::to_value(data)?, expected_version)?;
        tracing::info!(tree, id, version = record.version, "updated {}", entity_name(tree));
        Ok(record)
    }

    fn remove(&self, tree: &'static str, id: &str) -> Result<bool, StoreError> {
        let existed = self.storage.delete(tree, id)?;
        if existed {
            tracing::info!(tree, id, "deleted {}", entity_name(tree));
        } else {
            tracing::warn!(tree, id, "delete of missing {} ignored", entity_name(tree));
        }
        Ok(existed)
    }

    // --- collections ---

    pub fn fetch_collections(&self) -> Result<Vec<Record<Collection>>, StoreError> {
        self.list(trees::COLLECTIONS)
    }

    pub fn fetch_collection_by_id(&self, id: &str) -> Result<Option<Record<Collection>>, StoreError> {
        self.storage.get(trees::COLLECTIONS, id)
    }

    pub fn save_collection(&self, collection: Collection) -> Result<Record<Collection>, StoreError> {
        self.save(trees::COLLECTIONS, collection)
    }

    pub fn update_collection(
        &self,
        id: &str,
        collection: &Collection,
        expected_version: Option<u64>,
    ) -> Result<Record<Collection>, StoreError> {
        self.replace(trees::COLLECTIONS, id, collection, expected_version)
    }

    /// Unlike villas, deleting a missing collection is an error.
    pub fn delete_collection(&self, id: &str) -> Result<(), StoreError> {
        if self.remove(trees::COLLECTIONS, id)? {
            Ok(())
        } else {
            Err(StoreError::not_found("collection", id))
        }
    }

    /// Report where the two collection links disagree. Neither side is treated
    /// as authoritative.
    pub fn collection_drift(&self, id: &str) -> Result<CollectionDrift, StoreError> {
        let collection = self
            .fetch_collection_by_id(id)?
            .ok_or_else(|| StoreError::not_found("collection", id))?;
        let tagged: Vec<String> = self
            .fetch_villas_by_collection(id)?
            .into_iter()
            .map(|v| v.id)
            .collect();
        let listed = &collection.data.villas;
        Ok(CollectionDrift {
            listed_only: listed.iter().filter(|v| !tagged.contains(v)).cloned().collect(),
            tagged_only: tagged.iter().filter(|v| !listed.contains(v)).cloned().collect(),
        })
    }

    // --- villas ---

    pub fn fetch_villas(&self) -> Result<Vec<Record<Villa>>, StoreError> {
        self.list(trees::VILLAS)
    }

    pub fn fetch_villa_by_id(&self, id: &str) -> Result<Option<Record<Villa>>, StoreError> {
        self.storage.get(trees::VILLAS, id)
    }

    pub fn fetch_villas_by_collection(&self, collection_id: &str) -> Result<Vec<Record<Villa>>, StoreError> {
        let q = Query::new().where_eq("collection", collection_id);
        self.storage.find(trees::VILLAS, &q)
    }

    /// Top-rated villas, optionally restricted to an exact location.
    pub fn fetch_best_rated(&self, category: Option<&str>) -> Result<Vec<VillaCard>, StoreError> {
        let mut q = Query::new();
        if let Some(category) = category.filter(|c| !c.is_empty() && *c != "All") {
            q = q.where_eq("location", category);
        }
        let q = q.order_by("rating", Direction::Desc).limit(BEST_RATED_LIMIT);
        let villas: Vec<Record<Villa>> = self.storage.find(trees::VILLAS, &q)?;
        Ok(villas.iter().map(|v| VillaCard::from_record(v, 0)).collect())
    }

    /// Every villa location, in store order, duplicates included.
    pub fn fetch_villa_locations(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .fetch_villas()?
            .into_iter()
            .map(|v| v.data.location)
            .filter(|l| !l.is_empty())
            .collect())
    }

    pub fn save_villa(&self, villa: Villa) -> Result<Record<Villa>, StoreError> {
        self.save(trees::VILLAS, villa)
    }

    pub fn update_villa(
        &self,
        id: &str,
        villa: &Villa,
        expected_version: Option<u64>,
    ) -> Result<Record<Villa>, StoreError> {
        self.replace(trees::VILLAS, id, villa, expected_version)
    }

    /// Deleting a villa that doesn't exist succeeds and does nothing.
    pub fn delete_villa(&self, id: &str) -> Result<(), StoreError> {
        self.remove(trees::VILLAS, id).map(|_| ())
    }

    // --- offers ---

    pub fn fetch_offers(&self, filter: Option<OfferType>) -> Result<Vec<Record<Offer>>, StoreError> {
        match filter {
            Some(kind) => {
                let q = Query::new().where_eq("type", kind.as_str());
                self.storage.find(trees::OFFERS, &q)
            }
            None => self.list(trees::OFFERS),
        }
    }

    pub fn save_offer(&self, offer: Offer) -> Result<Record<Offer>, StoreError> {
        self.save(trees::OFFERS, offer)
    }

    pub fn update_offer(&self, id: &str, offer: &Offer, expected_version: Option<u64>) -> Result<Record<Offer>, StoreError> {
        self.replace(trees::OFFERS, id, offer, expected_version)
    }

    pub fn delete_offer(&self, id: &str) -> Result<bool, StoreError> {
        self.remove(trees::OFFERS, id)
    }

    // --- destinations, stars, slides ---

    pub fn fetch_destinations(&self) -> Result<Vec<Record<Destination>>, StoreError> {
        self.list(trees::DESTINATIONS)
    }

    pub fn save_destination(&self, destination: Destination) -> Result<Record<Destination>, StoreError> {
        self.save(trees::DESTINATIONS, destination)
    }

    pub fn update_destination(
        &self,
        id: &str,
        destination: &Destination,
        expected_version: Option<u64>,
    ) -> Result<Record<Destination>, StoreError> {
        self.replace(trees::DESTINATIONS, id, destination, expected_version)
    }

    pub fn delete_destination(&self, id: &str) -> Result<bool, StoreError> {
        self.remove(trees::DESTINATIONS, id)
    }

    pub fn fetch_stars(&self) -> Result<Vec<Record<Star>>, StoreError> {
        self.list(trees::STARS)
    }

    pub fn save_star(&self, star: Star) -> Result<Record<Star>, StoreError> {
        self.save(trees::STARS, star)
    }

    pub fn update_star(&self, id: &str, star: &Star, expected_version: Option<u64>) -> Result<Record<Star>, StoreError> {
        self.replace(trees::STARS, id, star, expected_version)
    }

    pub fn delete_star(&self, id: &str) -> Result<bool, StoreError> {
        self.remove(trees::STARS, id)
    }

    /// Hero slides in display order.
    pub fn fetch_slides(&self) -> Result<Vec<Record<HeroSlide>>, StoreError> {
        let q = Query::new().order_by("position", Direction::Asc);
        self.storage.find(trees::SLIDES, &q)
    }

    pub fn save_slide(&self, slide: HeroSlide) -> Result<Record<HeroSlide>, StoreError> {
        self.save(trees::SLIDES, slide)
    }

    pub fn update_slide(&self, id: &str, slide: &HeroSlide, expected_version: Option<u64>) -> Result<Record<HeroSlide>, StoreError> {
        self.replace(trees::SLIDES, id, slide, expected_version)
    }

    pub fn delete_slide(&self, id: &str) -> Result<bool, StoreError> {
        self.remove(trees::SLIDES, id)
    }

    // --- bookings ---

    pub fn create_booking(
        &self,
        villa_id: &str,
        booking_date: Option<DateTime<Utc>>,
        guest_name: Option<String>,
        guests: Option<u32>,
    ) -> Result<Record<Booking>, StoreError> {
        if villa_id.trim().is_empty() {
            return Err(StoreError::Invalid("booking: villaId is required".into()));
        }
        let booking = Booking {
            villa_id: villa_id.to_string(),
            booking_date: booking_date.unwrap_or_else(Utc::now),
            guest_name,
            guests,
        };
        self.save(trees::BOOKINGS, booking)
    }

    pub fn fetch_bookings_for_villa(&self, villa_id: &str) -> Result<Vec<Record<Booking>>, StoreError> {
        let q = Query::new().where_eq("villaId", villa_id);
        self.storage.find(trees::BOOKINGS, &q)
    }

    /// Bookings made in the last `months` calendar months, newest first.
    pub fn fetch_recent_bookings(&self, months: u32, now: DateTime<Utc>) -> Result<Vec<Record<Booking>>, StoreError> {
        let q = Query::new()
            .where_gte("bookingDate", window_start(now, months).to_rfc3339())
            .order_by("bookingDate", Direction::Desc);
        self.storage.find(trees::BOOKINGS, &q)
    }

    // --- blobs ---

    pub async fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<StoredBlob, StoreError> {
        self.blobs.put(path, bytes).await
    }

    /// Write an image at `path` and return its public URL. Existing blobs at
    /// the same path are overwritten.
    pub async fn upload_image(&self, bytes: &[u8], path: &str) -> Result<String, StoreError> {
        Ok(self.upload_blob(path, bytes).await?.url)
    }

    pub async fn delete_blob(&self, path: &str) -> Result<(), StoreError> {
        self.blobs.delete(path).await
    }

    // --- fan-out ---

    /// Run `f` against a clone of this gateway on the blocking pool.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Gateway) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let gateway = self.clone();
        run_blocking(move || f(gateway)).await
    }

    /// Loads every landing-page section concurrently; fails if any section fails.
    pub async fn home_page(&self, location: Option<&str>, now: DateTime<Utc>) -> Result<HomePage, StoreError> {
        let trending_loc = location.map(str::to_string);
        let best_loc = trending_loc.clone();
        let (slides, collections, trending, best_rated, destinations, offers, stars) = tokio::try_join!(
            self.blocking(|gw| gw.fetch_slides()),
            self.blocking(|gw| gw.fetch_collections()),
            self.blocking(move |gw| gw.fetch_trending(trending_loc.as_deref(), now)),
            self.blocking(move |gw| gw.fetch_best_rated(best_loc.as_deref())),
            self.blocking(|gw| gw.fetch_destinations()),
            self.blocking(|gw| gw.fetch_offers(None)),
            self.blocking(|gw| gw.fetch_stars()),
        )?;
        Ok(HomePage {
            slides,
            collections,
            trending,
            best_rated,
            destinations,
            offers,
            stars,
        })
    }
}

/// Start of a trailing window of `months` calendar months.
pub fn window_start(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blob::tests::temp_blob_store;

    pub fn test_gateway() -> Gateway {
        Gateway::new(
            Storage::temporary().expect("temporary storage"),
            Arc::new(temp_blob_store()),
            TrendingConfig::default(),
        )
    }

    pub fn villa(name: &str, location: &str, rating: f32) -> Villa {
        Villa {
            rating,
            discounted_price: 24175,
            original_price: Some(27000),
            max_guests: 15,
            rooms: 5,
            baths: 5,
            ..Villa::new(name, location)
        }
    }

    fn offer(title: &str, kind: OfferType) -> Offer {
        Offer {
            title: title.into(),
            description: "Flat 10% off".into(),
            code: title.to_uppercase(),
            kind,
        }
    }

    #[test]
    fn test_save_then_fetch_villa_round_trip() {
        let gw = test_gateway();
        let mut input = villa("Basalt", "Karjat, Maharashtra", 4.8);
        input.description = "Basalt stone villa".into();
        input.collection = Some("romantic-getaways".into());
        input.faqs.push(crate::models::Faq {
            id: "1".into(),
            question: "Pets?".into(),
            answer: "Yes".into(),
        });

        let saved = gw.save_villa(input.clone()).unwrap();
        let fetched = gw.fetch_villa_by_id(&saved.id).unwrap().unwrap();
        assert_eq!(fetched.data, input);
    }

    #[test]
    fn test_fetch_missing_villa_is_none() {
        let gw = test_gateway();
        assert!(gw.fetch_villa_by_id("missing").unwrap().is_none());
        assert!(gw.fetch_collection_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_villa_is_noop() {
        let gw = test_gateway();
        assert!(gw.delete_villa("missing").is_ok());

        let saved = gw.save_villa(villa("Two Villa", "Karjat, Maharashtra", 4.6)).unwrap();
        gw.delete_villa(&saved.id).unwrap();
        assert!(gw.fetch_villa_by_id(&saved.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_collection_is_not_found() {
        let gw = test_gateway();
        let err = gw.delete_collection("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_villas_by_collection_uses_villa_field() {
        let gw = test_gateway();
        let mut a = villa("A", "Goa", 4.0);
        a.collection = Some("c1".into());
        let a = gw.save_villa(a).unwrap();
        gw.save_villa(villa("B", "Goa", 4.0)).unwrap();

        let found = gw.fetch_villas_by_collection("c1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }

    #[test]
    fn test_collection_drift_reports_both_sides() {
        let gw = test_gateway();
        let mut tagged = villa("Tagged", "Goa", 4.0);
        tagged.collection = Some("pending".into());
        let listed = gw.save_villa(villa("Listed", "Goa", 4.0)).unwrap();

        let collection = gw
            .save_collection(Collection {
                title: "Weddings".into(),
                description: String::new(),
                image: String::new(),
                villas: vec![listed.id.clone()],
            })
            .unwrap();
        tagged.collection = Some(collection.id.clone());
        let tagged = gw.save_villa(tagged).unwrap();

        let drift = gw.collection_drift(&collection.id).unwrap();
        assert_eq!(drift.listed_only, vec![listed.id]);
        assert_eq!(drift.tagged_only, vec![tagged.id]);
    }

    #[test]
    fn test_best_rated_orders_and_filters() {
        let gw = test_gateway();
        gw.save_villa(villa("Low", "Goa", 3.9)).unwrap();
        gw.save_villa(villa("High", "Goa", 4.9)).unwrap();
        gw.save_villa(villa("Elsewhere", "Karjat, Maharashtra", 5.0)).unwrap();

        let all = gw.fetch_best_rated(Some("All")).unwrap();
        let titles: Vec<_> = all.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Elsewhere", "High", "Low"]);

        let goa = gw.fetch_best_rated(Some("Goa")).unwrap();
        assert_eq!(goa.len(), 2);
        assert!(goa.iter().all(|c| c.location == "Goa"));
        assert_eq!(goa[0].price, "₹24,175");
    }

    #[test]
    fn test_best_rated_caps_at_limit() {
        let gw = test_gateway();
        for i in 0..14 {
            gw.save_villa(villa(&format!("V{}", i), "Goa", 3.0 + i as f32 / 10.0)).unwrap();
        }
        assert_eq!(gw.fetch_best_rated(None).unwrap().len(), 10);
    }

    #[test]
    fn test_best_rated_ignores_trending_limit() {
        let gw = Gateway::new(
            Storage::temporary().expect("temporary storage"),
            Arc::new(temp_blob_store()),
            TrendingConfig {
                window_months: 3,
                limit: 3,
            },
        );
        for i in 0..12 {
            let saved = gw.save_villa(villa(&format!("V{}", i), "Goa", 3.0 + i as f32 / 10.0)).unwrap();
            gw.create_booking(&saved.id, Some(Utc::now()), None, None).unwrap();
        }
        assert_eq!(gw.fetch_trending(None, Utc::now()).unwrap().len(), 3);
        let best = gw.fetch_best_rated(None).unwrap();
        assert_eq!(best.len(), BEST_RATED_LIMIT);
        assert_eq!(best[0].title, "V11");
    }

    #[tokio::test]
    async fn test_run_blocking_reports_panics_as_errors() {
        let ok = run_blocking(|| Ok(7)).await.unwrap();
        assert_eq!(ok, 7);
        let err = run_blocking::<(), _>(|| panic!("store worker died")).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_offer_filters() {
        let gw = test_gateway();
        gw.save_offer(offer("hdfc", OfferType::BankOffer)).unwrap();
        gw.save_offer(offer("monsoon", OfferType::StayvistaOffer)).unwrap();

        assert_eq!(gw.fetch_offers(parse_offer_filter(Some("All"))).unwrap().len(), 2);
        let bank = gw.fetch_offers(parse_offer_filter(Some("Bank offers"))).unwrap();
        assert_eq!(bank.len(), 1);
        assert_eq!(bank[0].data.title, "hdfc");
        let sv = gw.fetch_offers(parse_offer_filter(Some("StayVista offers"))).unwrap();
        assert_eq!(sv[0].data.title, "monsoon");
    }

    #[test]
    fn test_recent_bookings_window() {
        let gw = test_gateway();
        let now = Utc::now();
        gw.create_booking("v1", Some(now - chrono::Duration::days(10)), None, None).unwrap();
        gw.create_booking("v1", Some(now - chrono::Duration::days(200)), None, None).unwrap();
        gw.create_booking("v2", None, Some("Asha".into()), Some(4)).unwrap();

        let recent = gw.fetch_recent_bookings(3, now + chrono::Duration::seconds(5)).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].data.villa_id, "v2");
        assert_eq!(gw.fetch_bookings_for_villa("v1").unwrap().len(), 2);
        assert!(gw.create_booking(" ", None, None, None).is_err());
    }

    #[test]
    fn test_slides_sorted_by_position() {
        let gw = test_gateway();
        for (title, position) in [("third", 3), ("first", 1), ("second", 2)] {
            gw.save_slide(HeroSlide {
                title: title.into(),
                button: String::new(),
                image: String::new(),
                position,
            })
            .unwrap();
        }
        let titles: Vec<_> = gw
            .fetch_slides()
            .unwrap()
            .into_iter()
            .map(|s| s.data.title)
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_window_start_is_calendar_months() {
        let now = DateTime::parse_from_rfc3339("2026-05-31T12:00:00Z").unwrap().with_timezone(&Utc);
        let start = window_start(now, 3);
        assert_eq!(start.to_rfc3339(), "2026-02-28T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_home_page_fans_out() {
        let gw = test_gateway();
        gw.save_villa(villa("Basalt", "Karjat, Maharashtra", 4.8)).unwrap();
        gw.save_offer(offer("hdfc", OfferType::BankOffer)).unwrap();
        gw.save_star(Star {
            name: "A Star".into(),
            location: "Goa".into(),
            image: String::new(),
        })
        .unwrap();

        let home = gw.home_page(None, Utc::now()).await.unwrap();
        assert_eq!(home.best_rated.len(), 1);
        assert_eq!(home.trending.len(), 1);
        assert_eq!(home.trending[0].booking_count, 0);
        assert_eq!(home.offers.len(), 1);
        assert_eq!(home.stars.len(), 1);
        assert!(home.collections.is_empty());
    }

    #[tokio::test]
    async fn test_upload_image_overwrites_same_path() {
        let gw = test_gateway();
        let url = gw.upload_image(crate::blob::tests::PNG, "villas/basalt/hero-1").await.unwrap();
        assert!(url.ends_with("/blobs/villas/basalt/hero-1"));
        let again = gw.upload_blob("villas/basalt/hero-1", crate::blob::tests::JPEG).await.unwrap();
        assert!(!again.created);
    }
}
