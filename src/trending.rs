//! Trending villas: ranked by bookings in a trailing window, with a
//! rating-sorted fallback when the window is empty.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::StoreError;
use crate::gateway::{window_start, Gateway};
use crate::models::{trees, Booking, Record, Villa, VillaCard};
use crate::query::{Direction, Query};

/// Location labels that mean "no filter".
const UNFILTERED: &[&str] = &["", "All", "Explore more"];

pub fn location_filter(location: Option<&str>) -> Option<&str> {
    location.filter(|l| !UNFILTERED.contains(l))
}

/// Count bookings per villa and keep the `limit` busiest, busiest first.
///
/// Ties keep first-seen order; there is no secondary sort key.
pub fn rank_by_bookings<'a, I>(villa_ids: I, limit: usize) -> Vec<(String, u32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<(String, u32)> = vec![];
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    for id in villa_ids {
        match index.get(id) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(id, counts.len());
                counts.push((id.to_string(), 1));
            }
        }
    }
    // sort_by is stable, so equal counts stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    counts
}

impl Gateway {
    /// Trending villas as of `now`.
    ///
    /// The location filter is applied after the top-N cut, so a filtered list
    /// can come back shorter than the limit, or empty, even when other matching
    /// villas have bookings.
    pub fn fetch_trending(&self, location: Option<&str>, now: DateTime<Utc>) -> Result<Vec<VillaCard>, StoreError> {
        let filter = location_filter(location);
        let since = window_start(now, self.trending.window_months);
        let q = Query::new().where_gte("bookingDate", since.to_rfc3339());
        let bookings: Vec<Record<Booking>> = self.storage.find(trees::BOOKINGS, &q)?;

        let ranked = rank_by_bookings(
            bookings.iter().map(|b| b.data.villa_id.as_str()),
            self.trending.limit,
        );

        if ranked.is_empty() {
            tracing::debug!(?filter, "no recent bookings, falling back to rating order");
            return self.trending_fallback(filter);
        }

        let mut cards = Vec::with_capacity(ranked.len());
        for (villa_id, count) in ranked {
            let Some(villa) = self.storage.get::<Villa>(trees::VILLAS, &villa_id)? else {
                tracing::debug!(villa_id = %villa_id, "booked villa no longer exists");
                continue;
            };
            // Post-cut filter: only the top-N ranked villas are candidates
            if let Some(loc) = filter {
                if !villa.data.location.contains(loc) {
                    continue;
                }
            }
            cards.push(VillaCard::from_record(&villa, count));
        }
        tracing::debug!(count = cards.len(), ?filter, "ranked trending villas");
        Ok(cards)
    }

    /// Rating order, exact location match (unlike the substring match above).
    fn trending_fallback(&self, filter: Option<&str>) -> Result<Vec<VillaCard>, StoreError> {
        let mut q = Query::new();
        if let Some(loc) = filter {
            q = q.where_eq("location", loc);
        }
        let q = q.order_by("rating", Direction::Desc).limit(self.trending.limit);
        let villas: Vec<Record<Villa>> = self.storage.find(trees::VILLAS, &q)?;
        Ok(villas.iter().map(|v| VillaCard::from_record(v, 0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::{test_gateway, villa};
    use chrono::Duration;

    fn book(gw: &Gateway, villa_id: &str, times: usize, days_ago: i64) {
        let when = Utc::now() - Duration::days(days_ago);
        for _ in 0..times {
            gw.create_booking(villa_id, Some(when), None, None).unwrap();
        }
    }

    #[test]
    fn test_rank_by_bookings_counts_and_orders() {
        let ranked = rank_by_bookings(["b", "a", "a", "c", "a", "b"], 10);
        assert_eq!(
            ranked,
            vec![("a".to_string(), 3), ("b".to_string(), 2), ("c".to_string(), 1)]
        );
    }

    #[test]
    fn test_rank_by_bookings_ties_keep_first_seen_order() {
        let ranked = rank_by_bookings(["x", "y", "z", "y", "x", "z"], 2);
        assert_eq!(ranked, vec![("x".to_string(), 2), ("y".to_string(), 2)]);
    }

    #[test]
    fn test_location_filter_labels() {
        assert_eq!(location_filter(None), None);
        assert_eq!(location_filter(Some("All")), None);
        assert_eq!(location_filter(Some("Explore more")), None);
        assert_eq!(location_filter(Some("Goa")), Some("Goa"));
    }

    #[test]
    fn test_three_bookings_outrank_one() {
        let gw = test_gateway();
        let a = gw.save_villa(villa("A", "Goa", 4.0)).unwrap();
        let b = gw.save_villa(villa("B", "Goa", 4.9)).unwrap();
        book(&gw, &b.id, 1, 5);
        book(&gw, &a.id, 3, 5);

        let trending = gw.fetch_trending(None, Utc::now()).unwrap();
        let ids: Vec<_> = trending.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(trending[0].booking_count, 3);
        assert_eq!(trending[1].booking_count, 1);
    }

    #[test]
    fn test_at_most_limit_and_non_increasing_counts() {
        let gw = test_gateway();
        for i in 0..14 {
            let v = gw.save_villa(villa(&format!("V{}", i), "Goa", 4.0)).unwrap();
            book(&gw, &v.id, (i % 5) + 1, 3);
        }
        let trending = gw.fetch_trending(None, Utc::now()).unwrap();
        assert_eq!(trending.len(), 10);
        assert!(trending.windows(2).all(|w| w[0].booking_count >= w[1].booking_count));
    }

    #[test]
    fn test_old_bookings_are_ignored_and_fallback_uses_rating() {
        let gw = test_gateway();
        let low = gw.save_villa(villa("Low", "Goa", 3.5)).unwrap();
        gw.save_villa(villa("High", "Goa", 4.9)).unwrap();
        gw.save_villa(villa("Mid", "Karjat, Maharashtra", 4.2)).unwrap();
        book(&gw, &low.id, 5, 120);

        let trending = gw.fetch_trending(None, Utc::now()).unwrap();
        let titles: Vec<_> = trending.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["High", "Mid", "Low"]);
        assert!(trending.iter().all(|c| c.booking_count == 0));
        assert!(trending.windows(2).all(|w| w[0].rating >= w[1].rating));
    }

    #[test]
    fn test_fallback_with_location_uses_exact_match() {
        let gw = test_gateway();
        gw.save_villa(villa("Goa One", "Goa", 4.1)).unwrap();
        gw.save_villa(villa("Karjat", "Karjat, Maharashtra", 4.9)).unwrap();

        let trending = gw.fetch_trending(Some("Goa"), Utc::now()).unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].title, "Goa One");
    }

    #[test]
    fn test_location_filter_applies_after_truncation() {
        let gw = test_gateway();
        // Ten busy villas outside Goa fill the top ten
        for i in 0..10 {
            let v = gw.save_villa(villa(&format!("Karjat {}", i), "Karjat, Maharashtra", 4.0)).unwrap();
            book(&gw, &v.id, 5, 2);
        }
        // A Goa villa with fewer bookings falls just outside the cut
        let goa = gw.save_villa(villa("Goa Beach", "Calangute, Goa", 4.9)).unwrap();
        book(&gw, &goa.id, 1, 2);

        let trending = gw.fetch_trending(Some("Goa"), Utc::now()).unwrap();
        assert!(trending.is_empty());

        let karjat = gw.fetch_trending(Some("Karjat"), Utc::now()).unwrap();
        assert_eq!(karjat.len(), 10);
        assert!(karjat.iter().all(|c| c.location.contains("Karjat")));
    }

    #[test]
    fn test_deleted_villas_are_skipped() {
        let gw = test_gateway();
        let gone = gw.save_villa(villa("Gone", "Goa", 4.0)).unwrap();
        let kept = gw.save_villa(villa("Kept", "Goa", 4.0)).unwrap();
        book(&gw, &gone.id, 2, 1);
        book(&gw, &kept.id, 1, 1);
        gw.delete_villa(&gone.id).unwrap();

        let trending = gw.fetch_trending(None, Utc::now()).unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].id, kept.id);
    }
}
