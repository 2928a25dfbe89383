//! Load data script for StayVista
//!
//! Seeds the document store with a starter catalogue:
//! - collections, villas (linked both ways), offers, destinations, stars
//! - the four default hero slides
//! - recent bookings so the trending section has something to rank
//! - an admin account from ADMIN_EMAIL / ADMIN_PASSWORD, when set
//!
//! Run: cargo run --bin load_data

use chrono::{Duration, Utc};
use std::sync::Arc;

use stayvista::auth::Auth;
use stayvista::blob::FsBlobStore;
use stayvista::config::Config;
use stayvista::error::AuthError;
use stayvista::gateway::Gateway;
use stayvista::logging;
use stayvista::models::{
    Amenity, Collection, Destination, Faq, HeroImage, HeroSlide, Offer, OfferType, Review, Star,
    Villa,
};
use stayvista::storage::Storage;

const COLLECTION_DESCRIPTION: &str =
    "Heavenly villas in picturesque locations for your fairytale destination wedding.";

struct SeedVilla {
    name: &'static str,
    location: &'static str,
    guests: u32,
    rooms: u32,
    baths: u32,
    rating: f32,
    price: u64,
    old_price: u64,
    image: &'static str,
    collection: usize,
    bookings: usize,
}

const VILLAS: &[SeedVilla] = &[
    SeedVilla {
        name: "Two Villa",
        location: "Karjat, Maharashtra",
        guests: 9,
        rooms: 3,
        baths: 3,
        rating: 4.6,
        price: 12860,
        old_price: 15000,
        image: "/images/places/karjat2.jpg",
        collection: 0,
        bookings: 4,
    },
    SeedVilla {
        name: "Arhaan Farm",
        location: "New Delhi, Delhi",
        guests: 15,
        rooms: 5,
        baths: 5,
        rating: 4.9,
        price: 33445,
        old_price: 37050,
        image: "/images/places/delhi.jpg",
        collection: 2,
        bookings: 2,
    },
    SeedVilla {
        name: "Basalt",
        location: "Karjat, Maharashtra",
        guests: 15,
        rooms: 5,
        baths: 7,
        rating: 4.8,
        price: 24175,
        old_price: 27000,
        image: "/images/places/karjat.jpg",
        collection: 1,
        bookings: 6,
    },
    SeedVilla {
        name: "Cedar Haven - Nahan",
        location: "Kasauli, Himachal Pradesh",
        guests: 15,
        rooms: 5,
        baths: 5,
        rating: 4.8,
        price: 24175,
        old_price: 26750,
        image: "/images/places/himachal.jpg",
        collection: 1,
        bookings: 1,
    },
    SeedVilla {
        name: "Mist Valley",
        location: "Lonavala, Maharashtra",
        guests: 12,
        rooms: 4,
        baths: 4,
        rating: 4.7,
        price: 18990,
        old_price: 21500,
        image: "/images/places/lonavala.jpg",
        collection: 3,
        bookings: 3,
    },
    SeedVilla {
        name: "Casa Mar",
        location: "Alibaug, Maharashtra",
        guests: 10,
        rooms: 4,
        baths: 3,
        rating: 4.5,
        price: 16500,
        old_price: 19000,
        image: "/images/places/alibaug.jpg",
        collection: 4,
        bookings: 0,
    },
];

const COLLECTIONS: &[(&str, &str)] = &[
    ("Newly Launched", "/images/collections_sunset.jpg"),
    ("Romantic Getaways", "/images/collections_romantic.jpg"),
    ("Villas For Weddings", "/images/collections_weddings.jpg"),
    ("VEO by StayVista", "/images/collections_pool.webp"),
    ("Introducing Residences", "/images/collections_getaways.jpg"),
];

const SLIDES: &[(&str, &str, &str)] = &[
    ("Launching Vista Residences", "Boutique City Stays", "/images/interior_living_room.jpg"),
    ("Getaways At An Affordable", "Economy Stays For Everyone", "/images/interior_design_style.jpg"),
    ("Newly Launched Villas", "50% OFF on 2nd Night", "/images/interior_design_furniture_glass.jpg"),
    ("Introducing Vio", "Experience the Future of Luxury", "/images/interior_style_design.jpg"),
];

fn villa_from_seed(seed: &SeedVilla, collection_id: &str) -> Villa {
    Villa {
        collection: Some(collection_id.to_string()),
        rating: seed.rating,
        guest_favorite: seed.rating >= 4.8,
        max_guests: seed.guests,
        rooms: seed.rooms,
        baths: seed.baths,
        meals_available: true,
        check_in_time: Some("2:00 PM".into()),
        check_out_time: Some("11:00 AM".into()),
        original_price: Some(seed.old_price),
        discounted_price: seed.price,
        description: format!("{} is a private villa in {}.", seed.name, seed.location),
        hero_images: vec![HeroImage {
            id: "1".into(),
            name: seed.name.into(),
            url: seed.image.into(),
        }],
        amenities: vec![
            Amenity {
                id: "1".into(),
                label: "Private Pool".into(),
                icon: "pool".into(),
                price: None,
            },
            Amenity {
                id: "2".into(),
                label: "Wi-Fi".into(),
                icon: "wifi".into(),
                price: None,
            },
        ],
        reviews: vec![Review {
            id: "1".into(),
            name: "Guest".into(),
            text: "Beautiful property and very helpful staff.".into(),
        }],
        faqs: vec![Faq {
            id: "1".into(),
            question: "Are pets allowed?".into(),
            answer: "Yes, with prior intimation.".into(),
        }],
        ..Villa::new(seed.name, seed.location)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let _log_guards = logging::init(&config.log);

    // Open the same store the server uses
    let storage = Storage::open(&config.data_dir)?;
    let blobs = Arc::new(FsBlobStore::new(&config.blob_dir, &config.public_base_url));
    let gateway = Gateway::new(storage.clone(), blobs, config.trending);
    let auth = Auth::new(storage.clone(), &config.jwt_secret, config.token_ttl_secs, config.bcrypt_cost);

    match (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD")) {
        (Ok(email), Ok(password)) => match auth.create_admin(&email, &password) {
            Ok(uid) => println!("✅ Admin account {} created ({})", email, uid),
            Err(AuthError::EmailTaken(_)) => println!("ℹ️  Admin account {} already exists", email),
            Err(e) => return Err(e.into()),
        },
        _ => println!("ℹ️  ADMIN_EMAIL / ADMIN_PASSWORD not set, skipping admin account"),
    }

    if !gateway.fetch_villas()?.is_empty() {
        println!("ℹ️  Catalogue already seeded, nothing to do");
        storage.flush().await?;
        return Ok(());
    }

    let mut collection_ids = Vec::with_capacity(COLLECTIONS.len());
    for (title, image) in COLLECTIONS {
        let saved = gateway.save_collection(Collection {
            title: title.to_string(),
            description: COLLECTION_DESCRIPTION.to_string(),
            image: image.to_string(),
            villas: vec![],
        })?;
        collection_ids.push(saved.id);
    }

    // Villa -> collection link first, then the denormalized list on the collection
    let now = Utc::now();
    let mut members: Vec<Vec<String>> = vec![vec![]; COLLECTIONS.len()];
    let mut booking_count = 0;
    for seed in VILLAS {
        let saved = gateway.save_villa(villa_from_seed(seed, &collection_ids[seed.collection]))?;
        members[seed.collection].push(saved.id.clone());
        for i in 0..seed.bookings {
            let when = now - Duration::days(3 + 7 * i as i64);
            gateway.create_booking(&saved.id, Some(when), None, Some(seed.guests.min(6)))?;
            booking_count += 1;
        }
    }
    for (i, villas) in members.into_iter().enumerate() {
        let (title, image) = COLLECTIONS[i];
        gateway.update_collection(
            &collection_ids[i],
            &Collection {
                title: title.to_string(),
                description: COLLECTION_DESCRIPTION.to_string(),
                image: image.to_string(),
                villas,
            },
            Some(1),
        )?;
    }

    gateway.save_offer(Offer {
        title: "HSBC".into(),
        description: "Get 11% off (up to ₹3000) on your StayVista booking when you pay with an HSBC TravelOne Credit Card.".into(),
        code: "HSBCTRAVELONE".into(),
        kind: OfferType::BankOffer,
    })?;
    gateway.save_offer(Offer {
        title: "StayVista".into(),
        description: "Enjoy FLAT 50% OFF on 2nd night when you book our newly launched vistas for your next holiday adventure.".into(),
        code: "NEWVISTAS".into(),
        kind: OfferType::StayvistaOffer,
    })?;

    for place in ["Lonavala", "Alibaug", "Coorg", "Karjat", "Goa"] {
        gateway.save_destination(Destination {
            place: place.to_string(),
            image: format!("/images/destinations/{}.jpg", place.to_lowercase()),
        })?;
    }

    gateway.save_star(Star {
        name: "Vijay Deverakonda".into(),
        location: "The Waterwillow".into(),
        image: "/images/vijay.jpg".into(),
    })?;
    gateway.save_star(Star {
        name: "Ananya Panday".into(),
        location: "Villa Amarillo".into(),
        image: "/images/ananya.jpg".into(),
    })?;

    for (position, (title, button, image)) in SLIDES.iter().enumerate() {
        gateway.save_slide(HeroSlide {
            title: title.to_string(),
            button: button.to_string(),
            image: image.to_string(),
            position: position as u32 + 1,
        })?;
    }

    storage.flush().await?;

    println!(
        "✅ Loaded {} collections, {} villas, {} bookings, 2 offers, 5 destinations, 2 stars, {} slides",
        COLLECTIONS.len(),
        VILLAS.len(),
        booking_count,
        SLIDES.len()
    );

    let trending = gateway.fetch_trending(None, Utc::now())?;
    if let Some(top) = trending.first() {
        println!("✅ Trending now: {} ({} recent bookings)", top.title, top.booking_count);
    }

    Ok(())
}
