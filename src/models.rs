use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Names of the Sled trees, one per document collection.
pub mod trees {
    pub const VILLAS: &str = "villas";
    pub const COLLECTIONS: &str = "collections";
    pub const OFFERS: &str = "offers";
    pub const DESTINATIONS: &str = "destinations";
    pub const STARS: &str = "stars";
    pub const SLIDES: &str = "slides";
    pub const BOOKINGS: &str = "bookings";
    pub const USERS: &str = "users";
    /// Unique index: normalized email -> uid.
    pub const USERS_BY_EMAIL: &str = "users_by_email";
}

/// Nested item ids arrive as strings or integers (`{ "id": 1 }`); both are
/// stored as strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

/// Stored document envelope. Entity fields are flattened next to the
/// server-assigned id, version and timestamps, giving `{ id, ...fields }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record<T> {
    pub id: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeroImage {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Amenity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub price: Option<String>,
}

/// A bedroom or other photographed space.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MealsInfo {
    #[serde(default)]
    pub description1: String,
    #[serde(default)]
    pub description2: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Faq {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// Villa document. Only the name and location are required; everything else
/// defaults so partially filled admin forms still load.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Villa {
    #[serde(rename = "villaName")]
    pub name: String,
    pub location: String,
    /// Unchecked reference to a collection id.
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub guest_favorite: bool,
    #[serde(default)]
    pub max_guests: u32,
    #[serde(default)]
    pub rooms: u32,
    #[serde(default)]
    pub baths: u32,
    #[serde(default)]
    pub meals_available: bool,
    #[serde(default)]
    pub check_in_time: Option<String>,
    #[serde(default)]
    pub check_out_time: Option<String>,
    #[serde(default)]
    pub original_price: Option<u64>,
    #[serde(default)]
    pub discounted_price: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hero_images: Vec<HeroImage>,
    #[serde(default)]
    pub amenities: Vec<Amenity>,
    #[serde(default)]
    pub spaces: Vec<Space>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub meals_info: MealsInfo,
    #[serde(default)]
    pub experiences: String,
    #[serde(default)]
    pub faqs: Vec<Faq>,
}

impl Villa {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            collection: None,
            rating: 0.0,
            guest_favorite: false,
            max_guests: 0,
            rooms: 0,
            baths: 0,
            meals_available: false,
            check_in_time: None,
            check_out_time: None,
            original_price: None,
            discounted_price: 0,
            description: String::new(),
            hero_images: vec![],
            amenities: vec![],
            spaces: vec![],
            reviews: vec![],
            meals_info: MealsInfo::default(),
            experiences: String::new(),
            faqs: vec![],
        }
    }
}

/// Curated marketing grouping of villas. `villas` is denormalized and may
/// disagree with `Villa::collection`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Collection {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub villas: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferType {
    BankOffer,
    StayvistaOffer,
}

impl OfferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferType::BankOffer => "bank_offer",
            OfferType::StayvistaOffer => "stayvista_offer",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Offer {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: OfferType,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Destination {
    pub place: String,
    #[serde(default)]
    pub image: String,
}

/// Celebrity stay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Star {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeroSlide {
    pub title: String,
    #[serde(default)]
    pub button: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub position: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub villa_id: String,
    pub booking_date: DateTime<Utc>,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub guests: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

/// `users/{uid}` profile document.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// JWT claims.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // uid
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

/// Card shown in best-rated and trending lists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VillaCard {
    pub id: String,
    pub title: String,
    pub location: String,
    pub category: String,
    pub guests: u32,
    pub rooms: u32,
    pub baths: u32,
    pub rating: f32,
    pub price: String,
    pub original_price: Option<String>,
    pub image: String,
    pub booking_count: u32,
}

pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

impl VillaCard {
    pub fn from_record(record: &Record<Villa>, booking_count: u32) -> Self {
        let villa = &record.data;
        Self {
            id: record.id.clone(),
            title: villa.name.clone(),
            location: villa.location.clone(),
            category: villa
                .location
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            guests: villa.max_guests,
            rooms: villa.rooms,
            baths: villa.baths,
            rating: villa.rating,
            price: format_inr(villa.discounted_price),
            original_price: villa.original_price.map(format_inr),
            image: villa
                .hero_images
                .first()
                .map(|img| img.url.clone())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            booking_count,
        }
    }
}

/// Formats rupees with Indian digit grouping: the last three digits, then pairs.
pub fn format_inr(amount: u64) -> String {
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return format!("₹{}", digits);
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = vec![];
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("₹{},{}", groups.join(","), tail)
}
