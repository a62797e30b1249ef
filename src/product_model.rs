//! Product record shape, identity and validation rules.
//!
//! Everything here is pure: functions take the collection as a slice and
//! never touch storage or handles.
//!
//! # Stored shape
//!
//! ```json
//! {
//!   "id": 1700000000000,
//!   "name": "Casa Sol",
//!   "description": "Linda casa con jardín",
//!   "propertyType": "house",
//!   "images": ["https://x/1.jpg", "blob:catalog/1b4e28ba-..."]
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::app_response::AppError;
use crate::image_handles::ImageRef;

pub const MIN_NAME_LEN: usize = 3;
pub const MIN_DESCRIPTION_LEN: usize = 5;

pub const MSG_TYPE_REQUIRED: &str = "Select a property type";
pub const MSG_NAME_REQUIRED: &str = "Name is required";
pub const MSG_NAME_TOO_SHORT: &str = "Name must be at least 3 characters";
pub const MSG_DESCRIPTION_REQUIRED: &str = "Description is required";
pub const MSG_DESCRIPTION_TOO_SHORT: &str = "Description must be at least 5 characters";
pub const MSG_IDS_EXHAUSTED: &str = "No product id is left after the largest stored id";

/// Record identity. Stored ids may be any JSON number or a string; both
/// compare by their string form, so `1700` and `"1700"` are the same product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductId {
    Number(Number),
    Text(String),
}

impl ProductId {
    /// True when `id` names this product.
    pub fn matches(&self, id: &str) -> bool {
        match self {
            ProductId::Number(n) => n.to_string() == id,
            ProductId::Text(s) => s == id,
        }
    }

    fn as_number(&self) -> Option<u64> {
        match self {
            ProductId::Number(n) => n.as_u64(),
            ProductId::Text(s) => s.parse().ok(),
        }
    }
}

impl From<u64> for ProductId {
    fn from(id: u64) -> Self {
        ProductId::Number(Number::from(id))
    }
}

impl PartialEq for ProductId {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ProductId {}

impl Display for ProductId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductId::Number(n) => write!(f, "{n}"),
            ProductId::Text(s) => f.write_str(s),
        }
    }
}

/// Known property types. The set is open: anything else is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    House,
    Apartment,
    Hotel,
    Other(String),
}

impl PropertyKind {
    /// Case- and whitespace-insensitive. The Spanish labels used by the
    /// first catalogs (`casa`, `departamento`) are accepted too.
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.trim().to_lowercase();
        match cleaned.as_str() {
            "house" | "casa" => PropertyKind::House,
            "apartment" | "departamento" => PropertyKind::Apartment,
            "hotel" => PropertyKind::Hotel,
            _ => PropertyKind::Other(cleaned),
        }
    }
}

/// A catalog entry.
///
/// Written with English camelCase keys; records saved by the first catalogs
/// (`nombre`, `descripcion`, `tipo`, `imagenes`) are read as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(alias = "descripcion")]
    pub description: String,
    #[serde(alias = "tipo")]
    pub property_type: String,
    #[serde(default, alias = "imagenes")]
    pub images: Vec<ImageRef>,
}

impl Product {
    pub fn kind(&self) -> PropertyKind {
        PropertyKind::parse(&self.property_type)
    }

    pub fn local_images(&self) -> impl Iterator<Item = &ImageRef> {
        self.images.iter().filter(|image| image.is_local())
    }
}

/// Hands out product ids: wall-clock milliseconds, bumped so that every id
/// is strictly greater than the previous one.
#[derive(Debug, Clone, Default)]
pub struct IdSequence {
    last: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence whose ids all sort after the numeric ids in `products`.
    pub fn starting_after(products: &[Product]) -> Self {
        let mut ids = Self::new();
        ids.observe(products);
        ids
    }

    /// Moves the sequence past every numeric id in `products`.
    pub fn observe(&mut self, products: &[Product]) {
        if let Some(max) = products.iter().filter_map(|p| p.id.as_number()).max() {
            self.last = self.last.max(max);
        }
    }

    /// Fails with a [`AppError::ConflictError`] once a stored id has reached
    /// `u64::MAX`.
    pub fn next_id(&mut self) -> Result<ProductId, AppError> {
        let after_last = self
            .last
            .checked_add(1)
            .ok_or_else(|| AppError::ConflictError(MSG_IDS_EXHAUSTED.to_string()))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.last = now.max(after_last);
        Ok(ProductId::from(self.last))
    }
}

/// Trim + lowercase form used for every name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Builds a record with trimmed text fields and a fresh id.
pub fn create_record(
    ids: &mut IdSequence,
    name: &str,
    description: &str,
    property_type: &str,
    images: Vec<ImageRef>,
) -> Result<Product, AppError> {
    Ok(Product {
        id: ids.next_id()?,
        name: name.trim().to_string(),
        description: description.trim().to_string(),
        property_type: property_type.trim().to_string(),
        images,
    })
}

/// Whether some product already uses `name`, ignoring case and surrounding
/// whitespace. A blank name never matches.
pub fn record_exists_by_name(products: &[Product], name: &str) -> bool {
    let wanted = normalize_name(name);
    if wanted.is_empty() {
        return false;
    }
    products.iter().any(|p| normalize_name(&p.name) == wanted)
}

pub fn find_by_id<'a>(products: &'a [Product], id: &str) -> Option<&'a Product> {
    products.iter().find(|p| p.id.matches(id))
}

fn validate_name(name: &str) -> Result<(), AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(MSG_NAME_REQUIRED.to_string()));
    }
    if trimmed.chars().count() < MIN_NAME_LEN {
        return Err(AppError::ValidationError(MSG_NAME_TOO_SHORT.to_string()));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), AppError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(MSG_DESCRIPTION_REQUIRED.to_string()));
    }
    if trimmed.chars().count() < MIN_DESCRIPTION_LEN {
        return Err(AppError::ValidationError(MSG_DESCRIPTION_TOO_SHORT.to_string()));
    }
    Ok(())
}

/// Checks property type, then name, then description, and returns the first
/// failure as a [`AppError::ValidationError`].
pub fn validate(name: &str, description: &str, property_type: &str) -> Result<(), AppError> {
    if property_type.trim().is_empty() {
        return Err(AppError::ValidationError(MSG_TYPE_REQUIRED.to_string()));
    }
    validate_name(name)?;
    validate_description(description)
}
