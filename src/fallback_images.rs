//! Placeholder imagery for products saved without pictures.
//!
//! Output is deterministic for a given seed, so a product seeded by its id
//! shows the same gallery on every render.

use crate::image_handles::ImageRef;
use crate::product_model::{Product, PropertyKind};

const HOUSE_IMAGES: &[&str] = &[
    "https://cdn.pixabay.com/photo/2016/11/29/05/08/architecture-1867187_1280.jpg",
    "https://cdn.pixabay.com/photo/2017/08/06/11/40/house-2593570_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/house-1836070_1280.jpg",
    "https://cdn.pixabay.com/photo/2017/03/28/12/10/house-2187170_1280.jpg",
    "https://cdn.pixabay.com/photo/2015/03/26/09/54/house-690189_1280.jpg",
];

const APARTMENT_IMAGES: &[&str] = &[
    "https://cdn.pixabay.com/photo/2016/11/18/14/54/apartment-1836070_1280.jpg",
    "https://cdn.pixabay.com/photo/2017/01/16/19/40/apartment-1989341_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/building-1836071_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/29/05/08/architecture-1867187_1280.jpg",
    "https://cdn.pixabay.com/photo/2017/08/06/11/40/house-2593570_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/house-1836070_1280.jpg",
    "https://cdn.pixabay.com/photo/2017/03/28/12/10/house-2187170_1280.jpg",
    "https://cdn.pixabay.com/photo/2015/03/26/09/54/house-690189_1280.jpg",
];

const HOTEL_IMAGES: &[&str] = &[
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/hotel-1836074_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/lobby-1836075_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/room-1836076_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/pool-1836077_1280.jpg",
    "https://cdn.pixabay.com/photo/2016/11/18/15/07/restaurant-1836078_1280.jpg",
];

/// `count` image URLs for a property type.
///
/// Known types cycle through a fixed list; unknown ones get seeded
/// `picsum.photos` URLs of the requested size.
pub fn images_for_property_type(
    property_type: &str,
    count: usize,
    width: u32,
    height: u32,
    seed: &str,
) -> Vec<String> {
    let base: &[&str] = match PropertyKind::parse(property_type) {
        PropertyKind::House => HOUSE_IMAGES,
        PropertyKind::Apartment => APARTMENT_IMAGES,
        PropertyKind::Hotel => HOTEL_IMAGES,
        PropertyKind::Other(_) => {
            return (0..count)
                .map(|i| format!("https://picsum.photos/seed/{seed}-{i}/{width}/{height}"))
                .collect();
        }
    };

    base.iter()
        .cycle()
        .take(count)
        .map(|url| url.to_string())
        .collect()
}

/// What a detail view shows: the product's own first `max` images, or
/// placeholders for its type seeded by its id when it has none.
pub fn gallery_images(product: &Product, max: usize, width: u32, height: u32) -> Vec<String> {
    let own: Vec<String> = product
        .images
        .iter()
        .map(ImageRef::as_str)
        .filter(|url| !url.is_empty())
        .take(max)
        .map(str::to_string)
        .collect();

    if !own.is_empty() {
        return own;
    }

    images_for_property_type(
        &product.property_type,
        max,
        width,
        height,
        &product.id.to_string(),
    )
}
