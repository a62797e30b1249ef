//! # Offline Catalog Core
//!
//! An offline-first product catalog engine (houses, apartments, hotels) for
//! host applications without a backend: browser shells, webviews and Flutter
//! apps. The whole catalog lives in local key-value storage and every image
//! preview handle it hands out is released exactly when the data that
//! references it goes away.
//!
//! ## Features
//!
//! - **Single-blob persistence**: the collection is one JSON document under a
//!   well-known key (`"productos"` by default), stored in LMDB
//! - **Commit-or-revert mutations**: in-memory state only changes after the
//!   store accepted the write
//! - **Leak-free previews**: local image handles are revoked on every exit
//!   path, and never while still referenced
//! - **Soft failure**: missing or corrupt storage loads as an empty catalog;
//!   every error comes back as a structured [`AppResponse`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use offline_catalog_core::{open_catalog, create_product, free_response};
//! use std::ffi::CString;
//!
//! let name = CString::new("my_catalog").unwrap();
//! let catalog = open_catalog(name.as_ptr(), std::ptr::null());
//!
//! let json = CString::new(
//!     r#"{"name":"Casa Sol","description":"Linda casa con jardín","propertyType":"house"}"#,
//! ).unwrap();
//! let response = create_product(catalog, json.as_ptr());
//! free_response(response as *mut _);
//! ```
//!
//! ## FFI Functions
//!
//! - [`open_catalog`] - Open the store and load the collection
//! - [`create_product`] - Validate and add a product
//! - [`update_product`] - Change fields or images of a product
//! - [`delete_product`] - Remove a product by id
//! - [`clear_products`] - Remove every product
//! - [`reload_products`] - Re-read the stored collection
//! - [`get_products`] / [`get_product_by_id`] - Read the committed snapshot
//! - [`random_products`] - Random feed for the homepage
//! - [`product_gallery`] - Detail-view images with placeholder fallback
//! - [`close_catalog`] - Release the catalog
//! - [`free_response`] - Release a returned string

pub mod app_response;
pub mod catalog_config;
pub mod fallback_images;
pub mod image_handles;
pub mod local_store;
pub mod product_catalog;
pub mod product_model;
pub mod sampling;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::Serialize;

pub use crate::app_response::{AppError, AppResponse};
pub use crate::catalog_config::CatalogConfig;
pub use crate::image_handles::{HandleHost, HandleRegistry, ImageRef, SelectedFile};
pub use crate::local_store::{KeyValueStore, KvBackend, LmdbBackend, MemoryBackend};
pub use crate::product_catalog::{NewProduct, ProductCatalog, ProductChanges};
pub use crate::product_model::{Product, ProductId};

/// The catalog as seen through the C ABI.
pub type CatalogState = ProductCatalog<LmdbBackend, HandleRegistry>;

/// Opens the catalog stored at `<name>.lmdb`.
///
/// `config_json` is an optional [`CatalogConfig`] document; pass null for
/// defaults.
///
/// # Returns
///
/// A pointer to the [`CatalogState`], or null if the name is invalid, the
/// config does not parse or the environment cannot be opened. Release it
/// with [`close_catalog`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn open_catalog(name: *const c_char, config_json: *const c_char) -> *mut CatalogState {
    let name = match c_ptr_to_string(name, "name") {
        Ok(name) => name,
        Err(e) => {
            warn!("open_catalog: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = if config_json.is_null() {
        CatalogConfig::default()
    } else {
        match c_ptr_to_string(config_json, "config").and_then(|json| CatalogConfig::from_json(&json)) {
            Ok(config) => config,
            Err(e) => {
                warn!("open_catalog: invalid config: {e}");
                return std::ptr::null_mut();
            }
        }
    };

    let backend = match LmdbBackend::open(&name, config.map_size) {
        Ok(backend) => backend,
        Err(e) => {
            warn!("❌ Failed to open catalog storage for '{name}': {e}");
            return std::ptr::null_mut();
        }
    };

    let host = HandleRegistry::new(config.handle_origin.clone());
    let catalog = ProductCatalog::open(KeyValueStore::new(backend), host, config);
    info!("✅ Catalog '{name}' ready");
    Box::into_raw(Box::new(catalog))
}

/// Creates a product.
///
/// # JSON Format
///
/// ```json
/// {
///   "name": "Casa Sol",
///   "description": "Linda casa con jardín",
///   "propertyType": "house",
///   "files": [{ "name": "front.png", "kind": "image/png", "data": [137, 80, 78, 71] }],
///   "externalUrls": ["https://x/1.jpg"]
/// }
/// ```
///
/// Responds with the created product as payload.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_product(state: *mut CatalogState, json_ptr: *const c_char) -> *const c_char {
    let catalog = match unsafe { state.as_mut() } {
        Some(catalog) => catalog,
        None => return null_state("create_product"),
    };

    let input: NewProduct = match parse_json(json_ptr) {
        Ok(input) => input,
        Err(e) => return error_to_c_string(&e),
    };

    response_to_c_string(&AppResponse::from(catalog.create(input)))
}

/// Updates the product `id` with a partial JSON document
/// (`name`, `description`, `propertyType`, `files`, `externalUrls`).
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_product(
    state: *mut CatalogState,
    id: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    let catalog = match unsafe { state.as_mut() } {
        Some(catalog) => catalog,
        None => return null_state("update_product"),
    };

    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(e) => return error_to_c_string(&e),
    };

    let changes: ProductChanges = match parse_json(json_ptr) {
        Ok(changes) => changes,
        Err(e) => return error_to_c_string(&e),
    };

    response_to_c_string(&AppResponse::from(catalog.update(&id, changes)))
}

/// Deletes the product `id`; responds with the removed product.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_product(state: *mut CatalogState, id: *const c_char) -> *const c_char {
    let catalog = match unsafe { state.as_mut() } {
        Some(catalog) => catalog,
        None => return null_state("delete_product"),
    };

    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(e) => return error_to_c_string(&e),
    };

    response_to_c_string(&AppResponse::from(catalog.remove(&id)))
}

/// Deletes every product; responds with the number removed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_products(state: *mut CatalogState) -> *const c_char {
    let catalog = match unsafe { state.as_mut() } {
        Some(catalog) => catalog,
        None => return null_state("clear_products"),
    };

    response_to_c_string(&AppResponse::from(catalog.clear_all()))
}

/// Re-reads the stored collection (for example after another window wrote
/// to it) and responds with it.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn reload_products(state: *mut CatalogState) -> *const c_char {
    let catalog = match unsafe { state.as_mut() } {
        Some(catalog) => catalog,
        None => return null_state("reload_products"),
    };

    response_to_c_string(&AppResponse::success(catalog.reload()))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_products(state: *mut CatalogState) -> *const c_char {
    let catalog = match unsafe { state.as_ref() } {
        Some(catalog) => catalog,
        None => return null_state("get_products"),
    };

    response_to_c_string(&AppResponse::success(catalog.products()))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_product_by_id(state: *mut CatalogState, id: *const c_char) -> *const c_char {
    let catalog = match unsafe { state.as_ref() } {
        Some(catalog) => catalog,
        None => return null_state("get_product_by_id"),
    };

    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(e) => return error_to_c_string(&e),
    };

    let found = catalog
        .find(&id)
        .ok_or_else(|| AppError::NotFound(format!("No product found with id: {id}")));
    response_to_c_string(&AppResponse::from(found))
}

/// Up to `count` random distinct products; `0` means the configured feed size.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn random_products(state: *mut CatalogState, count: u32) -> *const c_char {
    let catalog = match unsafe { state.as_ref() } {
        Some(catalog) => catalog,
        None => return null_state("random_products"),
    };

    let sample = if count == 0 {
        catalog.random_feed()
    } else {
        sampling::random_sample(catalog.products(), count as usize)
    };
    response_to_c_string(&AppResponse::success(sample))
}

/// Image URLs for the detail view of product `id`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn product_gallery(state: *mut CatalogState, id: *const c_char) -> *const c_char {
    let catalog = match unsafe { state.as_ref() } {
        Some(catalog) => catalog,
        None => return null_state("product_gallery"),
    };

    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(e) => return error_to_c_string(&e),
    };

    response_to_c_string(&AppResponse::from(catalog.gallery(&id)))
}

/// Drops the catalog and closes its storage. The pointer must not be used
/// afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_catalog(state: *mut CatalogState) -> *const c_char {
    if state.is_null() {
        return null_state("close_catalog");
    }

    let catalog = unsafe { Box::from_raw(state) };
    let count = catalog.products().len();
    drop(catalog);
    info!("Catalog closed ({count} products persisted)");
    response_to_c_string(&AppResponse::success("Catalog closed successfully"))
}

/// Releases a string returned by any function of this library.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}

/// Serializes `response` into a C string owned by the caller.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string<T: Serialize>(response: &AppResponse<T>) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

fn error_to_c_string(err: &AppError) -> *const c_char {
    response_to_c_string(&AppResponse::<()>::failure(err))
}

fn null_state(function: &str) -> *const c_char {
    error_to_c_string(&AppError::BadRequest(format!(
        "Null state pointer passed to {function}"
    )))
}

/// Converts a C string pointer to an owned `String`, rejecting null pointers
/// and invalid UTF-8.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, AppError> {
    if ptr.is_null() {
        return Err(AppError::BadRequest(format!("Null {field_name} pointer")));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => Err(AppError::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"))),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(json_ptr: *const c_char) -> Result<T, AppError> {
    let json = c_ptr_to_string(json_ptr, "JSON")?;
    serde_json::from_str(&json).map_err(|e| AppError::SerializationError(format!("Invalid JSON: {e}")))
}
