//! The product lifecycle manager.
//!
//! [`ProductCatalog`] owns the in-memory collection and is the only writer of
//! the stored one. Every mutation follows the same shape:
//!
//! 1. validate against the current snapshot
//! 2. mint handles for new files
//! 3. build the next collection without touching the current one
//! 4. write it to the store
//! 5. on success commit it in memory and release the superseded handles
//!    it no longer references;
//!    on failure release only the handles minted in step 2
//!
//! A handle referenced by the committed collection is therefore never
//! revoked, and a failed write never leaks a freshly minted one.
//!
//! Mutating calls take `&mut self`; callers serialize them.

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app_response::AppError;
use crate::catalog_config::CatalogConfig;
use crate::fallback_images::gallery_images;
use crate::image_handles::{
    revoke_local, to_resource_handles, FileRejection, HandleHost, ImageRef,
    LocalHandle, SelectedFile,
};
use crate::local_store::{KeyValueStore, KvBackend};
use crate::product_model::{
    create_record, find_by_id, normalize_name, record_exists_by_name, validate, IdSequence,
    Product,
};
use crate::sampling::random_sample;

pub const MSG_DUPLICATE_NAME: &str = "A product with that name already exists. Choose another name.";
pub const MSG_DUPLICATE_NAME_ON_UPDATE: &str = "Another product already has that name";
pub const MSG_NOT_FOUND: &str = "Product not found";
pub const MSG_CREATE_NOT_SAVED: &str = "Could not save the product to local storage";
pub const MSG_UPDATE_NOT_SAVED: &str = "Could not update the product in local storage";
pub const MSG_REMOVE_NOT_SAVED: &str = "Could not delete the product from local storage";
pub const MSG_CLEAR_NOT_SAVED: &str = "Could not delete the products";

/// Input of [`ProductCatalog::create`].
///
/// When `files` is non-empty its accepted entries become the images and
/// `external_urls` is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub property_type: String,
    #[serde(default)]
    pub files: Vec<SelectedFile>,
    #[serde(default)]
    pub external_urls: Vec<String>,
}

impl NewProduct {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        property_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            property_type: property_type.into(),
            ..Self::default()
        }
    }

    pub fn with_files(mut self, files: Vec<SelectedFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_external_urls<S: Into<String>>(mut self, urls: Vec<S>) -> Self {
        self.external_urls = urls.into_iter().map(Into::into).collect();
        self
    }
}

/// Input of [`ProductCatalog::update`]. `None` fields keep their value;
/// files and URLs are appended after the surviving images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub files: Vec<SelectedFile>,
    #[serde(default)]
    pub external_urls: Vec<String>,
}

pub struct ProductCatalog<B: KvBackend, H: HandleHost> {
    store: KeyValueStore<B>,
    host: H,
    config: CatalogConfig,
    ids: IdSequence,
    products: Vec<Product>,
}

impl<B: KvBackend, H: HandleHost> ProductCatalog<B, H> {
    /// Loads the collection stored under `config.storage_key`. A missing or
    /// unreadable payload loads as an empty catalog.
    pub fn open(store: KeyValueStore<B>, host: H, config: CatalogConfig) -> Self {
        let products: Vec<Product> = store.read(&config.storage_key, Vec::new());
        let ids = IdSequence::starting_after(&products);
        info!(
            "Catalog opened with {} products under \"{}\"",
            products.len(),
            config.storage_key
        );
        Self {
            store,
            host,
            config,
            ids,
            products,
        }
    }

    /// Current committed snapshot.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn find(&self, id: &str) -> Option<&Product> {
        find_by_id(&self.products, id)
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn store(&self) -> &KeyValueStore<B> {
        &self.store
    }

    /// Re-reads the stored collection, replacing the in-memory one.
    pub fn reload(&mut self) -> &[Product] {
        self.products = self.store.read(&self.config.storage_key, Vec::new());
        self.ids.observe(&self.products);
        &self.products
    }

    /// `feed_size` random distinct products.
    pub fn random_feed(&self) -> Vec<Product> {
        random_sample(&self.products, self.config.feed_size)
    }

    /// Images for a detail view, falling back to placeholders.
    pub fn gallery(&self, id: &str) -> Result<Vec<String>, AppError> {
        let product = self
            .find(id)
            .ok_or_else(|| AppError::NotFound(MSG_NOT_FOUND.to_string()))?;
        Ok(gallery_images(
            product,
            self.config.gallery_size,
            self.config.fallback_width,
            self.config.fallback_height,
        ))
    }

    pub fn create(&mut self, input: NewProduct) -> Result<Product, AppError> {
        self.create_reporting(input, |rejection| {
            warn!("[create] skipped file: {rejection}")
        })
    }

    /// [`ProductCatalog::create`], handing each rejected file to `on_reject`.
    pub fn create_reporting<F>(&mut self, input: NewProduct, on_reject: F) -> Result<Product, AppError>
    where
        F: FnMut(FileRejection),
    {
        validate(&input.name, &input.description, &input.property_type)?;

        if record_exists_by_name(&self.products, &input.name) {
            return Err(AppError::ConflictError(MSG_DUPLICATE_NAME.to_string()));
        }

        let mut product = create_record(
            &mut self.ids,
            &input.name,
            &input.description,
            &input.property_type,
            Vec::new(),
        )?;

        let minted = self.mint(&input.files, on_reject);
        product.images = if input.files.is_empty() {
            input.external_urls.into_iter().map(ImageRef::from).collect()
        } else {
            minted.iter().cloned().map(ImageRef::from).collect()
        };

        let mut next = self.products.clone();
        next.push(product.clone());

        if !self.persist(&next) {
            revoke_local(&mut self.host, &minted);
            return Err(AppError::PersistenceError(MSG_CREATE_NOT_SAVED.to_string()));
        }

        self.products = next;
        info!("Product {} \"{}\" created", product.id, product.name);
        Ok(product)
    }

    /// Applies `changes` to the product `id`.
    ///
    /// The product's previous local handles are always superseded: they are
    /// dropped from its image list and revoked once the write succeeds,
    /// unless the committed collection still references them (for example
    /// when `changes.external_urls` sends one back). External references
    /// survive.
    pub fn update(&mut self, id: &str, changes: ProductChanges) -> Result<Product, AppError> {
        let current = self
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(MSG_NOT_FOUND.to_string()))?;

        if let Some(new_name) = changes.name.as_deref() {
            let wanted = normalize_name(new_name);
            if !wanted.is_empty()
                && wanted != normalize_name(&current.name)
                && self
                    .products
                    .iter()
                    .any(|p| !p.id.matches(id) && normalize_name(&p.name) == wanted)
            {
                return Err(AppError::ConflictError(MSG_DUPLICATE_NAME_ON_UPDATE.to_string()));
            }
        }

        let name = changes.name.as_deref().unwrap_or(&current.name);
        let description = changes.description.as_deref().unwrap_or(&current.description);
        let property_type = changes
            .property_type
            .as_deref()
            .unwrap_or(&current.property_type);
        validate(name, description, property_type)?;

        let minted = self.mint(&changes.files, |rejection| {
            warn!("[update] skipped file: {rejection}")
        });

        let mut images: Vec<ImageRef> = current
            .images
            .iter()
            .filter(|image| !image.is_local())
            .cloned()
            .collect();
        images.extend(minted.iter().cloned().map(ImageRef::from));
        images.extend(changes.external_urls.iter().map(|url| ImageRef::from(url.as_str())));

        let updated = Product {
            id: current.id.clone(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            property_type: property_type.trim().to_string(),
            images,
        };

        let next: Vec<Product> = self
            .products
            .iter()
            .map(|p| if p.id.matches(id) { updated.clone() } else { p.clone() })
            .collect();

        if !self.persist(&next) {
            revoke_local(&mut self.host, &minted);
            return Err(AppError::PersistenceError(MSG_UPDATE_NOT_SAVED.to_string()));
        }

        self.products = next;
        self.release_unreferenced(current.local_images());
        info!("Product {} updated", updated.id);
        Ok(updated)
    }

    /// Deletes the product `id` and releases its local handles.
    pub fn remove(&mut self, id: &str) -> Result<Product, AppError> {
        let removed = self
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(MSG_NOT_FOUND.to_string()))?;

        let next: Vec<Product> = self
            .products
            .iter()
            .filter(|p| !p.id.matches(id))
            .cloned()
            .collect();

        if !self.persist(&next) {
            return Err(AppError::PersistenceError(MSG_REMOVE_NOT_SAVED.to_string()));
        }

        self.products = next;
        self.release_unreferenced(removed.local_images());
        info!("Product {} removed", removed.id);
        Ok(removed)
    }

    /// Empties the catalog, returning how many products were dropped.
    pub fn clear_all(&mut self) -> Result<usize, AppError> {
        let cleared = self
            .store
            .read_modify_write(&self.config.storage_key, |_: Vec<Product>| Vec::new(), Vec::new());
        if !cleared {
            return Err(AppError::PersistenceError(MSG_CLEAR_NOT_SAVED.to_string()));
        }

        let dropped = std::mem::take(&mut self.products);
        self.release_unreferenced(dropped.iter().flat_map(|p| p.local_images()));
        info!("Catalog cleared, {} products dropped", dropped.len());
        Ok(dropped.len())
    }

    fn mint<F>(&mut self, files: &[SelectedFile], on_reject: F) -> Vec<LocalHandle>
    where
        F: FnMut(FileRejection),
    {
        if files.is_empty() {
            return Vec::new();
        }
        to_resource_handles(&mut self.host, files, &self.config.upload, on_reject)
    }

    /// Revokes the local handles among `candidates` that no committed product
    /// references anymore. Must run after `self.products` was committed.
    fn release_unreferenced<'a, I>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = &'a ImageRef>,
    {
        let referenced: HashSet<&LocalHandle> = self
            .products
            .iter()
            .flat_map(|p| p.images.iter())
            .filter_map(ImageRef::as_local)
            .collect();

        let (kept, released): (Vec<&LocalHandle>, Vec<&LocalHandle>) = candidates
            .into_iter()
            .filter_map(ImageRef::as_local)
            .partition(|handle| referenced.contains(handle));

        if !kept.is_empty() {
            debug!("{} superseded handles are still referenced, keeping them", kept.len());
        }
        revoke_local(&mut self.host, released);
    }

    fn persist(&self, next: &[Product]) -> bool {
        self.store.write(&self.config.storage_key, next)
    }
}
