//! Preview handles for uploaded image files.
//!
//! A product image is either a durable external URL or a revocable local
//! handle (`blob:<origin>/<token>`) standing in for file bytes held by the
//! host. Only local handles are ever revoked; external references are never
//! touched.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved prefix of every local handle.
pub const LOCAL_HANDLE_PREFIX: &str = "blob:";

/// Returns true when `reference` is a revocable local handle.
pub fn is_local_handle(reference: &str) -> bool {
    reference.starts_with(LOCAL_HANDLE_PREFIX)
}

/// A minted, revocable reference to file bytes held by a [`HandleHost`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalHandle(String);

impl LocalHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LocalHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a product's image list.
///
/// Persisted as a plain string; the variant is decided once when the string
/// is parsed and never re-sniffed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageRef {
    Local(LocalHandle),
    External(String),
}

impl ImageRef {
    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Local(handle) => handle.as_str(),
            ImageRef::External(url) => url,
        }
    }

    pub fn as_local(&self) -> Option<&LocalHandle> {
        match self {
            ImageRef::Local(handle) => Some(handle),
            ImageRef::External(_) => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ImageRef::Local(_))
    }
}

impl From<String> for ImageRef {
    fn from(reference: String) -> Self {
        if is_local_handle(&reference) {
            ImageRef::Local(LocalHandle(reference))
        } else {
            ImageRef::External(reference)
        }
    }
}

impl From<&str> for ImageRef {
    fn from(reference: &str) -> Self {
        ImageRef::from(reference.to_string())
    }
}

impl From<LocalHandle> for ImageRef {
    fn from(handle: LocalHandle) -> Self {
        ImageRef::Local(handle)
    }
}

impl From<ImageRef> for String {
    fn from(image: ImageRef) -> Self {
        match image {
            ImageRef::Local(handle) => handle.0,
            ImageRef::External(url) => url,
        }
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file picked by the user: name, MIME kind and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Per-file acceptance rules applied before a handle is minted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConstraints {
    /// Maximum size in bytes; `None` means unlimited.
    #[serde(default)]
    pub max_size: Option<u64>,
    /// Accepted MIME kinds; empty accepts everything.
    #[serde(default)]
    pub allowed_kinds: Vec<String>,
}

/// Why a single file was skipped during conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRejection {
    TooLarge { name: String, size: u64, max_size: u64 },
    UnsupportedKind { name: String, kind: String },
    HostFailure { name: String, reason: String },
}

impl Display for FileRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileRejection::TooLarge { name, size, max_size } => {
                write!(f, "File too large: {name} ({size} bytes, max {max_size})")
            }
            FileRejection::UnsupportedKind { name, kind } => {
                write!(f, "Invalid file type: {name} ({kind})")
            }
            FileRejection::HostFailure { name, reason } => {
                write!(f, "Could not create preview for {name}: {reason}")
            }
        }
    }
}

/// Owner of the bytes behind local handles.
pub trait HandleHost {
    fn mint(&mut self, file: &SelectedFile) -> Result<LocalHandle, String>;

    /// Releases the bytes behind `handle`. Returns false when the handle was
    /// unknown or already revoked; that is not an error.
    fn revoke(&mut self, handle: &LocalHandle) -> bool;
}

/// In-process [`HandleHost`] keeping the bytes of every live handle.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    origin: String,
    live: HashMap<LocalHandle, SelectedFile>,
}

impl HandleRegistry {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            live: HashMap::new(),
        }
    }

    /// The file behind a live handle, for preview rendering.
    pub fn resolve(&self, handle: &LocalHandle) -> Option<&SelectedFile> {
        self.live.get(handle)
    }

    pub fn is_live(&self, handle: &LocalHandle) -> bool {
        self.live.contains_key(handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl HandleHost for HandleRegistry {
    fn mint(&mut self, file: &SelectedFile) -> Result<LocalHandle, String> {
        if self.origin.is_empty() {
            return Err("handle origin is not configured".to_string());
        }
        let handle = LocalHandle(format!(
            "{LOCAL_HANDLE_PREFIX}{}/{}",
            self.origin,
            Uuid::new_v4()
        ));
        self.live.insert(handle.clone(), file.clone());
        Ok(handle)
    }

    fn revoke(&mut self, handle: &LocalHandle) -> bool {
        self.live.remove(handle).is_some()
    }
}

/// Mints one handle per accepted file.
///
/// Files over `constraints.max_size`, or of a kind outside a non-empty
/// `constraints.allowed_kinds`, are skipped and passed to `on_reject`, as are
/// files the host fails to mint. The accepted subset is always returned.
pub fn to_resource_handles<H, F>(
    host: &mut H,
    files: &[SelectedFile],
    constraints: &UploadConstraints,
    mut on_reject: F,
) -> Vec<LocalHandle>
where
    H: HandleHost + ?Sized,
    F: FnMut(FileRejection),
{
    let mut handles = Vec::with_capacity(files.len());

    for file in files {
        if let Some(max_size) = constraints.max_size {
            if file.size() > max_size {
                on_reject(FileRejection::TooLarge {
                    name: file.name.clone(),
                    size: file.size(),
                    max_size,
                });
                continue;
            }
        }

        if !constraints.allowed_kinds.is_empty()
            && !constraints.allowed_kinds.iter().any(|k| k == &file.kind)
        {
            on_reject(FileRejection::UnsupportedKind {
                name: file.name.clone(),
                kind: file.kind.clone(),
            });
            continue;
        }

        match host.mint(file) {
            Ok(handle) => {
                debug!("Minted {} for {}", handle, file.name);
                handles.push(handle);
            }
            Err(reason) => on_reject(FileRejection::HostFailure {
                name: file.name.clone(),
                reason,
            }),
        }
    }

    handles
}

/// Revokes every local handle among `images`; external references are skipped.
///
/// Revoking an unknown or already revoked handle is a no-op.
pub fn revoke_handles<'a, H, I>(host: &mut H, images: I)
where
    H: HandleHost + ?Sized,
    I: IntoIterator<Item = &'a ImageRef>,
{
    for handle in images.into_iter().filter_map(ImageRef::as_local) {
        if !host.revoke(handle) {
            debug!("[revoke_handles] {} was already released", handle);
        }
    }
}

/// Same as [`revoke_handles`] for freshly minted handles not yet wrapped in
/// an [`ImageRef`].
pub fn revoke_local<'a, H, I>(host: &mut H, handles: I)
where
    H: HandleHost + ?Sized,
    I: IntoIterator<Item = &'a LocalHandle>,
{
    for handle in handles {
        if !host.revoke(handle) {
            debug!("[revoke_local] {} was already released", handle);
        }
    }
}
