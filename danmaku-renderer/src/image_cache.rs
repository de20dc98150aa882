//! URL-keyed bitmap cache shared by every danmaku's paint call
//!
//! A miss hands the URL to an [`ImageLoader`] and reports `Loading`. Loaders finish
//! through a [`CompletionHandle`], possibly from another thread, but the cache only
//! changes when its owner calls [`ImageCache::poll`].

use danmaku_core::{ImageHandle, ImageSource, ImageStatus};
use image::RgbaImage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

type Completion = (String, std::result::Result<ImageHandle, String>);

/// Write end of one image request
pub struct CompletionHandle {
    url: String,
    sender: Sender<Completion>,
}

impl CompletionHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn succeed(self, image: RgbaImage) {
        self.finish(Ok(Arc::new(image)));
    }

    pub fn fail(self, reason: impl std::fmt::Display) {
        self.finish(Err(reason.to_string()));
    }

    fn finish(self, result: std::result::Result<ImageHandle, String>) {
        // The cache may already be gone; the result is simply dropped then
        let _ = self.sender.send((self.url, result));
    }
}

/// Starts loading the bitmap behind a URL
pub trait ImageLoader {
    fn load(&mut self, request: CompletionHandle);
}

/// Bitmap cache implementing [`ImageSource`] on top of an [`ImageLoader`]
pub struct ImageCache {
    entries: HashMap<String, ImageStatus>,
    loader: Box<dyn ImageLoader>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
}

impl ImageCache {
    pub fn new(loader: impl ImageLoader + 'static) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            entries: HashMap::new(),
            loader: Box::new(loader),
            sender,
            receiver,
        }
    }

    /// Applies every completion received so far, returning how many were applied
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok((url, result)) = self.receiver.try_recv() {
            let status = match result {
                Ok(image) => {
                    log::debug!("image ready: {url} ({}x{})", image.width(), image.height());
                    ImageStatus::Ready(image)
                }
                Err(reason) => {
                    log::warn!("image failed: {url}: {reason}");
                    ImageStatus::Failed
                }
            };
            self.entries.insert(url, status);
            applied += 1;
        }
        applied
    }

    /// Current status without starting a load
    pub fn status(&self, url: &str) -> Option<&ImageStatus> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ImageSource for ImageCache {
    fn fetch(&mut self, url: &str) -> ImageStatus {
        if let Some(status) = self.entries.get(url) {
            return status.clone();
        }
        self.entries.insert(url.to_string(), ImageStatus::Loading);
        self.loader.load(CompletionHandle {
            url: url.to_string(),
            sender: self.sender.clone(),
        });
        ImageStatus::Loading
    }
}

/// Decodes image files on a worker thread per request.
///
/// Relative URLs are resolved against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileImageLoader {
    root: Option<PathBuf>,
}

impl FileImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&mut self, request: CompletionHandle) {
        let path = self.resolve(request.url());
        thread::spawn(move || match image::open(&path) {
            Ok(decoded) => request.succeed(decoded.to_rgba8()),
            Err(e) => request.fail(format!("{}: {e}", path.display())),
        });
    }
}

/// Serves preloaded bitmaps; unknown URLs fail
#[derive(Debug, Clone, Default)]
pub struct MemoryImageLoader {
    images: HashMap<String, RgbaImage>,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, image: RgbaImage) {
        self.images.insert(url.into(), image);
    }

    pub fn with_image(mut self, url: impl Into<String>, image: RgbaImage) -> Self {
        self.insert(url, image);
        self
    }
}

impl ImageLoader for MemoryImageLoader {
    fn load(&mut self, request: CompletionHandle) {
        match self.images.get(request.url()) {
            Some(image) => {
                let image = image.clone();
                request.succeed(image);
            }
            None => {
                let reason = format!("no such image: {}", request.url());
                request.fail(reason);
            }
        }
    }
}
