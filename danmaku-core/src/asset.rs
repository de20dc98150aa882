//! Image assets referenced from danmaku text

/// Represents a single image that danmaku text can embed as `[id]`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DanmakuImage {
    /// Identifier used inside the brackets
    pub id: String,
    /// Location handed to the image source
    pub url: String,
    /// Width the image is drawn with, in logical pixels
    pub width: f64,
    /// Height the image is drawn with, in logical pixels
    pub height: f64,
}

impl DanmakuImage {
    /// Creates a new image asset
    pub fn new(id: impl Into<String>, url: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            width,
            height,
        }
    }

    /// Returns the bracket token that references this image, e.g. `[smile]`
    pub fn token(&self) -> String {
        format!("[{}]", self.id)
    }
}

/// Ordered set of image assets, looked up by bracket token
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ImageRegistry {
    images: Vec<DanmakuImage>,
}

impl ImageRegistry {
    /// Creates a registry from a list of images; earlier entries win on duplicate ids
    pub fn new(images: Vec<DanmakuImage>) -> Self {
        Self { images }
    }

    /// Finds the image referenced by a bracket token such as `[smile]`
    pub fn resolve_token(&self, token: &str) -> Option<&DanmakuImage> {
        let id = token.strip_prefix('[')?.strip_suffix(']')?;
        self.images.iter().find(|image| image.id == id)
    }

    /// Gets an image by id
    pub fn get(&self, id: &str) -> Option<&DanmakuImage> {
        self.images.iter().find(|image| image.id == id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DanmakuImage> {
        self.images.iter()
    }
}

impl FromIterator<DanmakuImage> for ImageRegistry {
    fn from_iter<I: IntoIterator<Item = DanmakuImage>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_token() {
        let registry: ImageRegistry = [
            DanmakuImage::new("smile", "img/smile.png", 24.0, 24.0),
            DanmakuImage::new("smile", "img/other.png", 10.0, 10.0),
        ]
        .into_iter()
        .collect();

        let image = registry.resolve_token("[smile]").unwrap();
        assert_eq!(image.url, "img/smile.png");
        assert_eq!(image.token(), "[smile]");
        assert!(registry.resolve_token("smile").is_none());
        assert!(registry.resolve_token("[cry]").is_none());
    }
}
