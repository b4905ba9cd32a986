//! Video platform adapters.
//!
//! Known video hosts are recognised from the URL alone; the extractor records
//! the platform-specific id instead of fetching the page.

use url::Url;

use curator_shared::VideoRef;
use curator_shared::canonical::{vimeo_video_id, youtube_video_id};

/// A video hosting platform the extractor can recognise by URL shape.
pub trait VideoPlatform: Send + Sync {
    /// Platform-specific video id, if `url` points at a single video.
    fn video_id(&self, url: &Url) -> Option<String>;

    /// Static thumbnail URL for the video, when the platform exposes one.
    fn thumbnail_url(&self, id: &str) -> Option<String>;

    /// Adapter name, stored as the entry's `video_platform`.
    fn name(&self) -> &str;
}

pub struct YouTube;

impl VideoPlatform for YouTube {
    fn video_id(&self, url: &Url) -> Option<String> {
        youtube_video_id(url)
    }

    fn thumbnail_url(&self, id: &str) -> Option<String> {
        Some(format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"))
    }

    fn name(&self) -> &str {
        "youtube"
    }
}

pub struct Vimeo;

impl VideoPlatform for Vimeo {
    fn video_id(&self, url: &Url) -> Option<String> {
        vimeo_video_id(url)
    }

    fn thumbnail_url(&self, _id: &str) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "vimeo"
    }
}

/// A recognised video URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMatch {
    pub video: VideoRef,
    pub thumbnail_url: Option<String>,
}

/// Holds registered platforms in priority order.
pub struct VideoRegistry {
    platforms: Vec<Box<dyn VideoPlatform>>,
}

impl VideoRegistry {
    /// Create a registry with all built-in platforms.
    pub fn new() -> Self {
        Self {
            platforms: vec![Box::new(YouTube), Box::new(Vimeo)],
        }
    }

    /// Match `url` against the registered platforms.
    pub fn detect(&self, url: &Url) -> Option<VideoMatch> {
        self.platforms.iter().find_map(|platform| {
            let id = platform.video_id(url)?;
            Some(VideoMatch {
                thumbnail_url: platform.thumbnail_url(&id),
                video: VideoRef {
                    platform: platform.name().to_string(),
                    id,
                },
            })
        })
    }
}

impl Default for VideoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_youtube_forms() {
        let registry = VideoRegistry::new();
        for raw in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=10",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
        ] {
            let url = Url::parse(raw).unwrap();
            let found = registry.detect(&url).unwrap_or_else(|| panic!("no match for {raw}"));
            assert_eq!(found.video.platform, "youtube");
            assert_eq!(found.video.id, "dQw4w9WgXcQ");
            assert_eq!(
                found.thumbnail_url.as_deref(),
                Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
            );
        }
    }

    #[test]
    fn detects_vimeo() {
        let registry = VideoRegistry::new();
        let url = Url::parse("https://vimeo.com/channels/staffpicks/76979871").unwrap();
        let found = registry.detect(&url).unwrap();
        assert_eq!(found.video.platform, "vimeo");
        assert_eq!(found.video.id, "76979871");
        assert!(found.thumbnail_url.is_none());
    }

    #[test]
    fn ignores_channel_pages() {
        let registry = VideoRegistry::new();
        let url = Url::parse("https://www.youtube.com/@rustlang").unwrap();
        assert!(registry.detect(&url).is_none());
        let url = Url::parse("https://example.com/watch?v=abc").unwrap();
        assert!(registry.detect(&url).is_none());
    }
}
