use super::Platform;

/// Ordered table of host substrings to platforms.
///
/// Lookup is a plain substring test against the whole URL and the first
/// registered entry wins, so registration order matters.
pub struct PlatformRegistry {
    routes: Vec<(&'static str, Platform)>,
}

impl PlatformRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// The table the service runs with.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("drive.google.com", Platform::GoogleDrive);
        registry.register("tiktok.com", Platform::TikTok);
        registry.register("vm.tiktok.com", Platform::TikTok);
        registry.register("vt.tiktok.com", Platform::TikTok);
        registry.register("facebook.com", Platform::Facebook);
        registry.register("fb.watch", Platform::Facebook);
        registry.register("youtube.com", Platform::YouTube);
        registry.register("youtu.be", Platform::YouTube);
        registry.register("instagram.com", Platform::Instagram);
        registry.register("douyin.com", Platform::Douyin);
        registry.register("v.douyin.com", Platform::Douyin);
        registry.register("bilibili.com", Platform::Bilibili);
        registry.register("x.com", Platform::Twitter);
        registry.register("twitter.com", Platform::Twitter);
        registry
    }

    /// Append a route. Earlier routes take precedence.
    pub fn register(&mut self, host: &'static str, platform: Platform) {
        self.routes.push((host, platform));
    }

    /// Find the platform for a URL.
    #[must_use]
    pub fn find_platform(&self, url: &str) -> Option<Platform> {
        self.routes
            .iter()
            .find(|(host, _)| url.contains(host))
            .map(|&(_, platform)| platform)
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
