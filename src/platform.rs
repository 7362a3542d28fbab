//! Host platform heuristics used to pick a delivery strategy.

/// What is known about the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    user_agent: String,
    max_touch_points: u32,
}

impl PlatformProfile {
    /// Describe a host by its user-agent string and touch support.
    pub fn new(user_agent: impl Into<String>, max_touch_points: u32) -> Self {
        Self {
            user_agent: user_agent.into(),
            max_touch_points,
        }
    }

    /// A desktop host without touch input, which honours download hints.
    pub fn desktop() -> Self {
        Self::new(
            format!("endframe/{} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
            0,
        )
    }

    /// User-agent string.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Number of simultaneous touch points the host supports.
    pub fn max_touch_points(&self) -> u32 {
        self.max_touch_points
    }

    /// Whether this host is a mobile browser that ignores forced-download
    /// hints and needs the artifact opened instead.
    ///
    /// iPadOS reports a desktop Macintosh user agent, so a Macintosh with
    /// multi-touch is treated as an iPad.
    pub fn ignores_download_hints(&self) -> bool {
        let agent = self.user_agent.as_str();
        let apple_handheld = ["iPhone", "iPad", "iPod"]
            .iter()
            .any(|device| agent.contains(device));
        let touch_mac = agent.contains("Macintosh") && self.max_touch_points > 1;

        apple_handheld || touch_mac || agent.contains("Android")
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::desktop()
    }
}
