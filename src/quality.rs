//! Adaptive render quality.
//!
//! Frame rate is sampled once per second into a short window. On mobile-class devices
//! the controller periodically steps a four-rung ladder one rung at a time to keep the
//! viewer interactive. A separate screenshot level temporarily overrides the ladder and
//! is restored exactly afterwards.

use std::collections::VecDeque;
use std::fmt;

use crate::events::{Channel, QualityChanged, Subscription};

pub const FPS_WINDOW: usize = 30;
pub const SAMPLE_PERIOD_MS: f64 = 1000.0;
pub const CHECK_PERIOD_MS: f64 = 2000.0;
pub const MIN_SAMPLES: usize = 5;
pub const STEP_DOWN_BELOW_FPS: f32 = 25.0;
pub const STEP_UP_ABOVE_FPS: f32 = 50.0;
/// Reported before the first sample has been taken.
pub const DEFAULT_FPS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityLevel {
    UltraLow,
    Low,
    Medium,
    High,
    /// Maximum fidelity for one-shot captures; never reached by stepping.
    Screenshot,
}

impl QualityLevel {
    /// The steppable rungs, lowest first.
    pub const LADDER: [QualityLevel; 4] = [Self::UltraLow, Self::Low, Self::Medium, Self::High];

    pub fn id(self) -> &'static str {
        match self {
            Self::UltraLow => "ultralow",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Screenshot => "screenshot",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::LADDER.into_iter().chain([Self::Screenshot]).find(|l| l.id() == id)
    }

    /// Position on the ladder, `None` for the screenshot level.
    pub fn rung(self) -> Option<usize> {
        Self::LADDER.iter().position(|l| *l == self)
    }

    pub fn step_down(self) -> Option<Self> {
        let rung = self.rung()?;
        rung.checked_sub(1).map(|r| Self::LADDER[r])
    }

    pub fn step_up(self) -> Option<Self> {
        let rung = self.rung()?;
        Self::LADDER.get(rung + 1).copied()
    }

    pub fn preset(self) -> &'static QualityPreset {
        match self {
            Self::High => &HIGH,
            Self::Medium => &MEDIUM,
            Self::Low => &LOW,
            Self::UltraLow => &ULTRA_LOW,
            Self::Screenshot => &SCREENSHOT,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelRatio {
    /// The device pixel ratio, capped.
    Device { max: f32 },
    Fixed(f32),
}

impl PixelRatio {
    pub fn resolve(self, device_pixel_ratio: f32) -> f32 {
        match self {
            Self::Device { max } => device_pixel_ratio.min(max),
            Self::Fixed(ratio) => ratio,
        }
    }
}

/// Renderer configuration bundle for one quality level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPreset {
    pub pixel_ratio: PixelRatio,
    pub shadow_map_size: u32,
    pub shadows: bool,
    pub ambient_occlusion: bool,
    pub ao_intensity: f32,
    pub ao_scale: f32,
    pub fxaa: bool,
}

const HIGH: QualityPreset = QualityPreset {
    pixel_ratio: PixelRatio::Device { max: 2.0 },
    shadow_map_size: 2048,
    shadows: true,
    ambient_occlusion: true,
    ao_intensity: 0.03,
    ao_scale: 50.0,
    fxaa: true,
};

const MEDIUM: QualityPreset = QualityPreset {
    pixel_ratio: PixelRatio::Device { max: 1.5 },
    shadow_map_size: 1024,
    ao_intensity: 0.02,
    ao_scale: 30.0,
    ..HIGH
};

const LOW: QualityPreset = QualityPreset {
    pixel_ratio: PixelRatio::Fixed(1.0),
    shadow_map_size: 512,
    ambient_occlusion: false,
    ao_intensity: 0.0,
    ao_scale: 0.0,
    ..HIGH
};

const ULTRA_LOW: QualityPreset = QualityPreset {
    pixel_ratio: PixelRatio::Fixed(0.75),
    shadow_map_size: 256,
    shadows: false,
    fxaa: false,
    ..LOW
};

const SCREENSHOT: QualityPreset = HIGH;

/// Tunables of the ambient-occlusion post pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoParams {
    pub scale: f32,
    pub kernel_radius: f32,
    pub intensity: f32,
}

impl AoParams {
    /// Scale and kernel sized to a model whose largest extent is `max_dim` mm.
    pub fn fitted_to(self, max_dim: f32) -> Self {
        Self { scale: max_dim * 1.5, kernel_radius: max_dim / 8.0, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientOcclusionPass {
    pub enabled: bool,
    pub params: AoParams,
}

impl AmbientOcclusionPass {
    pub fn new(preset: &QualityPreset, mobile: bool) -> Self {
        Self {
            enabled: preset.ambient_occlusion,
            params: AoParams {
                scale: if preset.ao_scale > 0.0 { preset.ao_scale } else { 50.0 },
                kernel_radius: if mobile { 10.0 } else { 20.0 },
                intensity: if preset.ao_intensity > 0.0 { preset.ao_intensity } else { 0.03 },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AntialiasPass {
    pub enabled: bool,
    /// Reciprocal render-target size in physical pixels.
    pub resolution: [f32; 2],
}

/// The renderer and post-processing chain the controller drives.
pub trait RenderBackend {
    fn set_pixel_ratio(&mut self, ratio: f32);
    fn pixel_ratio(&self) -> f32;
    fn set_shadow_map(&mut self, enabled: bool, size: u32);
    fn shadows_enabled(&self) -> bool;
    /// Redraw the shadow map once even when automatic updates are off.
    fn request_shadow_refresh(&mut self);
    fn ambient_occlusion(&mut self) -> Option<&mut AmbientOcclusionPass>;
    fn antialias(&mut self) -> Option<&mut AntialiasPass>;
    /// Window size in CSS pixels.
    fn viewport_size(&self) -> (f32, f32);
    /// Reallocates render targets for the current pixel ratio.
    fn resize(&mut self, width: f32, height: f32);
}

/// One-time device classification from what the browser reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProfile {
    pub mobile: bool,
    pub ios: bool,
    pub low_end: bool,
    pub device_pixel_ratio: f32,
}

const MOBILE_MARKERS: [&str; 8] =
    ["android", "webos", "iphone", "ipad", "ipod", "blackberry", "iemobile", "opera mini"];
const IOS_MARKERS: [&str; 3] = ["iPad", "iPhone", "iPod"];

impl DeviceProfile {
    /// `cores` is `navigator.hardwareConcurrency`, `None` when unreported.
    pub fn classify(user_agent: &str, cores: Option<u32>, device_pixel_ratio: f32) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let mobile = MOBILE_MARKERS.iter().any(|m| ua.contains(m));
        let ios = IOS_MARKERS.iter().any(|m| user_agent.contains(m));
        let low_end = mobile && cores.is_none_or(|c| c <= 4);
        Self { mobile, ios, low_end, device_pixel_ratio }
    }

    pub fn desktop(device_pixel_ratio: f32) -> Self {
        Self { mobile: false, ios: false, low_end: false, device_pixel_ratio }
    }

    pub fn initial_quality(&self) -> QualityLevel {
        if self.ios {
            QualityLevel::Low
        } else if self.low_end {
            QualityLevel::UltraLow
        } else if self.mobile {
            QualityLevel::Medium
        } else {
            QualityLevel::High
        }
    }

    /// Classifies the running browser once and caches the result.
    #[cfg(target_arch = "wasm32")]
    pub fn detect() -> Self {
        static PROFILE: once_cell::sync::OnceCell<DeviceProfile> = once_cell::sync::OnceCell::new();
        *PROFILE.get_or_init(|| {
            let Some(window) = web_sys::window() else {
                return Self::desktop(1.0);
            };
            let navigator = window.navigator();
            let user_agent = navigator.user_agent().unwrap_or_default();
            let cores = match navigator.hardware_concurrency() {
                c if c >= 1.0 => Some(c as u32),
                _ => None,
            };
            let profile = Self::classify(&user_agent, cores, window.device_pixel_ratio() as f32);
            log::info!("device profile: {profile:?}");
            profile
        })
    }
}

/// Per-second frame counts over a bounded window.
#[derive(Debug, Clone)]
pub struct FpsSampler {
    samples: VecDeque<u32>,
    frames: u32,
    window_start_ms: Option<f64>,
}

impl Default for FpsSampler {
    fn default() -> Self {
        Self { samples: VecDeque::with_capacity(FPS_WINDOW), frames: 0, window_start_ms: None }
    }
}

impl FpsSampler {
    /// Counts one frame; closes the current one-second window when it has elapsed.
    pub fn frame(&mut self, now_ms: f64) {
        let start = *self.window_start_ms.get_or_insert(now_ms);
        self.frames += 1;
        if now_ms - start >= SAMPLE_PERIOD_MS {
            self.push(self.frames);
            self.frames = 0;
            self.window_start_ms = Some(now_ms);
        }
    }

    pub fn push(&mut self, fps: u32) {
        if self.samples.len() == FPS_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<u32>() as f32 / self.samples.len() as f32)
    }

    pub fn latest(&self) -> Option<u32> {
        self.samples.back().copied()
    }

    pub fn samples(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Boost {
    level: QualityLevel,
    ao: Option<AoParams>,
}

/// Closed-loop quality ladder over a [`RenderBackend`].
///
/// Constructed before the render surface exists; until [`attach_backend`] every
/// operation is a no-op.
///
/// [`attach_backend`]: AdaptiveQualityController::attach_backend
pub struct AdaptiveQualityController<B: RenderBackend> {
    backend: Option<B>,
    device: DeviceProfile,
    current: QualityLevel,
    adaptive: bool,
    sampler: FpsSampler,
    last_check_ms: Option<f64>,
    boost: Option<Boost>,
    shadows_allowed: bool,
    changes: Channel<QualityChanged>,
}

impl<B: RenderBackend> AdaptiveQualityController<B> {
    pub fn new(device: DeviceProfile) -> Self {
        Self {
            backend: None,
            device,
            current: device.initial_quality(),
            adaptive: device.mobile,
            sampler: FpsSampler::default(),
            last_check_ms: None,
            boost: None,
            shadows_allowed: true,
            changes: Channel::new(),
        }
    }

    /// Installs the renderer and applies the current level to it.
    pub fn attach_backend(&mut self, backend: B) {
        self.backend = Some(backend);
        self.configure(self.current, self.ao_mode());
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    pub fn current(&self) -> QualityLevel {
        self.current
    }

    pub fn settings(&self) -> &'static QualityPreset {
        self.current.preset()
    }

    pub fn is_boosted(&self) -> bool {
        self.boost.is_some()
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// Forces automatic stepping on or off regardless of the device class.
    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.adaptive = adaptive;
    }

    pub fn shadows_allowed(&self) -> bool {
        self.shadows_allowed
    }

    /// User switch for shadow mapping. When off, no level turns shadows on.
    pub fn set_shadows_allowed(&mut self, allowed: bool) {
        if self.shadows_allowed == allowed {
            return;
        }
        self.shadows_allowed = allowed;
        self.configure(self.current, AoMode::Keep);
    }

    /// Most recent per-second frame count.
    pub fn fps(&self) -> u32 {
        self.sampler.latest().unwrap_or(DEFAULT_FPS)
    }

    pub fn sampler(&self) -> &FpsSampler {
        &self.sampler
    }

    pub fn on_change(&self, listener: impl Fn(&QualityChanged) + 'static) -> Subscription {
        self.changes.subscribe(listener)
    }

    /// Per-frame tick.
    pub fn update(&mut self, now_ms: f64) {
        if self.backend.is_none() {
            return;
        }
        self.sampler.frame(now_ms);

        let last_check = *self.last_check_ms.get_or_insert(now_ms);
        if now_ms - last_check >= CHECK_PERIOD_MS && self.boost.is_none() {
            self.last_check_ms = Some(now_ms);
            if self.adaptive {
                self.auto_adjust();
            }
        }
    }

    /// Feeds a finished one-second frame count directly.
    pub fn record_sample(&mut self, fps: u32) {
        self.sampler.push(fps);
    }

    /// One adjustment decision. Returns the new level when a step was taken.
    pub fn auto_adjust(&mut self) -> Option<QualityLevel> {
        if self.backend.is_none() || self.boost.is_some() || self.sampler.len() < MIN_SAMPLES {
            return None;
        }
        let average = self.sampler.average()?;

        let next = if average < STEP_DOWN_BELOW_FPS {
            self.current.step_down()
        } else if average > STEP_UP_ABOVE_FPS && !self.device.mobile {
            self.current.step_up()
        } else {
            None
        }?;

        log::debug!("average {average:.1} fps, stepping {} -> {next}", self.current);
        self.configure(next, AoMode::Keep);
        self.sampler.clear();
        Some(next)
    }

    /// Switches to ladder rung `level`, loading its ambient-occlusion defaults unless
    /// boosted. Returns false, changing nothing, without a backend or for
    /// [`QualityLevel::Screenshot`], which only [`boost_for_screenshot`] enters.
    ///
    /// [`boost_for_screenshot`]: Self::boost_for_screenshot
    pub fn apply(&mut self, level: QualityLevel) -> bool {
        if level.rung().is_none() {
            log::debug!("ignoring request for non-ladder quality level `{level}`");
            return false;
        }
        if self.backend.is_none() {
            return false;
        }
        self.configure(level, self.ao_mode());
        true
    }

    /// Like [`apply`](Self::apply), by id. Unknown ids are ignored.
    pub fn apply_id(&mut self, id: &str) -> bool {
        match QualityLevel::from_id(id) {
            Some(level) => self.apply(level),
            None => {
                log::debug!("ignoring unknown quality level `{id}`");
                false
            }
        }
    }

    /// Sizes ambient occlusion to the loaded model.
    pub fn fit_ambient_occlusion(&mut self, max_dim: f32) {
        if max_dim <= 0.0 {
            return;
        }
        if let Some(ao) = self.backend.as_mut().and_then(|b| b.ambient_occlusion()) {
            ao.params = ao.params.fitted_to(max_dim);
        }
    }

    /// Switches to the screenshot level, remembering the current level and AO params.
    pub fn boost_for_screenshot(&mut self) {
        if self.boost.is_some() || self.backend.is_none() {
            return;
        }
        let ao = self.ao_params();
        self.boost = Some(Boost { level: self.current, ao });

        self.configure(QualityLevel::Screenshot, AoMode::Preset);
        self.set_ao_params(ao);

        if let Some(backend) = self.backend.as_mut() {
            if backend.shadows_enabled() {
                backend.request_shadow_refresh();
            }
        }
    }

    /// Returns to the level and AO params saved by the last boost.
    pub fn restore_after_screenshot(&mut self) {
        let Some(saved) = self.boost.take() else { return };
        self.apply(saved.level);
        self.set_ao_params(saved.ao);
    }

    fn ao_mode(&self) -> AoMode {
        if self.boost.is_some() { AoMode::Keep } else { AoMode::Preset }
    }

    fn ao_params(&mut self) -> Option<AoParams> {
        self.backend.as_mut().and_then(|b| b.ambient_occlusion()).map(|ao| ao.params)
    }

    fn set_ao_params(&mut self, params: Option<AoParams>) {
        let Some(params) = params else { return };
        if let Some(ao) = self.backend.as_mut().and_then(|b| b.ambient_occlusion()) {
            ao.params = params;
        }
    }

    fn configure(&mut self, level: QualityLevel, ao_mode: AoMode) {
        let dpr = self.device.device_pixel_ratio;
        let shadows_allowed = self.shadows_allowed;
        let Some(backend) = self.backend.as_mut() else { return };
        let preset = level.preset();

        backend.set_pixel_ratio(preset.pixel_ratio.resolve(dpr));
        backend.set_shadow_map(preset.shadows && shadows_allowed, preset.shadow_map_size);

        if let Some(ao) = backend.ambient_occlusion() {
            ao.enabled = preset.ambient_occlusion;
            if ao_mode == AoMode::Preset && preset.ambient_occlusion {
                ao.params.intensity = preset.ao_intensity;
                ao.params.scale = preset.ao_scale;
            }
        }
        if let Some(aa) = backend.antialias() {
            aa.enabled = preset.fxaa;
        }

        let (width, height) = backend.viewport_size();
        backend.resize(width, height);
        let ratio = backend.pixel_ratio();
        if let Some(aa) = backend.antialias() {
            if aa.enabled && width > 0.0 && height > 0.0 {
                aa.resolution = [1.0 / (width * ratio), 1.0 / (height * ratio)];
            }
        }

        let previous = std::mem::replace(&mut self.current, level);
        if previous != level {
            log::info!("quality changed to {level}");
            self.changes.emit(&QualityChanged { level });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AoMode {
    Preset,
    Keep,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct FakeBackend {
        pixel_ratio: f32,
        shadows: (bool, u32),
        shadow_refreshes: u32,
        ao: Option<AmbientOcclusionPass>,
        aa: Option<AntialiasPass>,
        resizes: u32,
    }

    impl FakeBackend {
        fn full() -> Self {
            Self {
                ao: Some(AmbientOcclusionPass::new(&HIGH, false)),
                aa: Some(AntialiasPass::default()),
                ..Self::default()
            }
        }
    }

    impl RenderBackend for FakeBackend {
        fn set_pixel_ratio(&mut self, ratio: f32) {
            self.pixel_ratio = ratio;
        }
        fn pixel_ratio(&self) -> f32 {
            self.pixel_ratio
        }
        fn set_shadow_map(&mut self, enabled: bool, size: u32) {
            self.shadows = (enabled, size);
        }
        fn shadows_enabled(&self) -> bool {
            self.shadows.0
        }
        fn request_shadow_refresh(&mut self) {
            self.shadow_refreshes += 1;
        }
        fn ambient_occlusion(&mut self) -> Option<&mut AmbientOcclusionPass> {
            self.ao.as_mut()
        }
        fn antialias(&mut self) -> Option<&mut AntialiasPass> {
            self.aa.as_mut()
        }
        fn viewport_size(&self) -> (f32, f32) {
            (800.0, 600.0)
        }
        fn resize(&mut self, _width: f32, _height: f32) {
            self.resizes += 1;
        }
    }

    const ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari/537.36";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";
    const DESKTOP: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";

    fn controller(device: DeviceProfile) -> AdaptiveQualityController<FakeBackend> {
        let mut c = AdaptiveQualityController::new(device);
        c.attach_backend(FakeBackend::full());
        c
    }

    #[test]
    fn classification_picks_the_initial_rung() {
        assert_eq!(DeviceProfile::classify(IPHONE, Some(6), 3.0).initial_quality(), QualityLevel::Low);
        assert_eq!(DeviceProfile::classify(ANDROID, Some(4), 2.0).initial_quality(), QualityLevel::UltraLow);
        assert_eq!(DeviceProfile::classify(ANDROID, None, 2.0).initial_quality(), QualityLevel::UltraLow);
        assert_eq!(DeviceProfile::classify(ANDROID, Some(8), 2.0).initial_quality(), QualityLevel::Medium);
        assert_eq!(DeviceProfile::classify(DESKTOP, None, 1.0).initial_quality(), QualityLevel::High);
    }

    #[test]
    fn ladder_neighbours() {
        assert_eq!(QualityLevel::UltraLow.step_down(), None);
        assert_eq!(QualityLevel::High.step_up(), None);
        assert_eq!(QualityLevel::Low.step_up(), Some(QualityLevel::Medium));
        assert_eq!(QualityLevel::Screenshot.step_down(), None);
        assert_eq!(QualityLevel::from_id("ultralow"), Some(QualityLevel::UltraLow));
        assert_eq!(QualityLevel::from_id("ultra"), None);
    }

    #[test]
    fn without_backend_everything_is_a_noop() {
        let mut c = AdaptiveQualityController::<FakeBackend>::new(DeviceProfile::classify(ANDROID, Some(8), 2.0));
        for _ in 0..10 {
            c.record_sample(5);
        }
        assert_eq!(c.auto_adjust(), None);
        c.boost_for_screenshot();
        assert!(!c.is_boosted());
        assert!(!c.apply_id("low"));
        assert_eq!(c.current(), QualityLevel::Medium);
    }

    #[test]
    fn apply_configures_the_backend() {
        let mut c = controller(DeviceProfile::desktop(3.0));
        let b = c.backend().unwrap();
        assert_eq!(b.pixel_ratio, 2.0);
        assert_eq!(b.shadows, (true, 2048));

        c.apply(QualityLevel::UltraLow);
        let b = c.backend().unwrap();
        assert_eq!(b.pixel_ratio, 0.75);
        assert_eq!(b.shadows, (false, 256));
        assert!(!b.ao.unwrap().enabled);
        assert!(!b.aa.unwrap().enabled);

        c.apply(QualityLevel::Medium);
        let b = c.backend().unwrap();
        assert_eq!(b.ao.unwrap().params.intensity, 0.02);
        assert_eq!(b.ao.unwrap().params.scale, 30.0);
        let [rx, _] = b.aa.unwrap().resolution;
        assert!((rx - 1.0 / 1200.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_id_is_ignored() {
        let mut c = controller(DeviceProfile::desktop(1.0));
        assert!(!c.apply_id("extreme"));
        assert_eq!(c.current(), QualityLevel::High);
        assert!(c.apply_id("low"));
        assert_eq!(c.current(), QualityLevel::Low);
    }

    #[test]
    fn screenshot_level_is_not_applicable_directly() {
        let mut c = controller(DeviceProfile::classify(ANDROID, Some(8), 2.0));
        let before = c.backend().unwrap().pixel_ratio;
        assert!(!c.apply_id("screenshot"));
        assert!(!c.apply(QualityLevel::Screenshot));
        assert_eq!(c.current(), QualityLevel::Medium);
        assert_eq!(c.backend().unwrap().pixel_ratio, before);

        for _ in 0..5 {
            c.record_sample(5);
        }
        assert_eq!(c.auto_adjust(), Some(QualityLevel::Low), "the ladder keeps working");

        c.boost_for_screenshot();
        c.restore_after_screenshot();
        assert_eq!(c.current(), QualityLevel::Low);
    }

    #[test]
    fn shadow_switch_overrides_every_level() {
        let mut c = controller(DeviceProfile::desktop(1.0));
        c.set_shadows_allowed(false);
        assert_eq!(c.backend().unwrap().shadows, (false, 2048));
        assert_eq!(c.current(), QualityLevel::High);

        c.boost_for_screenshot();
        assert!(!c.backend().unwrap().shadows.0);
        assert_eq!(c.backend().unwrap().shadow_refreshes, 0);
        c.restore_after_screenshot();

        c.set_shadows_allowed(true);
        assert_eq!(c.backend().unwrap().shadows, (true, 2048));
    }

    #[test]
    fn slow_frames_step_down_one_rung_and_clear_the_window() {
        let mut c = controller(DeviceProfile::classify(ANDROID, Some(8), 2.0));
        for _ in 0..4 {
            c.record_sample(10);
        }
        assert_eq!(c.auto_adjust(), None, "needs five samples");

        c.record_sample(10);
        assert_eq!(c.auto_adjust(), Some(QualityLevel::Low));
        assert!(c.sampler().is_empty());
    }

    #[test]
    fn bottom_and_top_rungs_hold() {
        let mut c = controller(DeviceProfile::classify(ANDROID, Some(2), 2.0));
        for _ in 0..10 {
            c.record_sample(5);
        }
        assert_eq!(c.auto_adjust(), None);
        assert_eq!(c.current(), QualityLevel::UltraLow);

        let mut d = controller(DeviceProfile::desktop(1.0));
        for _ in 0..10 {
            d.record_sample(120);
        }
        assert_eq!(d.auto_adjust(), None);
        assert_eq!(d.current(), QualityLevel::High);
    }

    #[test]
    fn mobile_never_steps_up() {
        let mut c = controller(DeviceProfile::classify(ANDROID, Some(8), 2.0));
        for _ in 0..10 {
            c.record_sample(60);
        }
        assert_eq!(c.auto_adjust(), None);
        assert_eq!(c.current(), QualityLevel::Medium);
    }

    #[test]
    fn desktop_steps_up_when_forced_adaptive() {
        let mut c = controller(DeviceProfile::desktop(1.0));
        c.apply(QualityLevel::Low);
        c.set_adaptive(true);

        let mut now = 0.0;
        for _ in 0..400 {
            now += 1000.0 / 60.0;
            c.update(now);
        }
        assert_eq!(c.current(), QualityLevel::Medium);
    }

    #[test]
    fn update_samples_once_per_second() {
        let mut c = controller(DeviceProfile::desktop(1.0));
        let mut now = 0.0;
        for _ in 0..=75 {
            c.update(now);
            now += 1000.0 / 30.0;
        }
        assert_eq!(c.sampler().len(), 2);
        assert!(c.fps() >= 30);
        assert_eq!(c.current(), QualityLevel::High, "desktop does not step by default");
    }

    #[test]
    fn automatic_steps_keep_ao_params() {
        let mut c = controller(DeviceProfile::classify(ANDROID, Some(8), 2.0));
        c.fit_ambient_occlusion(80.0);
        for _ in 0..5 {
            c.record_sample(10);
        }
        c.auto_adjust();
        let ao = c.backend().unwrap().ao.unwrap();
        assert_eq!(ao.params.scale, 120.0);
        assert_eq!(ao.params.kernel_radius, 10.0);
        assert!(!ao.enabled);
    }

    #[test]
    fn boost_and_restore_round_trip() {
        for level in QualityLevel::LADDER {
            let mut c = controller(DeviceProfile::desktop(2.0));
            c.apply(level);
            let custom = AoParams { scale: 7.0, kernel_radius: 3.0, intensity: 0.5 };
            c.backend_mut().unwrap().ao.as_mut().unwrap().params = custom;

            c.boost_for_screenshot();
            assert!(c.is_boosted());
            assert_eq!(c.current(), QualityLevel::Screenshot);
            assert_eq!(c.backend().unwrap().ao.unwrap().params, custom);
            c.boost_for_screenshot();

            c.restore_after_screenshot();
            assert!(!c.is_boosted());
            assert_eq!(c.current(), level);
            assert_eq!(c.backend().unwrap().ao.unwrap().params, custom);
            c.restore_after_screenshot();
            assert_eq!(c.current(), level);
        }
    }

    #[test]
    fn boost_refreshes_shadows_and_pauses_stepping() {
        let mut c = controller(DeviceProfile::classify(ANDROID, Some(8), 2.0));
        c.boost_for_screenshot();
        assert_eq!(c.backend().unwrap().shadow_refreshes, 1);

        for _ in 0..10 {
            c.record_sample(5);
        }
        assert_eq!(c.auto_adjust(), None);
        c.restore_after_screenshot();
        assert_eq!(c.auto_adjust(), Some(QualityLevel::Low));
    }

    #[test]
    fn changes_are_published() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut c = controller(DeviceProfile::desktop(1.0));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _sub = {
            let seen = Rc::clone(&seen);
            c.on_change(move |e| seen.borrow_mut().push(e.level))
        };
        c.apply(QualityLevel::High);
        c.apply(QualityLevel::Low);
        c.boost_for_screenshot();
        c.restore_after_screenshot();
        assert_eq!(*seen.borrow(), vec![QualityLevel::Low, QualityLevel::Screenshot, QualityLevel::Low]);
    }

    #[test]
    fn window_is_bounded() {
        let mut s = FpsSampler::default();
        for fps in 0..40 {
            s.push(fps);
        }
        assert_eq!(s.len(), FPS_WINDOW);
        assert_eq!(s.samples().next(), Some(10));
        assert_eq!(s.latest(), Some(39));
    }
}
