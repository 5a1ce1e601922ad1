//! Four-level render fallback state machine.
//!
//! One [`RenderFallbackManager`] belongs to one rendering session. The host
//! reports per-component render failures through
//! [`RenderFallbackManager::handle_component_error`]; the manager decides
//! whether to escalate and can rewrite the session's payload for the
//! current level through [`RenderFallbackManager::create_fallback_payload`].
//!
//! The level only moves up on errors. [`RenderFallbackManager::reset`] is
//! the only way back down.

pub mod clock;
pub mod degrade;

pub use clock::{Clock, ManualClock, SystemClock};
pub use degrade::{degrade, text_content};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::payload::Payload;

/// Maximum number of per-component entries in a warning summary.
pub const MAX_SUMMARY_ENTRIES: usize = 5;

static CRITICAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Maximum call stack size exceeded",
        r"(?i)out of memory",
        r"(?i)quota exceeded",
        r"(?i)network error",
        r"(?i)timeout",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("critical error pattern"))
    .collect()
});

/// Errors that escalate on their first occurrence.
pub fn is_critical_error(message: &str) -> bool {
    CRITICAL_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(message))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLevel {
    #[default]
    Full,
    Simplified,
    Generic,
    TextOnly,
}

impl FallbackLevel {
    pub const ALL: [FallbackLevel; 4] = [
        FallbackLevel::Full,
        FallbackLevel::Simplified,
        FallbackLevel::Generic,
        FallbackLevel::TextOnly,
    ];

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        Self::ALL.get(level as usize).copied()
    }

    /// The next level up, staying at [`FallbackLevel::TextOnly`].
    pub fn next(&self) -> Self {
        Self::from_u8(self.as_u8() + 1).unwrap_or(FallbackLevel::TextOnly)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FallbackLevel::Full => "full",
            FallbackLevel::Simplified => "simplified",
            FallbackLevel::Generic => "generic",
            FallbackLevel::TextOnly => "text_only",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FallbackLevel::Full => "完整功能：所有A2UI组件正常渲染",
            FallbackLevel::Simplified => "简化模式：使用简化模板或减少组件复杂度",
            FallbackLevel::Generic => "通用模式：使用通用可视化组件替代专用组件",
            FallbackLevel::TextOnly => "纯文本模式：仅显示文本内容，不渲染可视化",
        }
    }

    /// Written to `metadata.fallbackReason` of degraded payloads.
    pub fn reason(&self) -> &'static str {
        match self {
            FallbackLevel::Full => "Full rendering",
            FallbackLevel::Simplified => "Simplified mode: reduced complexity",
            FallbackLevel::Generic => "Generic mode: using generic components",
            FallbackLevel::TextOnly => "Text-only mode: visualization disabled",
        }
    }
}

/// Escalation thresholds for one rendering session.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    /// Errors on one component before escalating.
    ///
    /// **Default:** 3
    pub max_retries: u32,

    /// Two errors on the same component closer together than this escalate.
    /// A component that just escalated cannot escalate again inside the
    /// same window.
    ///
    /// **Default:** 5 seconds
    pub burst_window: Duration,

    /// When false, errors are recorded but the level never changes.
    ///
    /// **Default:** true
    pub enable_automatic_fallback: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            burst_window: Duration::from_millis(5000),
            enable_automatic_fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentErrorRecord {
    pub count: u32,
    pub last_error: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackTransition {
    pub timestamp_ms: u64,
    pub from_level: FallbackLevel,
    pub to_level: FallbackLevel,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentWarning {
    pub component_id: String,
    pub message: String,
}

/// Aggregated, non-blocking banner content for all failed components.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningSummary {
    pub failed_components: usize,
    pub warnings: Vec<ComponentWarning>,
    pub level: FallbackLevel,
    pub level_description: String,
}

pub struct RenderFallbackManager {
    catalog: Arc<Catalog>,
    config: FallbackConfig,
    clock: Arc<dyn Clock>,
    level: FallbackLevel,
    errors: HashMap<String, ComponentErrorRecord>,
    last_escalation: HashMap<String, u64>,
    history: Vec<FallbackTransition>,
}

impl RenderFallbackManager {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            config: FallbackConfig::default(),
            clock: Arc::new(SystemClock),
            level: FallbackLevel::Full,
            errors: HashMap::new(),
            last_escalation: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: FallbackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn current_level(&self) -> FallbackLevel {
        self.level
    }

    pub fn history(&self) -> &[FallbackTransition] {
        &self.history
    }

    pub fn error_record(&self, component_id: &str) -> Option<&ComponentErrorRecord> {
        self.errors.get(component_id)
    }

    /// Whether the host should try rendering `component_id` again.
    pub fn should_retry(&self, component_id: &str) -> bool {
        self.errors
            .get(component_id)
            .is_none_or(|record| record.count < self.config.max_retries)
    }

    /// Records a render failure and returns whether the level advanced.
    pub fn handle_component_error(&mut self, component_id: &str, message: &str) -> bool {
        let now = self.clock.now_ms();
        let record = self
            .errors
            .entry(component_id.to_string())
            .or_insert_with(|| ComponentErrorRecord {
                count: 0,
                last_error: String::new(),
                timestamp_ms: 0,
            });

        let window_ms = self.config.burst_window.as_millis() as u64;
        let burst = record.count > 0 && now.saturating_sub(record.timestamp_ms) < window_ms;
        record.count += 1;
        record.last_error = message.to_string();
        record.timestamp_ms = now;

        if !self.config.enable_automatic_fallback || self.level == FallbackLevel::TextOnly {
            return false;
        }

        let triggered =
            record.count >= self.config.max_retries || is_critical_error(message) || burst;
        if !triggered || self.recently_escalated(component_id, now) {
            return false;
        }

        let reason = format!("Component {component_id} failed: {message}");
        self.escalate(now, reason, component_id);
        true
    }

    fn recently_escalated(&self, component_id: &str, now: u64) -> bool {
        self.last_escalation
            .get(component_id)
            .is_some_and(|&at| now.saturating_sub(at) < self.config.burst_window.as_millis() as u64)
    }

    fn escalate(&mut self, now: u64, reason: String, component_id: &str) {
        let from = self.level;
        let to = from.next();
        warn!(
            component_id,
            from_level = from.as_u8(),
            to_level = to.as_u8(),
            reason = %reason,
            "Render fallback level changed"
        );

        self.level = to;
        self.last_escalation.insert(component_id.to_string(), now);
        self.history.push(FallbackTransition {
            timestamp_ms: now,
            from_level: from,
            to_level: to,
            reason,
            component_id: Some(component_id.to_string()),
        });
    }

    /// Clears one or all error records and returns to full rendering.
    pub fn reset(&mut self, component_id: Option<&str>) {
        match component_id {
            Some(id) => {
                self.errors.remove(id);
                self.last_escalation.remove(id);
            }
            None => {
                self.errors.clear();
                self.last_escalation.clear();
            }
        }

        let from = self.level;
        self.level = FallbackLevel::Full;
        if from != FallbackLevel::Full {
            self.history.push(FallbackTransition {
                timestamp_ms: self.clock.now_ms(),
                from_level: from,
                to_level: FallbackLevel::Full,
                reason: "Reset to full functionality".to_string(),
                component_id: component_id.map(str::to_string),
            });
        }
        info!(component_id, from_level = from.as_u8(), "Render fallback reset");
    }

    /// The payload rewritten for the current level. The input is not changed.
    pub fn create_fallback_payload(
        &self,
        payload: &Payload,
        component_id: Option<&str>,
    ) -> Payload {
        degrade(payload, self.level, component_id, &self.catalog.registry)
    }

    pub fn warning_summary(&self) -> WarningSummary {
        let mut failed: Vec<(&String, &ComponentErrorRecord)> = self.errors.iter().collect();
        failed.sort_by(|a, b| a.1.timestamp_ms.cmp(&b.1.timestamp_ms).then(a.0.cmp(b.0)));

        WarningSummary {
            failed_components: failed.len(),
            warnings: failed
                .into_iter()
                .take(MAX_SUMMARY_ENTRIES)
                .map(|(id, record)| ComponentWarning {
                    component_id: id.clone(),
                    message: record.last_error.clone(),
                })
                .collect(),
            level: self.level,
            level_description: self.level.description().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Component, ComponentKind};
    use serde_json::json;

    fn manager() -> (RenderFallbackManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let manager = RenderFallbackManager::new(Catalog::builtin().unwrap())
            .with_clock(clock.clone());
        (manager, clock)
    }

    #[test]
    fn test_level_ordering_and_next() {
        assert_eq!(FallbackLevel::Full.next(), FallbackLevel::Simplified);
        assert_eq!(FallbackLevel::TextOnly.next(), FallbackLevel::TextOnly);
        assert!(FallbackLevel::Generic > FallbackLevel::Simplified);
        assert_eq!(FallbackLevel::from_u8(2), Some(FallbackLevel::Generic));
        assert_eq!(FallbackLevel::from_u8(4), None);
        assert_eq!(FallbackLevel::TextOnly.name(), "text_only");
    }

    #[test]
    fn test_critical_patterns() {
        assert!(is_critical_error("Maximum call stack size exceeded"));
        assert!(is_critical_error("Request TIMEOUT after 30s"));
        assert!(is_critical_error("Network Error"));
        assert!(is_critical_error("storage quota exceeded"));
        assert!(!is_critical_error("maximum call stack size exceeded"));
        assert!(!is_critical_error("Cannot read properties of undefined"));
    }

    #[test]
    fn test_burst_of_three_escalates_once() {
        let (mut manager, clock) = manager();

        assert!(!manager.handle_component_error("graph", "render failed"));
        clock.advance(Duration::from_millis(300));
        assert!(manager.handle_component_error("graph", "render failed"));
        clock.advance(Duration::from_millis(300));
        assert!(!manager.handle_component_error("graph", "render failed"));

        assert_eq!(manager.current_level(), FallbackLevel::Simplified);
        assert_eq!(manager.history().len(), 1);
        let transition = &manager.history()[0];
        assert_eq!(transition.from_level, FallbackLevel::Full);
        assert_eq!(transition.to_level, FallbackLevel::Simplified);
        assert_eq!(transition.reason, "Component graph failed: render failed");
        assert_eq!(transition.component_id.as_deref(), Some("graph"));
    }

    #[test]
    fn test_spaced_errors_escalate_on_max_retries() {
        let (mut manager, clock) = manager();

        assert!(!manager.handle_component_error("p", "bad data"));
        clock.advance(Duration::from_secs(6));
        assert!(!manager.handle_component_error("p", "bad data"));
        clock.advance(Duration::from_secs(6));
        assert!(manager.handle_component_error("p", "bad data"));
        assert_eq!(manager.current_level(), FallbackLevel::Simplified);
        assert!(!manager.should_retry("p"));
        assert!(manager.should_retry("other"));
    }

    #[test]
    fn test_critical_error_escalates_immediately() {
        let (mut manager, _clock) = manager();
        assert!(manager.handle_component_error("kg", "out of memory"));
        assert_eq!(manager.current_level(), FallbackLevel::Simplified);
        assert_eq!(manager.error_record("kg").unwrap().count, 1);
    }

    #[test]
    fn test_level_is_monotonic_and_clamped() {
        let (mut manager, clock) = manager();
        let mut previous = manager.current_level();

        for i in 0..12 {
            manager.handle_component_error(&format!("c{}", i % 3), "timeout");
            clock.advance(Duration::from_millis(700));
            assert!(manager.current_level() >= previous);
            previous = manager.current_level();
        }

        assert_eq!(manager.current_level(), FallbackLevel::TextOnly);
        assert!(!manager.handle_component_error("c9", "timeout"));
        assert_eq!(manager.history().len(), 3);
    }

    #[test]
    fn test_disabled_automatic_fallback_only_records() {
        let (manager, _clock) = manager();
        let mut manager = manager.with_config(FallbackConfig {
            enable_automatic_fallback: false,
            ..Default::default()
        });

        for _ in 0..5 {
            assert!(!manager.handle_component_error("x", "timeout"));
        }
        assert_eq!(manager.current_level(), FallbackLevel::Full);
        assert_eq!(manager.error_record("x").unwrap().count, 5);
    }

    #[test]
    fn test_reset_returns_to_full() {
        let (mut manager, _clock) = manager();
        manager.handle_component_error("a", "timeout");
        manager.handle_component_error("b", "network error");
        assert_eq!(manager.current_level(), FallbackLevel::Generic);

        manager.reset(Some("a"));
        assert_eq!(manager.current_level(), FallbackLevel::Full);
        assert!(manager.error_record("a").is_none());
        assert!(manager.error_record("b").is_some());

        let last = manager.history().last().unwrap();
        assert_eq!(last.from_level, FallbackLevel::Generic);
        assert_eq!(last.to_level, FallbackLevel::Full);

        manager.reset(None);
        assert!(manager.error_record("b").is_none());
        assert_eq!(manager.history().len(), 3);
    }

    #[test]
    fn test_create_fallback_payload_follows_level() {
        let (mut manager, clock) = manager();
        let mut payload = Payload::new("root");
        payload.insert_component(
            Component::new(ComponentKind::Card, "root").with_children(vec!["p".to_string()]),
        );
        payload.insert_component(
            Component::new(ComponentKind::PunnettSquare, "p")
                .with_property("title", json!("Punnett方格")),
        );

        assert_eq!(manager.create_fallback_payload(&payload, None), payload);

        for _ in 0..3 {
            manager.handle_component_error("p", "quota exceeded");
            clock.advance(Duration::from_secs(6));
        }
        assert_eq!(manager.current_level(), FallbackLevel::TextOnly);

        let degraded = manager.create_fallback_payload(&payload, None);
        assert!(
            degraded
                .surface
                .components
                .values()
                .all(|c| c.kind == ComponentKind::Text)
        );
        assert_eq!(
            degraded.component("p").unwrap().property_str("content"),
            Some("Punnett方格")
        );
        assert_eq!(degraded.metadata.unwrap().fallback_level, Some(3));
    }

    #[test]
    fn test_warning_summary_caps_entries() {
        let (mut manager, clock) = manager();
        for i in 0..7 {
            manager.handle_component_error(&format!("comp{i}"), &format!("error {i}"));
            clock.advance(Duration::from_millis(10));
        }

        let summary = manager.warning_summary();
        assert_eq!(summary.failed_components, 7);
        assert_eq!(summary.warnings.len(), MAX_SUMMARY_ENTRIES);
        assert_eq!(summary.warnings[0].component_id, "comp0");
        assert_eq!(summary.warnings[0].message, "error 0");
        assert_eq!(summary.level, FallbackLevel::Full);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["failedComponents"], 7);
        assert_eq!(value["level"], "full");
        assert_eq!(value["warnings"][0]["componentId"], "comp0");
    }
}
