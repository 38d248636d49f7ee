//! Process-wide facts about the connected host, shared by adapter and core.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Generation of the host UI the adapter detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiVariant {
    Legacy,
    Current,
}

/// How the strategy settings dialog is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsOpenMethod {
    DoubleClick,
    ContextMenu,
    ToolbarButton,
}

/// Session context owned by a host adapter.
///
/// The report-change flag is raised by whatever watches the host report and
/// cleared by the core before each evaluation.
#[derive(Debug, Default)]
pub struct HostSession {
    report_changed: AtomicBool,
    has_parsed: AtomicBool,
    deep_test: AtomicBool,
    ui_variant: RwLock<Option<UiVariant>>,
    settings_method: RwLock<Option<SettingsOpenMethod>>,
}

impl HostSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_report_changed(&self) {
        self.report_changed.store(true, Ordering::SeqCst);
    }

    pub fn reset_report_changed(&self) {
        self.report_changed.store(false, Ordering::SeqCst);
    }

    pub fn report_changed(&self) -> bool {
        self.report_changed.load(Ordering::SeqCst)
    }

    pub fn mark_parsed(&self) {
        self.has_parsed.store(true, Ordering::SeqCst);
    }

    /// A report was parsed successfully at least once in this session.
    pub fn has_parsed(&self) -> bool {
        self.has_parsed.load(Ordering::SeqCst)
    }

    pub fn set_deep_test(&self, enabled: bool) {
        self.deep_test.store(enabled, Ordering::SeqCst);
    }

    pub fn deep_test(&self) -> bool {
        self.deep_test.load(Ordering::SeqCst)
    }

    pub fn ui_variant(&self) -> Option<UiVariant> {
        self.ui_variant.read().ok().and_then(|v| *v)
    }

    pub fn set_ui_variant(&self, variant: UiVariant) {
        if let Ok(mut slot) = self.ui_variant.write() {
            *slot = Some(variant);
        }
    }

    pub fn settings_method(&self) -> Option<SettingsOpenMethod> {
        self.settings_method.read().ok().and_then(|v| *v)
    }

    pub fn set_settings_method(&self, method: SettingsOpenMethod) {
        if let Ok(mut slot) = self.settings_method.write() {
            *slot = Some(method);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_changed_flag_cycle() {
        let session = HostSession::new();
        assert!(!session.report_changed());
        session.mark_report_changed();
        assert!(session.report_changed());
        session.reset_report_changed();
        assert!(!session.report_changed());
    }

    #[test]
    fn test_cached_detection_results() {
        let session = HostSession::new();
        assert_eq!(session.ui_variant(), None);
        session.set_ui_variant(UiVariant::Current);
        session.set_settings_method(SettingsOpenMethod::ContextMenu);
        assert_eq!(session.ui_variant(), Some(UiVariant::Current));
        assert_eq!(session.settings_method(), Some(SettingsOpenMethod::ContextMenu));
    }
}
