//! User settings persisted under `userSettings`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FocusError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub enable_notifications: bool,
    pub auto_group_tabs: bool,
    pub focus_mode_enabled: bool,
    pub auto_cleanup: bool,
    /// Hours between auto-cleanup runs.
    pub cleanup_time: u32,
    pub theme: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        UserSettings {
            enable_notifications: true,
            auto_group_tabs: true,
            focus_mode_enabled: false,
            auto_cleanup: false,
            cleanup_time: 2,
            theme: "light".to_string(),
        }
    }
}

/// Which parts of the settings a merge touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub cleanup_schedule: bool,
}

impl UserSettings {
    /// Shallow-merges a partial settings object. Unknown keys are carried
    /// through serde and dropped; ill-typed values reject the whole update
    /// and leave `self` untouched.
    pub fn merge(&mut self, partial: &Value) -> Result<SettingsChange> {
        let Value::Object(patch) = partial else {
            return Err(FocusError::InvalidSettings(format!(
                "expected an object, got {partial}"
            )));
        };

        let mut merged = serde_json::to_value(&*self)
            .map_err(|e| FocusError::InvalidSettings(e.to_string()))?;
        if let Value::Object(fields) = &mut merged {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }

        let updated: UserSettings = serde_json::from_value(merged)
            .map_err(|e| FocusError::InvalidSettings(e.to_string()))?;
        let change = SettingsChange {
            cleanup_schedule: updated.auto_cleanup != self.auto_cleanup
                || updated.cleanup_time != self.cleanup_time,
        };
        *self = updated;
        Ok(change)
    }

    pub fn cleanup_period_minutes(&self) -> f64 {
        f64::from(self.cleanup_time.max(1)) * 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = UserSettings::default();
        assert!(settings.enable_notifications);
        assert!(!settings.auto_cleanup);
        assert_eq!(settings.cleanup_time, 2);
        assert_eq!(settings.theme, "light");
    }

    #[test]
    fn test_partial_stored_settings_fill_defaults() {
        let settings: UserSettings = serde_json::from_value(json!({"theme": "dark"})).unwrap();
        assert_eq!(settings.theme, "dark");
        assert!(settings.enable_notifications);
    }

    #[test]
    fn test_merge_updates_only_given_keys() {
        let mut settings = UserSettings::default();
        let change = settings
            .merge(&json!({"enableNotifications": false, "somethingElse": 3}))
            .unwrap();

        assert!(!settings.enable_notifications);
        assert!(settings.auto_group_tabs);
        assert!(!change.cleanup_schedule);
    }

    #[test]
    fn test_merge_reports_cleanup_change() {
        let mut settings = UserSettings::default();

        let change = settings.merge(&json!({"autoCleanup": true})).unwrap();
        assert!(change.cleanup_schedule);

        let change = settings.merge(&json!({"autoCleanup": true})).unwrap();
        assert!(!change.cleanup_schedule);

        let change = settings.merge(&json!({"cleanupTime": 6})).unwrap();
        assert!(change.cleanup_schedule);
        assert_eq!(settings.cleanup_period_minutes(), 360.0);
    }

    #[test]
    fn test_merge_rejects_bad_types() {
        let mut settings = UserSettings::default();

        assert!(settings.merge(&json!({"cleanupTime": "soon"})).is_err());
        assert!(settings.merge(&json!(["not", "an", "object"])).is_err());
        assert_eq!(settings, UserSettings::default());
    }
}
