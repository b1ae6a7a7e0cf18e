use reprotrack_config::{DEFAULT_SHELF_LIFE_DAYS, DEFAULT_TAG_PROBE_ATTEMPTS, ReprotrackConfig};

/// Runtime knobs the services read, resolved once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSettings {
    pub embryo_shelf_life_days: u32,
    pub run_daily_expiry: bool,
    pub tag_probe_attempts: u32,
    pub auto_restore_session: bool,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            embryo_shelf_life_days: DEFAULT_SHELF_LIFE_DAYS,
            run_daily_expiry: true,
            tag_probe_attempts: DEFAULT_TAG_PROBE_ATTEMPTS,
            auto_restore_session: true,
        }
    }
}

impl From<&ReprotrackConfig> for CoreSettings {
    fn from(config: &ReprotrackConfig) -> Self {
        Self {
            embryo_shelf_life_days: config.embryo_shelf_life_days(),
            run_daily_expiry: config.run_daily_expiry(),
            tag_probe_attempts: config.tag_probe_attempts(),
            auto_restore_session: config.auto_restore_session(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreSettings;
    use reprotrack_config::ReprotrackConfig;

    #[test]
    fn empty_config_matches_defaults() {
        let settings = CoreSettings::from(&ReprotrackConfig::default());
        assert_eq!(settings, CoreSettings::default());
        assert_eq!(settings.embryo_shelf_life_days, 8);
    }
}
