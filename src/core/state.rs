//! Global voice state

use crate::config::VoiceConfig;

/// Process-wide voice settings, owned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVoiceState {
    pub muted: bool,
    /// Percent, kept within `volume_min..=volume_max`
    pub volume: u8,
    /// Push-to-talk hotkey is held
    pub listening: bool,
    volume_min: u8,
    volume_max: u8,
    volume_step: u8,
}

impl GlobalVoiceState {
    pub fn new(config: &VoiceConfig) -> Self {
        let volume_min = config.volume_min.min(config.volume_max);
        let volume_max = config.volume_max.max(volume_min);
        Self {
            muted: false,
            volume: config.volume.clamp(volume_min, volume_max),
            listening: false,
            volume_min,
            volume_max,
            volume_step: config.volume_step.max(1),
        }
    }

    /// Raise the volume one step; false when already at the maximum
    pub fn volume_up(&mut self) -> bool {
        let next = self.volume.saturating_add(self.volume_step).min(self.volume_max);
        let changed = next != self.volume;
        self.volume = next;
        changed
    }

    /// Lower the volume one step; false when already at the minimum
    pub fn volume_down(&mut self) -> bool {
        let next = self.volume.saturating_sub(self.volume_step).max(self.volume_min);
        let changed = next != self.volume;
        self.volume = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_stays_in_bounds() {
        let config = VoiceConfig {
            volume: 95,
            volume_min: 10,
            volume_max: 100,
            volume_step: 10,
            ..VoiceConfig::default()
        };
        let mut state = GlobalVoiceState::new(&config);

        assert!(state.volume_up());
        assert_eq!(state.volume, 100);
        assert!(!state.volume_up());

        for _ in 0..20 {
            state.volume_down();
        }
        assert_eq!(state.volume, 10);
        assert!(!state.volume_down());
    }
}
