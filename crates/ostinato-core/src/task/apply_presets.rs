//! Apply new soundcard presets.

use super::Task;
use crate::config::SoundcardPresets;
use crate::error::Result;
use crate::system::OstinatoSystem;

/// Installs new presets between two ticks. The audio loop recomputes its
/// tick frequency from the snapshot on the next cycle.
pub struct ApplyPresets {
    presets: SoundcardPresets,
}

impl ApplyPresets {
    pub fn new(presets: SoundcardPresets) -> Box<Self> {
        Box::new(Self { presets })
    }
}

impl Task for ApplyPresets {
    fn name(&self) -> &'static str {
        "apply-presets"
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        system.set_presets(self.presets);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_swap_between_ticks() {
        let system = OstinatoSystem::builder().build().unwrap();
        let before = system.presets();

        let next = SoundcardPresets::new(2, 48000, 512).unwrap();
        system.submit(ApplyPresets::new(next));
        assert_eq!(system.presets(), before);

        system.process_ticks(1);
        assert_eq!(system.presets(), next);
        assert!(system.presets().tick_frequency() > before.tick_frequency());
    }
}
