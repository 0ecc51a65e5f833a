use anyhow::{Context, Result};

/// Timing and safety limits for the translation engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Hold threshold when neither the binding nor its layer overrides it
    pub default_hold_ms: u32,
    /// Initial delay before menu/keybind-cycle auto-repeat
    pub repeat_delay_ms: u32,
    /// Interval between exclusive auto-repeats
    pub repeat_rate_ms: u32,
    /// Initial delay before synchronized hotspot repeat
    pub hotspot_repeat_delay_ms: u32,
    /// Interval of the shared hotspot repeat timer
    pub hotspot_repeat_rate_ms: u32,
    /// Layer-order mutations allowed per frame before the cascade is fatal
    pub max_layer_ops: u32,
    /// Sort passes allowed before the sorter is declared non-convergent
    pub max_sort_passes: u32,
    /// Analog readings at or below this value count as zero
    pub analog_deadzone: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_hold_ms: 400,
            repeat_delay_ms: 500,
            repeat_rate_ms: 100,
            hotspot_repeat_delay_ms: 400,
            hotspot_repeat_rate_ms: 150,
            max_layer_ops: 32,
            max_sort_passes: 16,
            analog_deadzone: 0,
        }
    }
}

impl EngineConfig {
    /// Scale a raw 0-255 analog reading to 0.0-1.0, applying the deadzone
    pub fn analog_scale(&self, raw: u8) -> f32 {
        if raw <= self.analog_deadzone {
            return 0.0;
        }
        raw as f32 / 255.0
    }
}

/// Parse a millisecond duration, rejecting zero
pub fn parse_millis(s: &str) -> Result<u32> {
    let ms: u32 = s.trim().parse().context("Invalid millisecond value")?;
    if ms == 0 {
        anyhow::bail!("Duration must be positive");
    }
    Ok(ms)
}

/// Parse an analog deadzone as a percentage (0-100) of full scale
pub fn parse_deadzone(s: &str) -> Result<u8> {
    let pct: u32 = s.trim().parse().context("Invalid deadzone value")?;
    if pct > 100 {
        anyhow::bail!("Deadzone must be between 0 and 100");
    }
    Ok((pct * 255 / 100) as u8)
}
