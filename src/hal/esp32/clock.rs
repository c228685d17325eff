//! Millisecond tick for the overload checks, read from `esp_timer`.

use esp_idf_hal::sys::esp_timer_get_time;

use crate::traits::Clock;

/// Milliseconds since boot, truncated to `u32`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Esp32Clock;

impl Esp32Clock {
    /// Clock over the boot-time `esp_timer`.
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for Esp32Clock {
    #[inline]
    fn now_ms(&self) -> u32 {
        // Safe: read-only query of the system timer
        let micros = unsafe { esp_timer_get_time() };
        // Low 32 bits only; every consumer compares with wrapping_sub, so the
        // rollover after ~49.7 days does not stall the checks
        (micros / 1_000) as u32
    }
}
