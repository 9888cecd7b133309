//! Flasher Board Settings and PMT Interlock
//!
//! The flasher board must never fire into a PMT at full high voltage. In
//! normal mode the HV readback must be below the "off" threshold; extended
//! mode tolerates HV on for a single dim LED.

use dom_hal::{DomHal, HalError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::InterlockConfig;
use crate::error::RunError;

/// Allowed flasher-to-ATWD launch delays
pub const FLASHER_DELAY_RANGE: std::ops::RangeInclusive<i16> = -200..=175;

/// LEDs the current-monitor mux can select
const N_LEDS: u8 = 12;

/// One flasher board configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlasherSettings {
    pub brightness: u8,
    pub width: u8,
    /// ATWD launch offset relative to the flash
    pub delay: i16,
    /// Enabled LEDs, bit per LED
    pub mask: u16,
    /// Requested flash rate (Hz)
    pub rate: u16,
}

impl FlasherSettings {
    pub fn validate(&self) -> Result<(), RunError> {
        if !FLASHER_DELAY_RANGE.contains(&self.delay) {
            return Err(RunError::BadFlasherDelay(self.delay));
        }
        Ok(())
    }

    pub fn led_count(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Lowest enabled LED, routed to the current monitor
    pub fn first_led(&self) -> u8 {
        (0..N_LEDS)
            .find(|led| (self.mask >> led) & 1 != 0)
            .unwrap_or(0)
    }
}

/// Check the PMT/flasher interlock for `settings` at HV readback `adc`
pub fn check_interlock(
    limits: &InterlockConfig,
    extended_mode: bool,
    settings: &FlasherSettings,
    adc: u16,
) -> Result<(), RunError> {
    if adc <= limits.max_hvadc_off {
        return Ok(());
    }
    if !extended_mode {
        return Err(RunError::HighVoltageOn {
            adc,
            limit: limits.max_hvadc_off,
        });
    }

    warn!("HV is on during flasher run (extended mode), HV ADC {}", adc);
    let leds = settings.led_count();
    if leds > 1 {
        return Err(RunError::TooManyLeds {
            leds,
            mask: settings.mask,
        });
    }
    if settings.brightness > limits.max_brightness_hv_on || settings.width > limits.max_width_hv_on
    {
        return Err(RunError::FlasherTooBright {
            brightness: settings.brightness,
            width: settings.width,
        });
    }
    Ok(())
}

/// Power up and program the flasher board; returns the achieved rate
pub fn setup<H: DomHal>(hal: &mut H, settings: &FlasherSettings) -> Result<u16, HalError> {
    hal.fb_enable()?;
    hal.fb_set_brightness(settings.brightness);
    hal.fb_set_width(settings.width);
    hal.fb_enable_leds(settings.mask);
    hal.fb_select_mux(settings.first_led());
    hal.fb_set_delay(settings.delay);
    let rate = hal.fb_set_rate(settings.rate);
    info!(
        "Flasher board set: brightness={} width={} delay={} mask=0x{:04x} rate={} (achieved {})",
        settings.brightness, settings.width, settings.delay, settings.mask, settings.rate, rate
    );
    Ok(rate)
}

/// Dim the LEDs, then power the board down
pub fn turn_off<H: DomHal>(hal: &mut H) {
    hal.fb_set_brightness(0);
    hal.fb_enable_leds(0);
    hal.sleep_us(100_000);
    hal.fb_disable();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mask: u16, brightness: u8, width: u8) -> FlasherSettings {
        FlasherSettings {
            brightness,
            width,
            delay: 0,
            mask,
            rate: 10,
        }
    }

    #[test]
    fn test_delay_bounds() {
        let mut s = settings(1, 10, 10);
        for (delay, ok) in [(-200, true), (175, true), (-201, false), (176, false)] {
            s.delay = delay;
            assert_eq!(s.validate().is_ok(), ok, "delay {}", delay);
        }
    }

    #[test]
    fn test_first_led() {
        assert_eq!(settings(0b1011_0000, 0, 0).first_led(), 4);
        assert_eq!(settings(0, 0, 0).first_led(), 0);
        // Bits above the twelfth LED are not mux inputs
        assert_eq!(settings(0x8000, 0, 0).first_led(), 0);
    }

    #[test]
    fn test_hv_off_always_passes() {
        let limits = InterlockConfig::default();
        let s = settings(0xFFF, 127, 127);
        assert!(check_interlock(&limits, false, &s, limits.max_hvadc_off).is_ok());
    }

    #[test]
    fn test_hv_on_normal_mode_refused() {
        let limits = InterlockConfig::default();
        let s = settings(1, 1, 1);
        assert!(matches!(
            check_interlock(&limits, false, &s, limits.max_hvadc_off + 1),
            Err(RunError::HighVoltageOn { .. })
        ));
    }

    #[test]
    fn test_hv_on_extended_mode_limits() {
        let limits = InterlockConfig::default();
        let adc = 1000;
        let dim = settings(0b100, limits.max_brightness_hv_on, limits.max_width_hv_on);
        assert!(check_interlock(&limits, true, &dim, adc).is_ok());
        assert!(matches!(
            check_interlock(&limits, true, &settings(0b101, 1, 1), adc),
            Err(RunError::TooManyLeds { leds: 2, .. })
        ));
        assert!(matches!(
            check_interlock(&limits, true, &settings(1, limits.max_brightness_hv_on + 1, 1), adc),
            Err(RunError::FlasherTooBright { .. })
        ));
    }
}
