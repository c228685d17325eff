//! ESP32-C3 track board: GPIO registers, ADC1 one-shot and LEDC PWM.
//!
//! All GPIOs of the C3 sit in one 32-bit port, so every fast pin shares
//! port 0 and the signal pins are written through its shadow register.
//!
//! PWM pins are listed in the [`BoardConfig`]; each binding gets an LEDC
//! channel on the given timer, 8-bit duty, starting at the DC base
//! frequency.

use core::ptr;

use esp_idf_hal::sys::{
    self, adc_oneshot_unit_handle_t, esp, gpio_mode_t_GPIO_MODE_INPUT,
    gpio_mode_t_GPIO_MODE_OUTPUT, ledc_mode_t_LEDC_LOW_SPEED_MODE, EspError,
};

use crate::config::{BoardConfig, PwmBinding};
use crate::shadow::ShadowPorts;
use crate::signal::{dc_tone_frequency, pwm_compare, DC_BASE_FREQUENCY_HZ};
use crate::traits::{
    AnalogSense, Clock, ExecContext, FastPorts, PinDirection, PinIo, PinState, PortId, PortWord,
    PwmControl, RegisterKind,
};

use super::Esp32Clock;

/// GPIO output latch register.
const GPIO_OUT_REG: usize = 0x6000_4004;
/// GPIO input level register.
const GPIO_IN_REG: usize = 0x6000_403C;

/// Highest GPIO number on the C3.
pub const MAX_GPIO: u8 = 21;

/// Highest ADC1 input (GPIO0..=GPIO4 are ADC1 channels 0..=4).
const MAX_ADC1_GPIO: u8 = 4;

/// 12-bit ADC ceiling.
const ADC_MAX: i32 = 4095;

/// LEDC timer resolution in bits.
const DUTY_BITS: u32 = 8;

/// The only port on the C3.
const GPIO_PORT: PortId = PortId(0);

/// ESP32-C3 board for [`MotorDriver`](crate::MotorDriver).
///
/// # Example
///
/// ```ignore
/// use rs_trackdrive::config::{BoardConfig, DriverConfig};
/// use rs_trackdrive::hal::esp32::Esp32Board;
/// use rs_trackdrive::MotorDriver;
///
/// let board = Esp32Board::new(BoardConfig::default().with_pwm(2, 0, 0))?;
/// let main = MotorDriver::new(&board, &DriverConfig::new(2, 6).with_current_sense(3, 1.0))?;
/// ```
pub struct Esp32Board {
    config: BoardConfig,
    adc: adc_oneshot_unit_handle_t,
    clock: Esp32Clock,
    shadow: ShadowPorts,
}

impl Esp32Board {
    /// Sets up ADC1 and one LEDC channel per PWM binding.
    ///
    /// # Errors
    ///
    /// Returns the ESP-IDF error if a peripheral refuses its configuration.
    pub fn new(config: BoardConfig) -> Result<Self, EspError> {
        let mut adc: adc_oneshot_unit_handle_t = ptr::null_mut();
        let unit = sys::adc_oneshot_unit_init_cfg_t {
            unit_id: sys::adc_unit_t_ADC_UNIT_1,
            ..Default::default()
        };
        // Safe: valid config pointer, handle written on success only
        esp!(unsafe { sys::adc_oneshot_new_unit(&unit, &mut adc) })?;

        for binding in &config.pwm {
            configure_ledc(binding)?;
        }
        println!(
            "[Board] {} ready, {} PWM channel(s)",
            config.name.as_str(),
            config.pwm.len()
        );

        Ok(Self {
            config,
            adc,
            clock: Esp32Clock::new(),
            shadow: ShadowPorts::new(&[GPIO_PORT]),
        })
    }

    /// Board configuration in use.
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    fn set_duty(&self, binding: &PwmBinding, duty: u8) {
        let channel = u32::from(binding.channel);
        // Safe: channel was configured in new(); LEDC calls are reentrant
        unsafe {
            let _ = esp!(sys::ledc_set_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel,
                pwm_compare(duty, DUTY_BITS)
            ));
            let _ = esp!(sys::ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel));
        }
    }
}

fn configure_ledc(binding: &PwmBinding) -> Result<(), EspError> {
    let timer = sys::ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        duty_resolution: sys::ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        timer_num: u32::from(binding.timer),
        freq_hz: DC_BASE_FREQUENCY_HZ,
        ..Default::default()
    };
    let channel = sys::ledc_channel_config_t {
        gpio_num: i32::from(binding.pin),
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        channel: u32::from(binding.channel),
        timer_sel: u32::from(binding.timer),
        duty: 0,
        hpoint: 0,
        ..Default::default()
    };
    // Safe: both configs are fully initialised and outlive the calls
    unsafe {
        esp!(sys::ledc_timer_config(&timer))?;
        esp!(sys::ledc_channel_config(&channel))?;
    }
    Ok(())
}

impl PinIo for Esp32Board {
    fn write_pin(&self, pin: u8, state: PinState) {
        // PWM-routed pins ignore the GPIO latch
        if let Some(binding) = self.config.pwm_binding(pin) {
            let duty = if state == PinState::High { 255 } else { 0 };
            self.set_duty(binding, duty);
            return;
        }
        self.set_pin_direction(pin, PinDirection::Output);
        // Safe: plain GPIO driver call on a valid pin number
        unsafe {
            sys::gpio_set_level(i32::from(pin), u32::from(state == PinState::High));
        }
    }

    fn set_pin_direction(&self, pin: u8, direction: PinDirection) {
        let mode = match direction {
            PinDirection::Input => gpio_mode_t_GPIO_MODE_INPUT,
            PinDirection::Output => gpio_mode_t_GPIO_MODE_OUTPUT,
        };
        // Safe: plain GPIO driver call on a valid pin number
        unsafe {
            sys::gpio_set_direction(i32::from(pin), mode);
        }
    }
}

impl FastPorts for Esp32Board {
    fn locate(&self, pin: u8) -> Option<(PortId, u8)> {
        (pin <= MAX_GPIO).then_some((GPIO_PORT, pin))
    }

    fn read_port(&self, port: PortId, register: RegisterKind) -> PortWord {
        if port != GPIO_PORT {
            return 0;
        }
        let address = match register {
            RegisterKind::Output => GPIO_OUT_REG,
            RegisterKind::Input => GPIO_IN_REG,
        };
        // Safe: fixed, always mapped peripheral registers
        unsafe { ptr::read_volatile(address as *const u32) }
    }

    fn write_port(&self, port: PortId, value: PortWord) {
        if port != GPIO_PORT {
            return;
        }
        // Safe: fixed, always mapped peripheral register
        unsafe { ptr::write_volatile(GPIO_OUT_REG as *mut u32, value) }
    }

    fn shadow_ports(&self) -> &ShadowPorts {
        &self.shadow
    }
}

impl AnalogSense for Esp32Board {
    fn init_channel(&self, pin: u8) -> i32 {
        if pin > MAX_ADC1_GPIO {
            println!("[Board] GPIO{} is not an ADC1 input", pin);
            return 0;
        }
        let config = sys::adc_oneshot_chan_cfg_t {
            atten: sys::adc_atten_t_ADC_ATTEN_DB_11,
            bitwidth: sys::adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        // Safe: handle created in new(), config outlives the call
        let configured =
            esp!(unsafe { sys::adc_oneshot_config_channel(self.adc, u32::from(pin), &config) });
        if let Err(err) = configured {
            println!("[Board] ADC channel {} setup failed: {}", pin, err);
            return 0;
        }
        // Zero point: the output is off while drivers are constructed
        self.read_channel(pin, ExecContext::Thread)
    }

    fn read_channel(&self, pin: u8, _ctx: ExecContext<'_>) -> i32 {
        let mut raw: i32 = 0;
        // Safe: handle created in new(), raw outlives the call
        let read = esp!(unsafe { sys::adc_oneshot_read(self.adc, u32::from(pin), &mut raw) });
        read.map(|_| raw).unwrap_or(0)
    }

    fn max_reading(&self) -> i32 {
        ADC_MAX
    }
}

impl PwmControl for Esp32Board {
    fn is_pwm_pin(&self, pin: u8) -> bool {
        self.config.pwm_binding(pin).is_some()
    }

    fn write_duty(&self, pin: u8, duty: u8) {
        if let Some(binding) = self.config.pwm_binding(pin) {
            self.set_duty(binding, duty);
        }
    }

    fn set_pwm_signal(&self, pin: u8, high: bool) {
        self.write_duty(pin, if high { 255 } else { 0 });
    }

    fn configure_dc_frequency(&self, pin: u8, speed: u8) {
        let Some(binding) = self.config.pwm_binding(pin) else {
            return;
        };
        // Safe: timer was configured in new()
        unsafe {
            let _ = esp!(sys::ledc_set_freq(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                u32::from(binding.timer),
                dc_tone_frequency(speed)
            ));
        }
    }
}

impl Clock for Esp32Board {
    #[inline]
    fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }
}

impl Drop for Esp32Board {
    fn drop(&mut self) {
        // Safe: handle created in new() and not used after this
        unsafe {
            sys::adc_oneshot_del_unit(self.adc);
        }
    }
}
