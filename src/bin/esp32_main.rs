//! ESP32-C3 SuperMini track output firmware.
//!
//! This is the main entry point for the physical hardware. It sets up a main
//! and a programming track on a dual bridge shield and runs the overload
//! supervision loop:
//! - Polls one track per iteration for overload
//! - Logs overload, restore and common fault events
//! - Restores power after the backoff expires
//!
//! The DCC waveform generator is a separate component; it calls
//! `TrackGroup::set_dcc_signal` / `set_prog_signal` from its timer interrupt.
//!
//! # Build
//!
//! ```bash
//! cargo build --release --no-default-features --features esp32 --bin esp32_main
//! ```

use rs_trackdrive::config::{BoardConfig, DriverConfig, OverloadConfig};
use rs_trackdrive::hal::esp32::{pins, Esp32Board, Esp32Clock};
use rs_trackdrive::traits::Clock;
use rs_trackdrive::{MotorDriver, PowerMode, TrackGroup, TrackRole};
use std::sync::atomic::AtomicU8;
use std::thread;
use std::time::Duration;

/// Loop interval in milliseconds
const LOOP_INTERVAL_MS: u64 = 1;

/// Status line interval in milliseconds
const STATUS_INTERVAL_MS: u32 = 10_000;

/// Sense factor of the shield (mA per raw ADC unit)
const SENSE_FACTOR: f32 = 0.6;

/// Main track trip current
const MAIN_TRIP_MA: u32 = 2000;

/// Reset packet counter shared with the waveform generator
static PROG_RESETS: AtomicU8 = AtomicU8::new(0);

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_hal::sys::link_patches();

    println!();
    println!("================================");
    println!("  rs-trackdrive SuperMini");
    println!("================================");
    println!();

    // =========================================================================
    // Board (GPIO, ADC1, LEDC)
    // =========================================================================
    let board_config = BoardConfig::default()
        .with_name("SuperMini dual bridge")
        .with_pwm(pins::MAIN_POWER as u8, pins::MAIN_PWM_CHANNEL, 0)
        .with_pwm(pins::PROG_POWER as u8, pins::PROG_PWM_CHANNEL, 1);
    let board = Esp32Board::new(board_config)?;
    println!("[OK] Board initialized");

    // =========================================================================
    // Track outputs
    // =========================================================================
    let main_config = DriverConfig::new(pins::MAIN_POWER, pins::MAIN_SIGNAL)
        .with_brake(pins::MAIN_BRAKE)
        .with_current_sense(pins::MAIN_CURRENT, SENSE_FACTOR)
        .with_trip_ma(MAIN_TRIP_MA)
        .with_fault(pins::FAULT);
    let prog_config = DriverConfig::new(pins::PROG_POWER, pins::PROG_SIGNAL)
        .with_brake(pins::PROG_BRAKE)
        .with_current_sense(pins::PROG_CURRENT, SENSE_FACTOR)
        .with_fault(pins::FAULT);

    let timing = OverloadConfig::default();
    let main = MotorDriver::with_overload_config(&board, &main_config, timing)?;
    let prog = MotorDriver::with_overload_config(&board, &prog_config, timing)?;

    let mut tracks = TrackGroup::new().with_reset_counter(&PROG_RESETS);
    let main_id = tracks.add(main, TrackRole::Main)?;
    let prog_id = tracks.add(prog, TrackRole::Prog)?;
    println!("[OK] Track {} MAIN, track {} PROG", main_id, prog_id);

    // =========================================================================
    // Power up
    // =========================================================================
    tracks.set_power(TrackRole::Main, PowerMode::On);
    tracks.set_power(TrackRole::Prog, PowerMode::On);

    let clock = Esp32Clock::new();
    let mut last_status = clock.now_ms();

    println!();
    println!("Starting overload supervision...");
    println!();

    // =========================================================================
    // Main Loop
    // =========================================================================
    loop {
        if let Some(event) = tracks.poll() {
            println!("[Track] {}", event);
        }

        let now = clock.now_ms();
        if now.wrapping_sub(last_status) >= STATUS_INTERVAL_MS {
            last_status = now;
            for id in [main_id, prog_id] {
                if let Some(driver) = tracks.driver(id) {
                    println!(
                        "[Status] TRACK {} {} {}mA",
                        id,
                        driver.power_mode().as_str(),
                        driver.raw_to_ma(driver.last_current())
                    );
                }
            }
        }

        thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
    }
}
