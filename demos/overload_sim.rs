//! Desktop simulation of a short circuit on the main track.
//!
//! Runs a main and a programming track on the mock board, shorts the main
//! track for a while and prints every power event, so the backoff growth and
//! the recovery can be watched without hardware.
//!
//! # Usage
//!
//! ```sh
//! cargo run --example overload_sim
//! ```

use rs_trackdrive::config::DriverConfig;
use rs_trackdrive::hal::MockBoard;
use rs_trackdrive::{MotorDriver, PowerMode, TrackGroup, TrackRole};

/// Simulated time step in milliseconds
const TICK_MS: u32 = 5;

/// Total simulated time
const RUN_MS: u32 = 30_000;

/// Short circuit window on the main track
const SHORT_FROM_MS: u32 = 2_000;
const SHORT_UNTIL_MS: u32 = 6_000;

/// Current sense pins
const MAIN_SENSE: u8 = 0;
const PROG_SENSE: u8 = 1;

/// Raw readings: normal load and dead short (1 raw unit = 2 mA)
const NORMAL_RAW: i32 = 200;
const SHORT_RAW: i32 = 1000;

fn main() -> anyhow::Result<()> {
    println!("=================================");
    println!("  rs-trackdrive Overload Sim");
    println!("=================================");
    println!();

    let board = MockBoard::new();

    let main = MotorDriver::new(
        &board,
        &DriverConfig::new(3, 12)
            .with_brake(9)
            .with_current_sense(MAIN_SENSE, 2.0)
            .with_trip_ma(1500),
    )?;
    let prog = MotorDriver::new(
        &board,
        &DriverConfig::new(11, 13)
            .with_brake(8)
            .with_current_sense(PROG_SENSE, 2.0),
    )?;

    let mut tracks = TrackGroup::new();
    let main_id = tracks.add(main, TrackRole::Main)?;
    tracks.add(prog, TrackRole::Prog)?;

    tracks.set_power(TrackRole::Main, PowerMode::On);
    tracks.set_power(TrackRole::Prog, PowerMode::On);
    board.set_analog(MAIN_SENSE, NORMAL_RAW);

    let mut elapsed = 0;
    while elapsed < RUN_MS {
        let raw = match elapsed {
            t if (SHORT_FROM_MS..SHORT_UNTIL_MS).contains(&t) => SHORT_RAW,
            _ => NORMAL_RAW,
        };
        board.set_analog(MAIN_SENSE, raw);

        if let Some(event) = tracks.poll() {
            println!("[{:>6}ms] {}", elapsed, event);
        }

        board.advance(TICK_MS);
        elapsed += TICK_MS;
    }

    println!();
    if let Some(driver) = tracks.driver(main_id) {
        println!(
            "Main track {} after {}ms, next backoff {}ms, {} clean samples",
            driver.power_mode().as_str(),
            RUN_MS,
            driver.backoff_ms(),
            driver.good_samples()
        );
    }
    Ok(())
}
