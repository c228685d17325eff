//! Diagnostic line sink.
//!
//! `diag!` takes `format_args!` style arguments. Where the line goes depends
//! on the build: `defmt` when that feature is on, stdout with a `[DCC]` tag
//! under `std`, nowhere otherwise. Emitting never fails.

#[cfg(feature = "defmt")]
const MAX_LINE: usize = 96;

#[cfg(feature = "defmt")]
pub(crate) fn emit(args: core::fmt::Arguments<'_>) {
    use core::fmt::Write;

    let mut line: heapless::String<MAX_LINE> = heapless::String::new();
    // Overlong lines go out truncated
    let _ = line.write_fmt(args);
    defmt::info!("[DCC] {=str}", line.as_str());
}

#[cfg(all(feature = "std", not(feature = "defmt")))]
pub(crate) fn emit(args: core::fmt::Arguments<'_>) {
    println!("[DCC] {}", args);
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
pub(crate) fn emit(_args: core::fmt::Arguments<'_>) {}

macro_rules! diag {
    ($($arg:tt)*) => {
        $crate::diag::emit(format_args!($($arg)*))
    };
}
