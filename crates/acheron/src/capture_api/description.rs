//! Human-readable signal text for configuration screens.
use acheron_capture::prelude::*;

use super::CaptureError;

/// Text shown when nothing is connected.
pub const NO_SIGNAL_TEXT: &str = "No signal detected";
/// Text shown when the signal cannot be captured.
pub const OUT_OF_RANGE_TEXT: &str = "Signal out of range";

/// Describe `info` as `"<type> <w>x<h> <refresh>Hz"` or a no-signal / out-of-range message.
///
/// # Example
/// ```rust
/// use acheron::prelude::*;
///
/// let info = SignalInfo {
///     kind: SignalType::Dvi,
///     width: 1920,
///     height: 1080,
///     refresh_millihz: 59_940,
/// };
/// assert_eq!(describe_signal(&info), "DVI 1920x1080 59.94Hz");
/// assert_eq!(describe_signal(&SignalInfo::none()), "No signal detected");
/// ```
pub fn describe_signal(info: &SignalInfo) -> String {
    match info.kind.label() {
        Some(label) => format!(
            "{label} {}x{} {}Hz",
            info.width,
            info.height,
            format_general(f64::from(info.refresh_millihz) / 1000.0, 5)
        ),
        None if info.kind == SignalType::OutOfRange => OUT_OF_RANGE_TEXT.to_string(),
        None => NO_SIGNAL_TEXT.to_string(),
    }
}

/// Query the driver for the current signal on `input` and describe it.
pub fn signal_description(driver: &dyn CaptureDriver, input: u32) -> Result<String, CaptureError> {
    let info = driver.signal_info(input)?;
    Ok(describe_signal(&info))
}

/// `value` with `precision` significant digits and trailing zeros removed, switching to an
/// exponent outside `1e-4..10^precision`.
fn format_general(value: f64, precision: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let digits = precision.max(1) - 1;
    let sci = format!("{value:.digits$e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= precision as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs());
    }
    let decimals = (precision as i32 - 1 - exp).max(0) as usize;
    trim_fraction(&format!("{value:.decimals$}")).to_string()
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
