/// Format a number with thousands separators and a fixed number of decimal
/// places.
///
/// # Examples
///
/// ```
/// use ev_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5, 1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by a relative epsilon so exact midpoints such as 1.005 round up.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let grouped = group_thousands(&(rounded.trunc() as u64).to_string());

    let body = if decimals == 0 {
        grouped
    } else {
        let frac = format!(
            "{:.prec$}",
            rounded - rounded.trunc(),
            prec = decimals as usize
        );
        // `frac` is "0.xx"; keep ".xx".
        format!("{}{}", grouped, &frac[1..])
    };

    if negative && rounded != 0.0 {
        format!("-{}", body)
    } else {
        body
    }
}

/// Format an energy amount in kWh with two decimals.
///
/// ```
/// use ev_core::formatting::format_energy;
///
/// assert_eq!(format_energy(12345.678), "12,345.68 kWh");
/// ```
pub fn format_energy(kwh: f64) -> String {
    format!("{} kWh", format_number(kwh, 2))
}

/// Format a duration in minutes as `"45m"`, `"3h"` or `"3h 45m"`.
///
/// ```
/// use ev_core::formatting::format_duration;
///
/// assert_eq!(format_duration(45.0), "45m");
/// assert_eq!(format_duration(180.0), "3h");
/// assert_eq!(format_duration(225.0), "3h 45m");
/// ```
pub fn format_duration(minutes: f64) -> String {
    let total_mins = minutes.round() as i64;
    if total_mins < 60 {
        return format!("{}m", total_mins);
    }
    let (hours, mins) = (total_mins / 60, total_mins % 60);
    if mins == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h {}m", hours, mins)
    }
}

/// Render fractional hours since midnight as `HH:MM`.
///
/// ```
/// use ev_core::formatting::format_time_of_day;
///
/// assert_eq!(format_time_of_day(8.5), "08:30");
/// assert_eq!(format_time_of_day(23.999), "23:59");
/// ```
pub fn format_time_of_day(hours: f64) -> String {
    let total_mins = ((hours * 60.0).floor() as i64).clamp(0, 24 * 60 - 1);
    format!("{:02}:{:02}", total_mins / 60, total_mins % 60)
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero.
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let factor = 10_f64.powi(decimal_places as i32);
    ((part / whole) * 100.0 * factor).round() / factor
}

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
