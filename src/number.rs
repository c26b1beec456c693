//! Numeric formatting shared by the passes that rewrite numbers.

/// Round `n` to `precision` decimal places.
pub fn round(n: f64, precision: u8) -> f64 {
    if !n.is_finite() || precision > 15 {
        return n;
    }
    let factor = 10f64.powi(precision as i32);
    let rounded = (n * factor).round() / factor;
    if rounded.is_finite() { rounded } else { n }
}

/// Shortest decimal form of `n`: `1` rather than `1.0`, `0` for `-0`.
pub fn format(n: f64) -> String {
    if n == 0.0 {
        return "0".into();
    }
    if !n.is_finite() {
        return n.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let mut buf = ryu::Buffer::new();
    buf.format_finite(n).to_string()
}

/// `0.5` -> `.5`, `-0.5` -> `-.5`.
pub fn remove_leading_zero(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("0.") {
        format!(".{rest}")
    } else if let Some(rest) = s.strip_prefix("-0.") {
        format!("-.{rest}")
    } else {
        s.to_string()
    }
}

/// Round, format and strip the leading zero in one go.
pub fn format_number(n: f64, precision: u8) -> String {
    remove_leading_zero(&format(round(n, precision)))
}
