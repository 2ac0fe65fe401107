/// A real with a mandatory decimal point and an upper-case exponent, as
/// both exchange formats require. Shortest round-trip digits.
pub(crate) fn real(v: f64) -> String {
    if !v.is_finite() {
        return "0.".to_string();
    }
    let s = format!("{v:?}");
    match s.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => format!("{mantissa}E{exponent}"),
        Some((mantissa, exponent)) => format!("{mantissa}.E{exponent}"),
        None if s.contains('.') => s,
        None => format!("{s}."),
    }
}

/// Parse a real that may use a Fortran `D` exponent or omit digits
/// around the decimal point.
pub(crate) fn parse_real(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let normalized = text.replace(['D', 'd'], "E");
    normalized.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_formatting() {
        assert_eq!(real(0.0), "0.0");
        assert_eq!(real(-2.5), "-2.5");
        assert_eq!(real(1e-7), "1.E-7");
        assert_eq!(real(1.5e20), "1.5E20");
        assert_eq!(real(f64::NAN), "0.");
    }

    #[test]
    fn test_parse_real_variants() {
        assert_eq!(parse_real("1.5D2"), Some(150.0));
        assert_eq!(parse_real(" 2. "), Some(2.0));
        assert_eq!(parse_real(".5"), Some(0.5));
        assert_eq!(parse_real("3"), Some(3.0));
        assert_eq!(parse_real(""), None);
        assert_eq!(parse_real("x"), None);
    }
}
