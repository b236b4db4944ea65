// literal.rs — Canonical text of literal values
//
// Ints print as exact decimal. Floats print in the shortest form that reads
// back to the same value: fixed notation for decimal exponents in [-4, 6),
// otherwise scientific with a signed two-digit exponent (`5e-10`, `1e+06`).
// Strings are wrapped in quotes with their raw text passed through.
//
// Preconditions: floats are finite (the lexer rejects literals that overflow).
// Postconditions: output is deterministic and reparses to an equal value.
// Failure modes: none.
// Side effects: none.

/// Decimal exponents outside `[MIN_FIXED_EXP, MAX_FIXED_EXP)` print in
/// scientific form.
const MIN_FIXED_EXP: i32 = -4;
const MAX_FIXED_EXP: i32 = 6;

pub fn format_int(n: i64) -> String {
    n.to_string()
}

pub fn format_bool(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Quote a raw string. Embedded quotes are not escaped.
pub fn format_string(s: &str) -> String {
    format!("\"{s}\"")
}

pub fn format_float(v: f64) -> String {
    // `{:e}` yields the shortest round-tripping digits as `d.ddde±x`.
    let sci = format!("{v:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if (MIN_FIXED_EXP..MAX_FIXED_EXP).contains(&exp) {
        return format!("{v}");
    }
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats() {
        assert_eq!(format_float(10.0), "10");
        assert_eq!(format_float(10.05), "10.05");
        assert_eq!(format_float(10.050), "10.05");
        assert_eq!(format_float(10.050000000), "10.05");
        assert_eq!(format_float(0.0000000005), "5e-10");
        assert_eq!(format_float(0.0005), "0.0005");
    }

    #[test]
    fn float_exponent_boundaries() {
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(-0.0001), "-0.0001");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(123456.0), "123456");
        assert_eq!(format_float(1000000.0), "1e+06");
        assert_eq!(format_float(1234567.0), "1.234567e+06");
        assert_eq!(format_float(-2.5e123), "-2.5e+123");
    }

    #[test]
    fn ints() {
        assert_eq!(format_int(0), "0");
        assert_eq!(format_int(10), "10");
        assert_eq!(format_int(1000000), "1000000");
        assert_eq!(format_int(-3), "-3");
    }

    #[test]
    fn strings_pass_through() {
        assert_eq!(format_string("blah"), "\"blah\"");
        assert_eq!(format_string("\"blah\""), "\"\"blah\"\"");
        assert_eq!(format_string(r"a\tb"), r#""a\tb""#);
    }

    #[test]
    fn bools() {
        assert_eq!(format_bool(true), "true");
        assert_eq!(format_bool(false), "false");
    }
}
