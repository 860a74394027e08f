#[derive(Clone, Copy, PartialEq, Eq)]
pub struct U24([u8; 3]);

impl U24 {
    pub const ZERO: U24 = U24([0, 0, 0]);

    pub fn from_usize(x: usize) -> Option<U24> {
        if x >= (1 << 24) {
            return None;
        }
        let [a, b, c, _] = u32::to_le_bytes(x as u32);
        Some(U24([a, b, c]))
    }

    pub fn to_u32(self) -> u32 {
        let [a, b, c] = self.0;
        u32::from_le_bytes([a, b, c, 0])
    }

    pub fn to_usize(self) -> usize {
        const {
            assert!(std::mem::size_of::<u32>() <= std::mem::size_of::<usize>());
        }
        self.to_u32() as usize
    }
}

impl std::fmt::Debug for U24 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_u32().fmt(f)
    }
}

/// Rounds `value` up to the closest multiple of `alignment`.
pub fn round_up(alignment: u64, value: u64) -> u64 {
    debug_assert_ne!(alignment, 0);
    value.div_ceil(alignment) * alignment
}

/// Formats a float the way `printf("%.20g")` would, but with the shortest digits that round-trip.
///
/// Used for values in diagnostics, so that `1e39` prints as `1e+39` and `3.0` as `3`.
pub fn display_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf".into() } else { "inf".into() };
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0".into() } else { "0".into() };
    }

    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-5..20).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs());
    }

    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting() {
        assert_eq!(display_float(3.0), "3");
        assert_eq!(display_float(0.5), "0.5");
        assert_eq!(display_float(-1.25), "-1.25");
        assert_eq!(display_float(1e39), "1e+39");
        assert_eq!(display_float(65536.0), "65536");
        assert_eq!(display_float(1.5e-7), "1.5e-07");
        assert_eq!(display_float(f64::INFINITY), "inf");
    }

    #[test]
    fn rounding() {
        assert_eq!(round_up(4, 0), 0);
        assert_eq!(round_up(4, 5), 8);
        assert_eq!(round_up(16, 16), 16);
    }
}
