//! Display formatting for container attributes.

use itertools::Itertools;

use crate::model::Port;

const DECIMAL_UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Format published ports the way `docker ps` does.
///
/// `80/tcp`, `8080:80/tcp`, `0.0.0.0:8080:80/tcp`, joined with `", "`.
pub fn format_ports(ports: &[Port]) -> String {
    ports
        .iter()
        .map(|port| {
            let kind = port.kind.as_deref().unwrap_or_default();
            match (port.public_port.unwrap_or(0), port.ip.as_deref()) {
                (0, _) => format!("{}/{kind}", port.private_port),
                (public, None | Some("")) => {
                    format!("{public}:{}/{kind}", port.private_port)
                }
                (public, Some(ip)) => format!("{ip}:{public}:{}/{kind}", port.private_port),
            }
        })
        .join(", ")
}

/// Human readable size in decimal units with three significant digits.
///
/// `1234` gives `1.23kB`, `0` gives `0B`.
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: i64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size.abs() >= 1000.0 && unit < DECIMAL_UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    format!("{}{}", significant(size, 3), DECIMAL_UNITS[unit])
}

/// Writable layer size, plus the virtual size when known.
pub fn format_filesystem(size_rw: i64, size_root_fs: i64) -> String {
    let rw = human_size(size_rw);
    if size_root_fs > 0 {
        format!("{rw} (virtual {})", human_size(size_root_fs))
    } else {
        rw
    }
}

/// Shortest `%g` style rendering with `digits` significant digits.
fn significant(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.*e}", digits.saturating_sub(1), value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let max_exponent = i32::try_from(digits).unwrap_or(i32::MAX);

    if exponent < -4 || exponent >= max_exponent {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        );
    }

    let decimals = usize::try_from(max_exponent - 1 - exponent).unwrap_or(0);
    trim_fraction(&format!("{value:.decimals$}")).to_string()
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn port(ip: Option<&str>, private_port: u16, public_port: Option<u16>) -> Port {
        Port {
            ip: ip.map(String::from),
            private_port,
            public_port,
            kind: Some("tcp".to_string()),
        }
    }

    #[test]
    fn test_format_ports() {
        assert_eq!(format_ports(&[port(None, 80, None)]), "80/tcp");
        assert_eq!(format_ports(&[port(None, 80, Some(0))]), "80/tcp");
        assert_eq!(format_ports(&[port(None, 80, Some(8080))]), "8080:80/tcp");
        assert_eq!(
            format_ports(&[port(Some("0.0.0.0"), 80, Some(8080))]),
            "0.0.0.0:8080:80/tcp"
        );
        assert_eq!(
            format_ports(&[
                port(Some("0.0.0.0"), 80, Some(8080)),
                port(Some("::"), 80, Some(8080)),
                port(None, 443, None),
            ]),
            "0.0.0.0:8080:80/tcp, :::8080:80/tcp, 443/tcp"
        );
        assert_eq!(format_ports(&[]), "");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(human_size(999), "999B");
        assert_eq!(human_size(1234), "1.23kB");
        assert_eq!(human_size(100_000), "100kB");
        assert_eq!(human_size(1_000_000), "1MB");
        assert_eq!(human_size(1_500_000_000), "1.5GB");
        assert_eq!(human_size(2_345_678), "2.35MB");
    }

    #[test]
    fn test_human_size_rounds_into_exponent_form() {
        // 999.999kB rounds to four digits, so %g switches to exponent form.
        assert_eq!(human_size(999_999), "1e+03kB");
    }

    #[test]
    fn test_format_filesystem() {
        assert_eq!(format_filesystem(1234, 0), "1.23kB");
        assert_eq!(
            format_filesystem(1234, 52_000_000),
            "1.23kB (virtual 52MB)"
        );
        assert_eq!(format_filesystem(0, 0), "0B");
    }

    proptest! {
        #[test]
        fn prop_human_size_has_known_unit(bytes in 0i64..i64::MAX) {
            let rendered = human_size(bytes);
            prop_assert!(DECIMAL_UNITS.iter().any(|unit| rendered.ends_with(unit)));
        }

        #[test]
        fn prop_small_sizes_are_exact(bytes in 0i64..1000) {
            prop_assert_eq!(human_size(bytes), format!("{bytes}B"));
        }

        #[test]
        fn prop_unpublished_ports_omit_host_side(private_port in 1u16..) {
            let rendered = format_ports(&[port(Some("0.0.0.0"), private_port, None)]);
            prop_assert_eq!(rendered, format!("{private_port}/tcp"));
        }
    }
}
