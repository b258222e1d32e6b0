//! Provides parsing and formatting helpers for byte sizes.
//!
//! Cache budgets in the config are given as strings like `16m` or `2g`;
//! [parse_size] turns them into a byte count and [format_size] renders byte
//! counts for log output.

/// Formats a given size in bytes.
///
/// This determines the ideal unit (ranging from bytes to petabytes) to
/// provide a concise representation. A size of zero is rendered as
/// "unbounded", as that is what a zero cache budget means.
///
/// # Examples
/// ```
/// assert_eq!(callisto::fmt::format_size(0), "unbounded");
/// assert_eq!(callisto::fmt::format_size(1), "1 byte");
/// assert_eq!(callisto::fmt::format_size(512), "512 bytes");
/// assert_eq!(callisto::fmt::format_size(2048), "2.00 KiB");
/// assert_eq!(callisto::fmt::format_size(16 * 1024 * 1024), "16.0 MiB");
/// assert_eq!(callisto::fmt::format_size(3 * 1024 * 1024 * 1024), "3.00 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    if size_in_bytes == 0 {
        return "unbounded".to_owned();
    } else if size_in_bytes == 1 {
        return "1 byte".to_owned();
    } else if size_in_bytes < 1024 {
        return format!("{} bytes", size_in_bytes);
    }

    let mut magnitude = 0;
    let mut size = size_in_bytes as f64;
    while size >= 1024. && magnitude < 5 {
        size /= 1024.;
        magnitude += 1;
    }

    let unit = ["bytes", "KiB", "MiB", "GiB", "TiB", "PiB"][magnitude];
    if size < 10. {
        format!("{:.2} {}", size, unit)
    } else if size < 100. {
        format!("{:.1} {}", size, unit)
    } else {
        format!("{:.0} {}", size, unit)
    }
}

/// Parses a byte size with the common suffixes k, m, g and t.
///
/// Suffixes are case insensitive and denote powers of 1024. A plain number is
/// taken as bytes. An empty string yields zero, which callers treat as
/// "unbounded".
///
/// # Examples
/// ```
/// assert_eq!(callisto::fmt::parse_size("").unwrap(), 0);
/// assert_eq!(callisto::fmt::parse_size("42").unwrap(), 42);
/// assert_eq!(callisto::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(callisto::fmt::parse_size("16M").unwrap(), 16 * 1024 * 1024);
/// assert_eq!(callisto::fmt::parse_size("1g").unwrap(), 1024 * 1024 * 1024);
/// assert_eq!(callisto::fmt::parse_size("no size").is_err(), true);
/// ```
pub fn parse_size(value: &str) -> anyhow::Result<usize> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }

    let (digits, factor) = match value.chars().last() {
        Some('k') | Some('K') => (&value[..value.len() - 1], 1024),
        Some('m') | Some('M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        Some('t') | Some('T') => (&value[..value.len() - 1], 1024_usize.pow(4)),
        _ => (value, 1),
    };

    let number: usize = digits
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("'{}' is not a valid size", value))?;

    Ok(number * factor)
}

#[cfg(test)]
mod tests {
    use super::{format_size, parse_size};

    #[test]
    fn sizes_survive_a_round_trip() {
        for (input, bytes) in [
            ("0", 0),
            ("1023", 1023),
            ("4k", 4096),
            ("4 k", 4096),
            ("512M", 512 * 1024 * 1024),
            ("2T", 2 * 1024_usize.pow(4)),
        ] {
            assert_eq!(parse_size(input).unwrap(), bytes);
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_size("12x").is_err());
        assert!(parse_size("k").is_err());
        assert!(parse_size("-5").is_err());
    }

    #[test]
    fn formatting_picks_a_concise_unit() {
        assert_eq!(format_size(0), "unbounded");
        assert_eq!(format_size(100), "100 bytes");
        assert_eq!(format_size(100 * 1024), "100 KiB");
        assert_eq!(format_size(640 * 1024 * 1024), "640 MiB");
    }
}
