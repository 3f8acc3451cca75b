//! Provides formatting and parsing helpers for byte sizes.

/// Formats a given size in bytes.
///
/// This function determines the ideal unit (ranging from bytes to petabytes) to provide
/// a concise representation.
///
/// Note that a helper function [format_size](format_size) is also provided
/// which directly returns a String. This function also provides some examples.
pub fn format_bytes(size_in_bytes: usize, f: &mut dyn std::fmt::Write) -> std::fmt::Result {
    if size_in_bytes == 1 {
        return write!(f, "1 byte");
    } else if size_in_bytes < 1024 {
        return write!(f, "{} bytes", size_in_bytes);
    }

    let mut magnitude = 0;
    let mut size = size_in_bytes as f32;
    while size > 1024. && magnitude < 5 {
        size /= 1024.;
        magnitude += 1;
    }

    if size <= 10. {
        write!(f, "{:.2} ", size)?;
    } else if size <= 100. {
        write!(f, "{:.1} ", size)?;
    } else {
        write!(f, "{:.0} ", size)?;
    }

    match magnitude {
        0 => write!(f, "Bytes"),
        1 => write!(f, "KiB"),
        2 => write!(f, "MiB"),
        3 => write!(f, "GiB"),
        4 => write!(f, "TiB"),
        _ => write!(f, "PiB"),
    }
}

/// Formats a given size in bytes and returns the result as a String.
///
/// This function determines the ideal unit (ranging from bytes to petabytes) to provide
/// a concise representation.
///
/// Note that a helper function [format_bytes](format_bytes) is also provided
/// which directly consumes a **std::fmt::Write**.
///
/// # Examples
///
/// ```
/// assert_eq!(meshcache::fmt::format_size(0), "0 bytes");
/// assert_eq!(meshcache::fmt::format_size(1), "1 byte");
/// assert_eq!(meshcache::fmt::format_size(100), "100 bytes");
/// assert_eq!(meshcache::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(meshcache::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(meshcache::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(meshcache::fmt::format_size(8_734_000), "8.33 MiB");
/// assert_eq!(meshcache::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    let mut result = String::new();
    let _ = format_bytes(size_in_bytes, &mut result);
    result
}

/// Parses a size in bytes from a given string.
///
/// This string can have the following suffixes:
/// * **b** or **B**: treats the value as bytes (same as no suffix at all)
/// * **k** or **K**: treats the value as kilobytes (1024 bytes)
/// * **m** or **M**: treats the value as megabytes (1024 * 1024 bytes)
/// * **g** or **G**: treats the value as gigabytes (1024 * 1024 * 1024 bytes)
/// * **t** or **T**: treats the value as terabytes (1024 * 1024 * 1024 * 1024 bytes)
///
/// Returns an **Err** if either a non-integer value is given or if an unknown suffix
/// was provided.
///
/// # Examples
///
/// ```
/// assert_eq!(meshcache::fmt::parse_size("512").unwrap(), 512);
/// assert_eq!(meshcache::fmt::parse_size("512 b").unwrap(), 512);
/// assert_eq!(meshcache::fmt::parse_size("4 k").unwrap(), 4 * 1024);
/// assert_eq!(meshcache::fmt::parse_size("64m").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(meshcache::fmt::parse_size("2 G").unwrap(), 2 * 1024 * 1024 * 1024);
///
/// // An invalid suffix results in an error...
/// assert_eq!(meshcache::fmt::parse_size("3 Y").is_err(), true);
///
/// // Decimal numbers result in an error...
/// assert_eq!(meshcache::fmt::parse_size("1.2g").is_err(), true);
///
/// // Negative numbers result in an error...
/// assert_eq!(meshcache::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *([bBkKmMgGtT]?) *$").unwrap();
    }

    match NUMBER_AND_SUFFIX.captures(str.as_ref()) {
        Some(captures) => {
            let number = captures[1].parse::<usize>().unwrap();
            match &captures[2] {
                "k" | "K" => Ok(number * 1024),
                "m" | "M" => Ok(number * 1024 * 1024),
                "g" | "G" => Ok(number * 1024 * 1024 * 1024),
                "t" | "T" => Ok(number * 1024 * 1024 * 1024 * 1024),
                _ => Ok(number),
            }
        }
        None => Err(anyhow::anyhow!(
            "Cannot parse '{}' into a size expression.\
             Expected a positive number and optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
            str.as_ref()
        )),
    }
}
