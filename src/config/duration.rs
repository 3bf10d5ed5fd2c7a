//! Go-style duration strings
//!
//! Release timeouts and intervals are written the way the helm-controller and
//! Argo expect them (`5m`, `1h30m`, `5m0s`, `300ms`).

use anyhow::{Context, Result};
use std::time::Duration;

/// Parse a Go duration string made of one or more `<number><unit>` segments
///
/// Supported units: `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Invalid duration format: empty string");
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .with_context(|| format!("Missing unit in duration: {}", s))?;
        if digits == 0 {
            anyhow::bail!("Invalid duration format: {}", s);
        }
        let value: u64 = rest[..digits]
            .parse()
            .with_context(|| format!("Invalid number in duration: {}", s))?;
        rest = &rest[digits..];

        let (unit, len) = if rest.starts_with("ms") {
            (Duration::from_millis(1), 2)
        } else if rest.starts_with('s') {
            (Duration::from_secs(1), 1)
        } else if rest.starts_with('m') {
            (Duration::from_secs(60), 1)
        } else if rest.starts_with('h') {
            (Duration::from_secs(3600), 1)
        } else {
            anyhow::bail!("Invalid duration unit in: {}", s);
        };
        rest = &rest[len..];

        let segment = unit
            .checked_mul(u32::try_from(value).context("Duration segment too large")?)
            .with_context(|| format!("Duration overflow: {}", s))?;
        total += segment;
    }

    Ok(total)
}
