use crate::model::{ArchiveScope, CompressionKind};
use chrono::{DateTime, Datelike, Local};

/// How much of the reference time survives in the resolved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePrecision {
    /// Day is pinned to `01`, time of day to `00`.
    Month,
    /// Time of day is pinned to `00`.
    Day,
    /// Everything comes from the reference time.
    Instant,
}

impl From<ArchiveScope> for NamePrecision {
    fn from(scope: ArchiveScope) -> Self {
        match scope {
            ArchiveScope::Monthly => NamePrecision::Month,
            ArchiveScope::Daily => NamePrecision::Day,
        }
    }
}

/// Resolve `%Y %m %d %H %M %S %y %j %F` in one pass. Unknown `%x` sequences are
/// kept as written.
pub fn resolve_pattern(
    pattern: &str,
    reference: &DateTime<Local>,
    precision: NamePrecision,
    file_stem: &str,
) -> String {
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(&token) = chars.peek() else {
            out.push(c);
            break;
        };
        let value = match token {
            'Y' => Some(format!("{:04}", reference.year())),
            'm' => Some(reference.format("%m").to_string()),
            'd' => Some(match precision {
                NamePrecision::Month => "01".to_string(),
                _ => reference.format("%d").to_string(),
            }),
            'H' | 'M' | 'S' => Some(match precision {
                NamePrecision::Instant => reference.format(&format!("%{}", token)).to_string(),
                _ => "00".to_string(),
            }),
            'y' => Some(reference.format("%y").to_string()),
            'j' => Some(format!("{:03}", reference.ordinal())),
            'F' => Some(file_stem.to_string()),
            _ => None,
        };
        match value {
            Some(value) => {
                out.push_str(&value);
                chars.next();
            }
            None => out.push(c),
        }
    }

    out
}

/// File name for a period container. `%F` resolves to `logs`.
pub fn group_container_name(
    pattern: &str,
    reference: &DateTime<Local>,
    scope: ArchiveScope,
    kind: CompressionKind,
) -> String {
    let stem = resolve_pattern(pattern, reference, scope.into(), "logs");
    format!("{}{}", stem, kind.extension())
}

/// File name for a single-file container, resolved against wall-clock `now`.
/// Without a `%F` token the source stem is appended as `_<stem>`.
pub fn file_container_name(
    pattern: &str,
    now: &DateTime<Local>,
    source_stem: &str,
    kind: CompressionKind,
) -> String {
    let mut stem = resolve_pattern(pattern, now, NamePrecision::Instant, source_stem);
    if !pattern.contains("%F") {
        stem.push('_');
        stem.push_str(source_stem);
    }
    format!("{}{}", stem, kind.extension())
}
