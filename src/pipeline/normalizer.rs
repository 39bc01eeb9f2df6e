use serde::Deserialize;

use crate::core::types::{Indicators, IocKind, RawIndicators};

/// What to do with values that normalize to the empty string.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmptyValuePolicy {
    /// Pass them through to storage unchanged.
    #[default]
    Keep,
    Drop,
}

/// Undoes common defanging: `[.]`, `(.)`, `hxxp://`, `hxxps://`.
pub fn refang(value: &str) -> String {
    value
        .replace("[.]", ".")
        .replace("(.)", ".")
        .replace("hxxp://", "http://")
        .replace("hxxps://", "https://")
}

pub fn normalize(kind: IocKind, raw: &str) -> String {
    match kind {
        IocKind::Ip => raw.trim().to_string(),
        IocKind::Domain | IocKind::Url => {
            let mut value = refang(&raw.trim().to_lowercase());
            if value.ends_with('/') {
                value.pop();
            }
            value
        }
    }
}

/// Canonicalizes a raw extraction batch and deduplicates each kind.
pub fn normalize_indicators(raw: &RawIndicators, policy: EmptyValuePolicy) -> Indicators {
    let mut out = Indicators::default();
    for (values, kind) in [
        (&raw.urls, IocKind::Url),
        (&raw.domains, IocKind::Domain),
        (&raw.ips, IocKind::Ip),
    ] {
        for value in values {
            let canonical = normalize(kind, value);
            if canonical.is_empty() && policy == EmptyValuePolicy::Drop {
                continue;
            }
            match kind {
                IocKind::Url => out.urls.insert(canonical),
                IocKind::Domain => out.domains.insert(canonical),
                IocKind::Ip => out.ips.insert(canonical),
            };
        }
    }
    out
}
