//! Domain and package-name normalization and comparison.

/// Leading labels that mark a reversed-domain app id (`com.example.app`).
static PACKAGE_PREFIXES: &[&str] = &[
    "com", "net", "org", "edu", "gov", "int", "io",
    "nl", "de", "uk", "fr", "it", "es", "pl", "be", "ch", "at", "se", "no", "dk", "fi",
    "us", "ca", "br", "au", "nz", "jp", "cn", "in", "kr", "tw", "hk", "sg", "ru",
];

/// Public suffixes with two labels, so `login.example.co.uk` roots at
/// `example.co.uk` rather than `co.uk`.
static TWO_LEVEL_SUFFIXES: &[&str] = &[
    "com.au", "net.au", "org.au", "edu.au", "gov.au",
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk",
    "co.jp", "ne.jp", "or.jp", "ac.jp",
    "co.nz", "org.nz", "govt.nz",
    "co.za", "org.za",
    "co.in", "net.in", "org.in",
    "co.kr", "or.kr",
    "com.br", "net.br", "org.br",
    "com.cn", "net.cn", "org.cn",
    "com.hk", "com.tw", "com.sg",
    "com.mx", "com.ar", "com.tr", "com.ru",
];

/// How a stored domain relates to the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainRelation {
    /// Same host after normalization
    Exact,
    /// One host is a proper subdomain of the other
    Subdomain,
    /// Different hosts under the same registrable root
    SameRoot,
}

/// True when `text` looks like an app package id rather than a host.
pub fn is_app_package_name(text: &str) -> bool {
    if !text.contains('.') || text.contains("://") {
        return false;
    }
    let first = text.split('.').next().unwrap_or("").to_lowercase();
    PACKAGE_PREFIXES.contains(&first.as_str())
        && text.split('.').count() >= 3
}

/// Lenient host normalization: lower-case, strip scheme, `www.`, port and
/// path. Returns `None` for blank input.
pub fn normalize_host(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    let without_scheme = match lowered.find("://") {
        Some(pos) => &lowered[pos + 3..],
        None => lowered.as_str(),
    };
    let host_and_port = without_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");
    let host = host_and_port.split(':').next().unwrap_or("");
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Strict domain extraction for stored site URLs.
///
/// Returns an empty string when the value is not a usable host: no dot,
/// invalid characters, or a bare package id.
pub fn extract_domain(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() || (!trimmed.contains("://") && is_app_package_name(trimmed)) {
        return String::new();
    }

    let host = match normalize_host(trimmed) {
        Some(host) => host,
        None => return String::new(),
    };

    let valid_chars = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !host.contains('.')
        || !valid_chars
        || host.starts_with('.')
        || host.ends_with('.')
        || host.contains("..")
    {
        return String::new();
    }

    host
}

/// Registrable root of a host, aware of two-label public suffixes.
pub fn extract_root_domain(domain: &str) -> String {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return domain.to_string();
    }

    if parts.len() >= 3 {
        let suffix = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        if TWO_LEVEL_SUFFIXES.contains(&suffix.as_str()) {
            return parts[parts.len() - 3..].join(".");
        }
    }

    parts[parts.len() - 2..].join(".")
}

/// Classify two already-extracted domains.
///
/// Plain substring containment is never a match: `another-example.com` and
/// `example.com.evil.com` are unrelated to `example.com`.
pub fn relate_domains(requested: &str, stored: &str) -> Option<DomainRelation> {
    if requested.is_empty() || stored.is_empty() {
        return None;
    }
    if requested == stored {
        return Some(DomainRelation::Exact);
    }
    if is_subdomain_of(requested, stored) || is_subdomain_of(stored, requested) {
        return Some(DomainRelation::Subdomain);
    }
    if extract_root_domain(requested) == extract_root_domain(stored) {
        return Some(DomainRelation::SameRoot);
    }
    None
}

/// True when the two domains are related in any way.
pub fn domains_match(domain1: &str, domain2: &str) -> bool {
    relate_domains(domain1, domain2).is_some()
}

fn is_subdomain_of(candidate: &str, parent: &str) -> bool {
    candidate.len() > parent.len()
        && candidate.ends_with(parent)
        && candidate.as_bytes()[candidate.len() - parent.len() - 1] == b'.'
}

/// How a stored package relates to the requesting one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageRelation {
    Exact,
    /// One id extends the other on a dot boundary (`com.app` / `com.app.debug`)
    Variant,
}

pub fn relate_packages(requested: &str, stored: &str) -> Option<PackageRelation> {
    let requested = requested.trim().to_lowercase();
    let stored = stored.trim().to_lowercase();
    if requested.is_empty() || stored.is_empty() {
        return None;
    }
    if requested == stored {
        return Some(PackageRelation::Exact);
    }
    if is_subdomain_of_reversed(&requested, &stored) || is_subdomain_of_reversed(&stored, &requested) {
        return Some(PackageRelation::Variant);
    }
    None
}

fn is_subdomain_of_reversed(longer: &str, prefix: &str) -> bool {
    longer.len() > prefix.len()
        && longer.starts_with(prefix)
        && longer.as_bytes()[prefix.len()] == b'.'
        && prefix.contains('.')
}
