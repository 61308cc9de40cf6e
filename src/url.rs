//! URL parsing for sftp:// remotes

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    pub user: Option<String>,
    pub host: String,
    pub port: u16,
    pub path: String,
}

pub const DEFAULT_PORT: u16 = 22;

/// Parse `sftp://[user@]host[:port]/path`. Returns None for anything else.
pub fn parse_remote_url(s: &str) -> Option<RemoteUrl> {
    let s_trim = s.trim();
    let lower = s_trim.to_ascii_lowercase();
    let scheme_end = lower.find(':')?;
    let scheme_with_colon = &lower[..=scheme_end];
    if scheme_with_colon != "sftp:" {
        return None;
    }
    let rest = s_trim[scheme_end + 1..].strip_prefix("//")?;
    let (authority, p) = rest.split_once('/').unwrap_or((rest, ""));
    let (user, hp) = match authority.rsplit_once('@') {
        Some((u, hp)) if !u.is_empty() => (Some(u.to_string()), hp),
        Some((_, hp)) => (None, hp),
        None => (None, authority),
    };
    if hp.is_empty() {
        return None;
    }
    let (host, port) = match hp.split_once(':') {
        Some((h, pr)) => (h.to_string(), pr.parse().ok()?),
        None => (hp.to_string(), DEFAULT_PORT),
    };
    Some(RemoteUrl {
        user,
        host,
        port,
        path: format!("/{}", p),
    })
}
