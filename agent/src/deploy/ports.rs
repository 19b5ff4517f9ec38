//! Best-effort port discovery in Dockerfile and compose text
//!
//! Neither parser understands the full grammar. Both scan line by line and
//! return the first usable match, tolerating anything they do not recognise.

/// Keys that may appear at service-name indentation without naming a service
const COMPOSE_KEYWORDS: &[&str] = &[
    "ports",
    "volumes",
    "environment",
    "depends_on",
    "networks",
    "build",
    "image",
    "container_name",
    "restart",
    "command",
    "entrypoint",
    "labels",
    "expose",
    "healthcheck",
    "logging",
    "deploy",
    "configs",
    "secrets",
    "ulimits",
    "sysctls",
];

/// First valid `EXPOSE` port, or 0
pub fn dockerfile_port(content: &str) -> u16 {
    for line in content.lines() {
        let upper = line.trim().to_uppercase();
        let Some(rest) = upper.strip_prefix("EXPOSE ") else {
            continue;
        };
        let token = rest.trim();
        let token = token.split('/').next().unwrap_or_default();
        let token = token.split(' ').next().unwrap_or_default();
        if let Some(port) = parse_port(token) {
            return port;
        }
    }
    0
}

/// First `host:container` pair under the named service (or the first service
/// when `service` is empty), or `(0, 0)`
pub fn compose_port(content: &str, service: &str) -> (u16, u16) {
    let mut in_services = false;
    let mut in_service = false;
    let mut in_ports = false;
    let mut service_indent: Option<usize> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
        let is_item = trimmed.starts_with('-');

        if trimmed == "services:" {
            in_services = true;
            service_indent = None;
            continue;
        }

        if in_service && trimmed == "ports:" {
            in_ports = true;
            continue;
        }

        if in_ports && is_item {
            if let Some(pair) = parse_mapping(&trimmed[1..]) {
                return pair;
            }
        }

        if in_ports && !is_item {
            in_ports = false;
        }

        if in_services && (1..=4).contains(&indent) {
            if let Some(name) = trimmed.strip_suffix(':') {
                if COMPOSE_KEYWORDS.contains(&name) {
                    continue;
                }
                if service.is_empty() || name == service {
                    in_service = true;
                    service_indent = Some(indent);
                    in_ports = false;
                    continue;
                }
            }
        }

        if let Some(limit) = service_indent {
            if in_service && indent <= limit && !is_item {
                if !service.is_empty() {
                    break;
                }
                in_service = false;
                in_ports = false;
            }
        }
    }

    (0, 0)
}

fn parse_mapping(entry: &str) -> Option<(u16, u16)> {
    let entry = entry.trim().trim_matches(['"', '\'']);
    // `[ip:]host:container[/proto]`: the ports are always the last two fields
    let mut parts = entry.rsplit(':');
    let container = parts.next()?;
    let host = parts.next()?;
    let host = parse_port(host.split('/').next().unwrap_or_default())?;
    let container = parse_port(container.split('/').next().unwrap_or_default())?;
    Some((host, container))
}

/// Leading decimal digits of `token`, kept only when in 1..=65535
fn parse_port(token: &str) -> Option<u16> {
    let digits: &str = {
        let end = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        &token[..end]
    };
    if digits.is_empty() || digits.len() > 5 {
        return None;
    }
    match digits.parse::<u32>() {
        Ok(port @ 1..=65535) => u16::try_from(port).ok(),
        _ => None,
    }
}
