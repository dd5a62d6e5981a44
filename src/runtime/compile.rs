//! Dependency compilation: validated probe targets from the raw document.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::{
    resolve, Document, DependencySpec, PortValue, ProbeSettings, QuorumMode, ResolveError,
};

/// Hostnames must satisfy RFC 1123.
static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z0-9][a-z0-9-]*)?[a-z0-9]([.]([a-z0-9][a-z0-9-]*)?[a-z0-9])*$").unwrap()
});

/// Default ports for `url:` schemes without an explicit port.
const SCHEME_PORTS: &[(&str, u16)] = &[
    ("ftp", 21),
    ("ftps", 990),
    ("gopher", 70),
    ("http", 80),
    ("https", 443),
    ("ldap", 389),
    ("ldaps", 636),
    ("imap", 143),
    ("imaps", 993),
    ("pop", 110),
    ("pops", 995),
    ("smtp", 25),
    ("smtps", 465),
    ("ssh", 22),
    ("sftp", 22),
    ("telnet", 23),
    ("nfs", 2049),
    ("nntp", 119),
];

const SERVICES_DB: &str = "/etc/services";

/// A compiled probe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Tcp { host: String, port: u16 },
    Http { url: Url },
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeTarget::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            ProbeTarget::Http { url } => write!(f, "{}", url),
        }
    }
}

/// A validated dependency: one or more probe targets plus the merged
/// settings they run under.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub settings: ProbeSettings,
    pub probes: Vec<ProbeTarget>,
}

impl Dependency {
    pub fn mode(&self) -> QuorumMode {
        self.settings.mode
    }
}

/// Configuration-level failures; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("dependency '{dep}': only one of 'url', 'http', or 'host'+'port(s)' may be set")]
    ConflictingTargets { dep: String },

    #[error("dependency '{dep}': 'port' or 'ports' is required")]
    MissingPort { dep: String },

    #[error("dependency '{dep}': invalid {field} '{value}': {reason}")]
    InvalidUrl {
        dep: String,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("dependency '{dep}': no default port for scheme '{scheme}' in '{value}'")]
    UnknownScheme {
        dep: String,
        scheme: String,
        value: String,
    },

    #[error("dependency '{dep}': '{field}' must be an http or https URL, got '{value}'")]
    NotHttp {
        dep: String,
        field: &'static str,
        value: String,
    },

    #[error("dependency '{dep}': invalid hostname '{host}'")]
    InvalidHostname { dep: String, host: String },

    #[error("dependency '{dep}': port {port} is out of range 1-65535")]
    PortOutOfRange { dep: String, port: i64 },

    #[error("dependency '{dep}': unknown service '{service}'")]
    UnknownService { dep: String, service: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Compile every dependency of the document, resolving dynamic values and
/// validating targets. The document's `template` supplies option defaults.
pub fn compile(doc: &Document) -> Result<Vec<Dependency>, CompileError> {
    doc.dependencies
        .iter()
        .map(|(name, spec)| compile_dependency(name, spec, doc))
        .collect()
}

fn compile_dependency(
    name: &str,
    spec: &DependencySpec,
    doc: &Document,
) -> Result<Dependency, CompileError> {
    let settings = spec.options.merged_with(&doc.template);

    let has_host_form = spec.host.is_some() || spec.port.is_some() || spec.ports.is_some();
    let forms = spec.url.is_some() as u8 + spec.http.is_some() as u8 + has_host_form as u8;
    if forms > 1 {
        return Err(CompileError::ConflictingTargets {
            dep: name.to_string(),
        });
    }

    let probes = if let Some(raw) = &spec.url {
        vec![compile_url_target(name, raw)?]
    } else if let Some(raw) = &spec.http {
        vec![compile_http_target(name, raw)?]
    } else {
        compile_host_targets(name, spec)?
    };

    Ok(Dependency {
        name: name.to_string(),
        settings,
        probes,
    })
}

/// `url:` target: a TCP probe against the URL's host and port, with the
/// scheme-default table filling in a missing port.
fn compile_url_target(dep: &str, raw: &str) -> Result<ProbeTarget, CompileError> {
    let value = resolve(raw, &format!("{}.url", dep))?;
    let url = parse_url(dep, "url", &value)?;
    let host = url_host(dep, "url", &url, &value)?;

    let port = match url.port() {
        Some(port) => port,
        None => scheme_default_port(url.scheme()).ok_or_else(|| CompileError::UnknownScheme {
            dep: dep.to_string(),
            scheme: url.scheme().to_string(),
            value: value.clone(),
        })?,
    };
    check_port_range(dep, port as i64)?;

    Ok(ProbeTarget::Tcp { host, port })
}

/// `http:` target: an HTTP GET probe against the full URL.
fn compile_http_target(dep: &str, raw: &str) -> Result<ProbeTarget, CompileError> {
    let value = resolve(raw, &format!("{}.http", dep))?;
    let url = parse_url(dep, "http", &value)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CompileError::NotHttp {
            dep: dep.to_string(),
            field: "http",
            value,
        });
    }
    url_host(dep, "http", &url, &value)?;
    Ok(ProbeTarget::Http { url })
}

/// `host` + `port`/`ports` target: one TCP probe per resolved port, with the
/// dependency name standing in for a missing host.
fn compile_host_targets(
    dep: &str,
    spec: &DependencySpec,
) -> Result<Vec<ProbeTarget>, CompileError> {
    let host = match &spec.host {
        Some(raw) => resolve(raw, &format!("{}.host", dep))?,
        None => dep.to_string(),
    };
    check_hostname(dep, &host)?;

    let values: Vec<&PortValue> = match (&spec.ports, &spec.port) {
        (Some(ports), single) => {
            if single.is_some() {
                log::warn!(
                    "[{}] both 'port' and 'ports' are set; 'port' is deprecated and ignored",
                    dep
                );
            }
            ports.iter().collect()
        }
        (None, Some(port)) => vec![port],
        (None, None) => {
            return Err(CompileError::MissingPort {
                dep: dep.to_string(),
            })
        }
    };
    if values.is_empty() {
        return Err(CompileError::MissingPort {
            dep: dep.to_string(),
        });
    }

    values
        .into_iter()
        .map(|value| {
            let port = resolve_port(dep, value)?;
            Ok(ProbeTarget::Tcp {
                host: host.clone(),
                port,
            })
        })
        .collect()
}

/// Resolve one port entry: a decimal number, or a TCP service name from the
/// OS service database.
fn resolve_port(dep: &str, value: &PortValue) -> Result<u16, CompileError> {
    let text = match value {
        PortValue::Number(n) => return check_port_range(dep, *n),
        PortValue::Name(raw) => resolve(raw, &format!("{}.port", dep))?,
    };

    if let Ok(n) = text.parse::<i64>() {
        return check_port_range(dep, n);
    }

    let services = std::fs::read_to_string(SERVICES_DB).unwrap_or_default();
    lookup_service(&services, &text).ok_or_else(|| CompileError::UnknownService {
        dep: dep.to_string(),
        service: text,
    })
}

fn check_port_range(dep: &str, port: i64) -> Result<u16, CompileError> {
    if (1..=65535).contains(&port) {
        Ok(port as u16)
    } else {
        Err(CompileError::PortOutOfRange {
            dep: dep.to_string(),
            port,
        })
    }
}

fn check_hostname(dep: &str, host: &str) -> Result<(), CompileError> {
    if HOSTNAME_PATTERN.is_match(host) {
        Ok(())
    } else {
        Err(CompileError::InvalidHostname {
            dep: dep.to_string(),
            host: host.to_string(),
        })
    }
}

fn parse_url(dep: &str, field: &'static str, value: &str) -> Result<Url, CompileError> {
    Url::parse(value).map_err(|e| CompileError::InvalidUrl {
        dep: dep.to_string(),
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn url_host(
    dep: &str,
    field: &'static str,
    url: &Url,
    value: &str,
) -> Result<String, CompileError> {
    let host = url
        .host_str()
        .ok_or_else(|| CompileError::InvalidUrl {
            dep: dep.to_string(),
            field,
            value: value.to_string(),
            reason: "missing host".to_string(),
        })?
        .to_string();
    check_hostname(dep, &host)?;
    Ok(host)
}

fn scheme_default_port(scheme: &str) -> Option<u16> {
    SCHEME_PORTS
        .iter()
        .find(|(s, _)| *s == scheme)
        .map(|(_, port)| *port)
}

/// Find a TCP service by name or alias in `/etc/services` content.
fn lookup_service(services: &str, name: &str) -> Option<u16> {
    for line in services.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let (Some(service), Some(port_proto)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        if proto != "tcp" {
            continue;
        }
        if service == name || fields.any(|alias| alias == name) {
            return port.parse().ok();
        }
    }
    None
}

/// Best-effort name resolution check before probing starts. Unresolvable
/// names only warn: the probes retry resolution on every attempt.
pub async fn preflight(deps: &[Dependency]) {
    for dep in deps {
        for probe in &dep.probes {
            let (host, port) = match probe {
                ProbeTarget::Tcp { host, port } => (host.clone(), *port),
                ProbeTarget::Http { url } => {
                    let Some(host) = url.host_str() else { continue };
                    (host.to_string(), url.port_or_known_default().unwrap_or(80))
                }
            };
            let result = tokio::net::lookup_host((host.as_str(), port)).await;
            if let Err(e) = result {
                log::warn!(
                    "[{}] cannot resolve '{}' yet ({}); probing will retry",
                    dep.name,
                    host,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Document;

    fn doc(yaml: &str) -> Document {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn compile_one(yaml: &str) -> Result<Dependency, CompileError> {
        let doc = doc(yaml);
        let (name, spec) = doc.dependencies.first().unwrap();
        compile_dependency(name, spec, &doc)
    }

    #[test]
    fn test_host_and_ports() {
        let dep = compile_one("dependencies:\n  db:\n    host: db.internal\n    ports: [5432]\n")
            .unwrap();
        assert_eq!(
            dep.probes,
            vec![ProbeTarget::Tcp {
                host: "db.internal".to_string(),
                port: 5432
            }]
        );
    }

    #[test]
    fn test_name_used_as_host() {
        let dep = compile_one("dependencies:\n  rabbitmq:\n    port: 5672\n").unwrap();
        assert_eq!(
            dep.probes,
            vec![ProbeTarget::Tcp {
                host: "rabbitmq".to_string(),
                port: 5672
            }]
        );
    }

    #[test]
    fn test_missing_port_is_fatal() {
        let result = compile_one("dependencies:\n  db:\n    host: db.internal\n");
        assert!(matches!(result, Err(CompileError::MissingPort { .. })));
    }

    #[test]
    fn test_ports_take_precedence_over_port() {
        let dep = compile_one(
            "dependencies:\n  db:\n    host: db\n    port: 1111\n    ports: [5432, 5433]\n",
        )
        .unwrap();
        let ports: Vec<u16> = dep
            .probes
            .iter()
            .map(|p| match p {
                ProbeTarget::Tcp { port, .. } => *port,
                other => panic!("unexpected probe {:?}", other),
            })
            .collect();
        assert_eq!(ports, vec![5432, 5433]);
    }

    #[test]
    fn test_conflicting_targets_are_fatal() {
        let result = compile_one(
            "dependencies:\n  db:\n    url: \"postgres://db\"\n    host: db\n    port: 5432\n",
        );
        assert!(matches!(
            result,
            Err(CompileError::ConflictingTargets { .. })
        ));
    }

    #[test]
    fn test_url_with_explicit_port() {
        let dep =
            compile_one("dependencies:\n  api:\n    url: \"foo://api.internal:9000/x\"\n").unwrap();
        assert_eq!(
            dep.probes,
            vec![ProbeTarget::Tcp {
                host: "api.internal".to_string(),
                port: 9000
            }]
        );
    }

    #[test]
    fn test_url_scheme_default_port() {
        let dep = compile_one("dependencies:\n  ldap:\n    url: \"ldaps://ldap.example\"\n").unwrap();
        assert_eq!(
            dep.probes,
            vec![ProbeTarget::Tcp {
                host: "ldap.example".to_string(),
                port: 636
            }]
        );
    }

    #[test]
    fn test_url_unknown_scheme_without_port_is_fatal() {
        let result = compile_one("dependencies:\n  x:\n    url: \"zmq://broker\"\n");
        assert!(matches!(result, Err(CompileError::UnknownScheme { .. })));
    }

    #[test]
    fn test_http_target() {
        let dep = compile_one("dependencies:\n  api:\n    http: \"http://api:8080/health\"\n")
            .unwrap();
        match &dep.probes[0] {
            ProbeTarget::Http { url } => assert_eq!(url.as_str(), "http://api:8080/health"),
            other => panic!("expected http probe, got {:?}", other),
        }
    }

    #[test]
    fn test_http_rejects_non_http_scheme() {
        let result = compile_one("dependencies:\n  api:\n    http: \"ftp://api/health\"\n");
        assert!(matches!(result, Err(CompileError::NotHttp { .. })));
    }

    #[test]
    fn test_port_bounds() {
        assert!(compile_one("dependencies:\n  a:\n    host: h\n    port: 0\n").is_err());
        assert!(compile_one("dependencies:\n  a:\n    host: h\n    port: 65536\n").is_err());
        assert!(compile_one("dependencies:\n  a:\n    host: h\n    port: 1\n").is_ok());
        assert!(compile_one("dependencies:\n  a:\n    host: h\n    port: 65535\n").is_ok());
    }

    #[test]
    fn test_invalid_hostname_is_fatal() {
        let result = compile_one("dependencies:\n  a:\n    host: \"db_internal\"\n    port: 1\n");
        assert!(matches!(result, Err(CompileError::InvalidHostname { .. })));
    }

    #[test]
    fn test_hostname_pattern() {
        for host in ["db", "db.internal", "a", "A.B-c.d0", "0db.example"] {
            assert!(HOSTNAME_PATTERN.is_match(host), "{host} should match");
        }
        for host in ["-db", "db-", "db..internal", "db_x", "db.internal."] {
            assert!(!HOSTNAME_PATTERN.is_match(host), "{host} should not match");
        }
    }

    #[test]
    fn test_template_merged_into_dependency() {
        let yaml = r#"
template:
  attempts: 7
dependencies:
  db:
    ports: [5432]
    timeout: 2
"#;
        let deps = compile(&doc(yaml)).unwrap();
        assert_eq!(deps[0].settings.attempts, 7);
        assert_eq!(deps[0].settings.timeout, 2);
        assert_eq!(deps[0].settings.delay, 5);
    }

    #[test]
    fn test_dynamic_host_resolution() {
        std::env::set_var("COMPILE_TEST_DB_HOST", "db.internal");
        let dep = compile_one(
            "dependencies:\n  db:\n    host: \"@env:COMPILE_TEST_DB_HOST\"\n    port: 5432\n",
        )
        .unwrap();
        assert_eq!(
            dep.probes,
            vec![ProbeTarget::Tcp {
                host: "db.internal".to_string(),
                port: 5432
            }]
        );
    }

    #[test]
    fn test_lookup_service() {
        let services = "\
# comment line
ssh      22/tcp
smtp     25/tcp   mail
ntp     123/udp
postgresql 5432/tcp postgres
";
        assert_eq!(lookup_service(services, "ssh"), Some(22));
        assert_eq!(lookup_service(services, "mail"), Some(25), "alias lookup");
        assert_eq!(lookup_service(services, "postgres"), Some(5432));
        assert_eq!(lookup_service(services, "ntp"), None, "udp only");
        assert_eq!(lookup_service(services, "nope"), None);
    }

    #[test]
    fn test_scheme_table() {
        assert_eq!(scheme_default_port("https"), Some(443));
        assert_eq!(scheme_default_port("ldaps"), Some(636));
        assert_eq!(scheme_default_port("sftp"), Some(22));
        assert_eq!(scheme_default_port("zmq"), None);
    }
}
