//! Build output parsing and failure classification.
//!
//! Compose and BuildKit print per-service progress in several shapes. Only
//! lines that name a service are used; anything else is left to the
//! classifier, which maps the log text to a failure kind with a fix hint.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Per-service outcome markers found in a build log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMarkers {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeSet<String>,
}

impl BuildMarkers {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }
}

fn built_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[^A-Za-z0-9\n]*(?:Service\s+)?([A-Za-z0-9][A-Za-z0-9_.-]*)\s+Built\b")
            .expect("valid built regex")
    })
}

fn failure_regexes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"=>\s*ERROR\s*\[([A-Za-z0-9][A-Za-z0-9_.-]*)[\s\]]",
            r#"service "([^"]+)" failed to build"#,
            r"target ([A-Za-z0-9][A-Za-z0-9_.-]*): failed to solve",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid failure regex"))
        .collect()
    })
}

/// Collect per-service success and failure markers.
pub fn parse_build_markers(log: &str) -> BuildMarkers {
    let mut markers = BuildMarkers::default();

    for caps in built_regex().captures_iter(log) {
        markers.succeeded.insert(caps[1].to_string());
    }

    for re in failure_regexes() {
        for caps in re.captures_iter(log) {
            let name = &caps[1];
            if name != "internal" {
                markers.failed.insert(name.to_string());
            }
        }
    }

    markers.succeeded.retain(|s| !markers.failed.contains(s));
    markers
}

/// Whether the log carries a generic BuildKit failure with no service name.
pub fn has_unattributed_failure(log: &str) -> bool {
    log.contains("failed to solve")
}

/// Pick the service most responsible for a failed build.
///
/// An explicit failure marker wins. Otherwise the known service mentioned
/// most often in the log is chosen.
pub fn dominant_failed_service(log: &str, markers: &BuildMarkers, known: &[String]) -> Option<String> {
    if let Some(first) = markers.failed.iter().next() {
        return Some(first.clone());
    }

    known
        .iter()
        .map(|name| (name, log.matches(name.as_str()).count()))
        .filter(|(_, hits)| *hits > 0)
        .max_by_key(|(_, hits)| *hits)
        .map(|(name, _)| name.clone())
}

/// Broad cause of a build or runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Dependency,
    MissingSymbol,
    Compilation,
    Configuration,
    Network,
    Resources,
    PortConflict,
    Generic,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dependency => "dependency resolution failure",
            Self::MissingSymbol => "missing symbol or import",
            Self::Compilation => "compilation failure",
            Self::Configuration => "Dockerfile or configuration error",
            Self::Network => "network or registry failure",
            Self::Resources => "resource exhaustion",
            Self::PortConflict => "port conflict",
            Self::Generic => "build failure",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::Dependency => {
                "Declare the missing dependency with a version that exists in the configured repositories"
            }
            Self::MissingSymbol => {
                "Add the missing import or generate the referenced class/module, and check package names"
            }
            Self::Compilation => "Fix the reported compiler errors in the generated sources",
            Self::Configuration => {
                "Check the Dockerfile instructions and that every COPY source exists in the build context"
            }
            Self::Network => "Verify base image names and tags, and registry reachability",
            Self::Resources => "Free disk space or raise the memory available to the container runtime",
            Self::PortConflict => "Publish the service on a free host port or stop the conflicting container",
            Self::Generic => "Inspect the build log for the first error and regenerate the affected service",
        }
    }
}

const CLASSIFIERS: &[(FailureKind, &[&str])] = &[
    (
        FailureKind::Resources,
        &[
            "no space left on device",
            "out of memory",
            "oomkilled",
            "cannot allocate memory",
            "java heap space",
        ],
    ),
    (
        FailureKind::PortConflict,
        &["port is already allocated", "address already in use"],
    ),
    (
        FailureKind::Network,
        &[
            "pull access denied",
            "manifest unknown",
            "tls handshake timeout",
            "temporary failure in name resolution",
            "toomanyrequests",
            "i/o timeout",
        ],
    ),
    (
        FailureKind::Dependency,
        &[
            "could not resolve dependencies",
            "could not find artifact",
            "could not resolve dependency",
            "npm err! 404",
            "eresolve",
            "no matching version",
            "no matching distribution",
            "failed to collect dependencies",
        ],
    ),
    (
        FailureKind::MissingSymbol,
        &[
            "cannot find symbol",
            "cannot resolve symbol",
            "does not exist",
            "cannot find module",
            "module not found",
            "modulenotfounderror",
            "importerror",
            "unresolved reference",
            "is not defined",
        ],
    ),
    (
        FailureKind::Compilation,
        &[
            "compilation failure",
            "compilation error",
            "failed to compile",
            "syntaxerror",
            "syntax error",
            "error ts",
        ],
    ),
    (
        FailureKind::Configuration,
        &[
            "dockerfile",
            "unknown instruction",
            "failed to compute cache key",
            "copy failed",
            "no such file or directory",
            "invalid reference format",
        ],
    ),
];

/// Classify failure text. Earlier kinds win when several match.
pub fn classify_failure(log: &str) -> FailureKind {
    let lower = log.to_ascii_lowercase();
    CLASSIFIERS
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|(kind, _)| *kind)
        .unwrap_or(FailureKind::Generic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_v2_built_markers() {
        let log = " ✔ Service accounts-service  Built                 12.3s\n ✔ ledger-service  Built  8.1s\n";
        let markers = parse_build_markers(log);

        assert!(markers.succeeded.contains("accounts-service"));
        assert!(markers.succeeded.contains("ledger-service"));
        assert!(markers.failed.is_empty());
    }

    #[test]
    fn test_buildkit_error_marker() {
        let log = "#12 [accounts-service build 5/7] RUN mvn -q package\n\
                   => ERROR [accounts-service build 5/7] RUN mvn -q package   41.2s\n\
                   => ERROR [internal] load metadata for docker.io/library/maven\n\
                   failed to solve: process \"/bin/sh -c mvn -q package\" did not complete successfully";
        let markers = parse_build_markers(log);

        assert_eq!(markers.failed.len(), 1);
        assert!(markers.failed.contains("accounts-service"));
        assert!(has_unattributed_failure(log));
    }

    #[test]
    fn test_service_failed_to_build_marker() {
        let log = "service \"portal-frontend\" failed to build: exit code 1";
        let markers = parse_build_markers(log);
        assert!(markers.failed.contains("portal-frontend"));
    }

    #[test]
    fn test_target_failed_to_solve_marker() {
        let log = "target ledger-service: failed to solve: process did not complete";
        let markers = parse_build_markers(log);
        assert!(markers.failed.contains("ledger-service"));
    }

    #[test]
    fn test_no_markers() {
        assert!(parse_build_markers("Step 1/5 : FROM eclipse-temurin:17").is_empty());
    }

    #[test]
    fn test_dominant_service_by_mentions() {
        let known = vec!["accounts-service".to_string(), "ledger-service".to_string()];
        let log = "building ledger-service\nledger-service: error\nledger-service failed\naccounts-service ok";
        let markers = parse_build_markers(log);

        assert_eq!(
            dominant_failed_service(log, &markers, &known).as_deref(),
            Some("ledger-service")
        );
        assert_eq!(dominant_failed_service("nothing", &markers, &known), None);
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify_failure("[ERROR] Failed to execute goal: Could not resolve dependencies for project"),
            FailureKind::Dependency
        );
        assert_eq!(
            classify_failure("[ERROR] COMPILATION ERROR\n[ERROR] cannot find symbol: class AccountRepository"),
            FailureKind::MissingSymbol
        );
        assert_eq!(
            classify_failure("src/app.ts(3,1): error TS2322: Type 'string' is not assignable"),
            FailureKind::Compilation
        );
        assert_eq!(
            classify_failure("failed to compute cache key: \"/target/app.jar\" not found"),
            FailureKind::Configuration
        );
        assert_eq!(
            classify_failure("Bind for 0.0.0.0:8080 failed: port is already allocated"),
            FailureKind::PortConflict
        );
        assert_eq!(classify_failure("exit code 137"), FailureKind::Generic);
    }

    #[test]
    fn test_every_kind_has_recommendation() {
        for (kind, _) in CLASSIFIERS {
            assert!(!kind.recommendation().is_empty());
            assert!(!kind.label().is_empty());
        }
    }
}
