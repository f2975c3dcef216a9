//! Matches effective permissions against the escalation catalog.

use crate::analyzer::rbac::aggregate::EffectivePermission;
use crate::analyzer::rbac::catalog::{Catalog, MatchMode, Pattern};
use crate::analyzer::rbac::types::{
    EffectiveScope, PermissionTriple, Provenance, Severity, Subject, SubjectKind,
};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// A subject matching an escalation pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub subject: Subject,
    pub severity: Severity,
    pub pattern_id: String,
    /// Granted triples that satisfied the pattern, sorted.
    pub matched_grants: Vec<PermissionTriple>,
    /// Bindings and roles behind the matched grants, sorted.
    pub evidence: Vec<Provenance>,
}

impl Finding {
    fn sort_key(&self) -> (Reverse<Severity>, &str, &str, SubjectKind, Option<&str>) {
        (
            Reverse(self.severity),
            &self.subject.name,
            &self.pattern_id,
            self.subject.kind,
            self.subject.namespace.as_deref(),
        )
    }

    /// Whether any of the evidence is cluster-wide.
    pub fn is_cluster_wide(&self) -> bool {
        self.evidence.iter().any(|p| p.scope.is_cluster_wide())
    }
}

struct Match<'a> {
    triple: &'a PermissionTriple,
    provenance: &'a Provenance,
    severity: Severity,
}

type Candidate<'a> = (&'a PermissionTriple, &'a BTreeSet<Provenance>);

fn candidates<'a>(perm: &'a EffectivePermission, pattern: &Pattern) -> Vec<Candidate<'a>> {
    let verbs = pattern.predicate.expanded_verbs();
    perm.grants
        .iter()
        .filter(|(triple, _)| {
            verbs.contains(triple.verb.as_str()) && pattern.predicate.matches_target(triple)
        })
        .collect()
}

fn match_any<'a>(
    perm: &'a EffectivePermission,
    pattern: &Pattern,
    sensitive: &BTreeSet<String>,
) -> Vec<Match<'a>> {
    let mut matches = Vec::new();
    for (triple, provenance) in candidates(perm, pattern) {
        for p in provenance {
            if let Some(severity) = pattern.predicate.severity_at(pattern.severity, &p.scope, sensitive) {
                matches.push(Match {
                    triple,
                    provenance: p,
                    severity,
                });
            }
        }
    }
    matches
}

// Every verb must be granted on one (group, resource) at one scope. A
// cluster-wide grant also covers every namespace.
fn match_all<'a>(
    perm: &'a EffectivePermission,
    pattern: &Pattern,
    sensitive: &BTreeSet<String>,
) -> Vec<Match<'a>> {
    let required = pattern.predicate.expanded_verbs();
    let mut targets: BTreeMap<(&str, &str), Vec<Candidate<'a>>> = BTreeMap::new();
    for candidate in candidates(perm, pattern) {
        let (triple, _) = candidate;
        targets
            .entry((triple.api_group.as_str(), triple.resource.as_str()))
            .or_default()
            .push(candidate);
    }

    let mut matches = Vec::new();
    for entries in targets.values() {
        let scopes: BTreeSet<&EffectiveScope> = entries
            .iter()
            .flat_map(|(_, provenance)| provenance.iter().map(|p| &p.scope))
            .collect();

        for scope in scopes {
            let covers = |p: &Provenance| &p.scope == scope || p.scope.is_cluster_wide();
            let granted: BTreeSet<&str> = entries
                .iter()
                .filter(|(_, provenance)| provenance.iter().any(covers))
                .map(|(triple, _)| triple.verb.as_str())
                .collect();
            if !required.is_subset(&granted) {
                continue;
            }
            let Some(severity) = pattern.predicate.severity_at(pattern.severity, scope, sensitive)
            else {
                continue;
            };
            for &(triple, provenance) in entries {
                for p in provenance.iter().filter(|&p| covers(p)) {
                    matches.push(Match {
                        triple,
                        provenance: p,
                        severity,
                    });
                }
            }
        }
    }
    matches
}

/// Evaluate one pattern against one subject.
pub fn evaluate_pattern(
    perm: &EffectivePermission,
    pattern: &Pattern,
    sensitive_namespaces: &BTreeSet<String>,
) -> Option<Finding> {
    let matches = match pattern.predicate.match_mode {
        MatchMode::Any => match_any(perm, pattern, sensitive_namespaces),
        MatchMode::All => match_all(perm, pattern, sensitive_namespaces),
    };
    let severity = matches.iter().map(|m| m.severity).max()?;

    let matched_grants: BTreeSet<&PermissionTriple> = matches.iter().map(|m| m.triple).collect();
    let evidence: BTreeSet<&Provenance> = matches.iter().map(|m| m.provenance).collect();

    Some(Finding {
        subject: perm.subject.clone(),
        severity,
        pattern_id: pattern.id.clone(),
        matched_grants: matched_grants.into_iter().cloned().collect(),
        evidence: evidence.into_iter().cloned().collect(),
    })
}

/// Evaluate every pattern against every subject.
///
/// Produces at most one finding per (subject, pattern), sorted by severity
/// (highest first), subject name, pattern id, then subject kind and namespace.
pub fn evaluate(perms: &BTreeMap<Subject, EffectivePermission>, catalog: &Catalog) -> Vec<Finding> {
    let mut findings: Vec<Finding> = perms
        .values()
        .flat_map(|perm| {
            catalog
                .patterns()
                .iter()
                .filter_map(|pattern| evaluate_pattern(perm, pattern, catalog.sensitive_namespaces()))
        })
        .collect();

    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    log::debug!(
        "{} findings across {} subjects ({} patterns)",
        findings.len(),
        perms.len(),
        catalog.len()
    );
    findings
}
