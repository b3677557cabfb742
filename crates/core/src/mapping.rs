//! Face mapping resolution.
//!
//! Turns a mapping request (default gender-based, or an explicit rule list)
//! plus a template's detected faces into a validated [`ResolvedMapping`].
//! Pure function of its inputs; no I/O.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::face::{partition_by_gender, FaceObservation};

// ---------------------------------------------------------------------------
// Rule model
// ---------------------------------------------------------------------------

/// Which of the two source photos in a pair a rule draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    First,
    Second,
}

impl SourceRole {
    /// Human-readable label for error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Second => "second",
        }
    }
}

/// One source-face to template-face assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub source_role: SourceRole,
    pub source_face_index: u32,
    pub target_face_index: u32,
}

/// A validated, concrete rule list for one task. Every
/// `target_face_index` is guaranteed to exist in the template's faces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedMapping {
    pub rules: Vec<MappingRule>,
}

impl ResolvedMapping {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// How the caller wants faces mapped. Validated exactly once, here; never
/// re-checked downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "rules")]
pub enum MappingSpec {
    /// Gender-based default: first source to male faces, second to female.
    UseDefault,
    /// Caller-supplied rule list.
    Explicit(Vec<MappingRule>),
    /// Nothing specified. Always an error at resolution time.
    Unspecified,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Resolution failure. `InvalidRules` carries every violation found, not
/// just the first.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("no mapping source specified")]
    NoSource,

    #[error("template preprocessing is not completed")]
    NotPreprocessed,

    #[error("invalid mapping rules: {}", violations.join("; "))]
    InvalidRules { violations: Vec<String> },
}

impl From<MappingError> for CoreError {
    fn from(err: MappingError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve a mapping spec against a template's detected faces.
///
/// - Explicit rules are validated in full: every `target_face_index` must
///   exist in `faces`, and a target claimed by more than one source role is
///   rejected as ambiguous. The same role repeating a target is allowed
///   (one-to-many), as is one source feeding several targets.
/// - The default mode requires completed preprocessing. Faces are grouped
///   by gender in detection order; the first source covers the male group,
///   the second the female group, both with source face 0. If either group
///   is empty the resolver falls back to positional assignment
///   (first -> face 0, second -> face 1) and leaves remaining faces
///   unmapped.
pub fn resolve(
    faces: &[FaceObservation],
    preprocessing_completed: bool,
    spec: &MappingSpec,
) -> Result<ResolvedMapping, MappingError> {
    match spec {
        MappingSpec::Explicit(rules) if !rules.is_empty() => resolve_explicit(faces, rules),
        MappingSpec::UseDefault => {
            if !preprocessing_completed {
                return Err(MappingError::NotPreprocessed);
            }
            Ok(resolve_default(faces))
        }
        _ => Err(MappingError::NoSource),
    }
}

fn resolve_explicit(
    faces: &[FaceObservation],
    rules: &[MappingRule],
) -> Result<ResolvedMapping, MappingError> {
    let face_count = faces.len() as u32;
    let mut violations = Vec::new();

    for (i, rule) in rules.iter().enumerate() {
        if rule.target_face_index >= face_count {
            violations.push(format!(
                "rule {i}: target face index {} out of range (template has {} faces)",
                rule.target_face_index, face_count,
            ));
        }
    }

    // A target fed by two different source roles is ambiguous; the same
    // role repeating a target is not.
    let mut roles_by_target: HashMap<u32, SourceRole> = HashMap::new();
    for rule in rules {
        match roles_by_target.entry(rule.target_face_index) {
            Entry::Occupied(entry) => {
                let prev = *entry.get();
                if prev != rule.source_role {
                    violations.push(format!(
                        "target face index {} is claimed by both '{}' and '{}' sources",
                        rule.target_face_index,
                        prev.label(),
                        rule.source_role.label(),
                    ));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(rule.source_role);
            }
        }
    }

    if violations.is_empty() {
        Ok(ResolvedMapping {
            rules: rules.to_vec(),
        })
    } else {
        Err(MappingError::InvalidRules { violations })
    }
}

fn resolve_default(faces: &[FaceObservation]) -> ResolvedMapping {
    let (male, female) = partition_by_gender(faces);

    if male.is_empty() || female.is_empty() {
        return positional_fallback(faces.len());
    }

    let mut rules = Vec::with_capacity(male.len() + female.len());
    for target in male {
        rules.push(MappingRule {
            source_role: SourceRole::First,
            source_face_index: 0,
            target_face_index: target,
        });
    }
    for target in female {
        rules.push(MappingRule {
            source_role: SourceRole::Second,
            source_face_index: 0,
            target_face_index: target,
        });
    }
    ResolvedMapping { rules }
}

/// Positional fallback when gender grouping cannot place both sources:
/// first source -> face 0, second source -> face 1, further faces left
/// unmapped. Only faces that actually exist are assigned.
fn positional_fallback(face_count: usize) -> ResolvedMapping {
    let mut rules = Vec::new();
    if face_count >= 1 {
        rules.push(MappingRule {
            source_role: SourceRole::First,
            source_face_index: 0,
            target_face_index: 0,
        });
    }
    if face_count >= 2 {
        rules.push(MappingRule {
            source_role: SourceRole::Second,
            source_face_index: 0,
            target_face_index: 1,
        });
    }
    ResolvedMapping { rules }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{BoundingBox, Gender};
    use assert_matches::assert_matches;

    fn face(index: u32, gender: Gender) -> FaceObservation {
        FaceObservation {
            index,
            bbox: BoundingBox::new(0, 0, 10, 10),
            gender,
            confidence: 0.9,
        }
    }

    fn rule(role: SourceRole, source: u32, target: u32) -> MappingRule {
        MappingRule {
            source_role: role,
            source_face_index: source,
            target_face_index: target,
        }
    }

    // -- default mapping ------------------------------------------------------

    #[test]
    fn default_maps_male_to_first_and_female_to_second() {
        let faces = vec![face(0, Gender::Male), face(1, Gender::Female)];
        let resolved = resolve(&faces, true, &MappingSpec::UseDefault).unwrap();
        assert_eq!(
            resolved.rules,
            vec![
                rule(SourceRole::First, 0, 0),
                rule(SourceRole::Second, 0, 1),
            ]
        );
    }

    #[test]
    fn default_covers_every_face_in_each_group() {
        let faces = vec![
            face(0, Gender::Female),
            face(1, Gender::Male),
            face(2, Gender::Male),
            face(3, Gender::Female),
        ];
        let resolved = resolve(&faces, true, &MappingSpec::UseDefault).unwrap();
        assert_eq!(
            resolved.rules,
            vec![
                rule(SourceRole::First, 0, 1),
                rule(SourceRole::First, 0, 2),
                rule(SourceRole::Second, 0, 0),
                rule(SourceRole::Second, 0, 3),
            ]
        );
    }

    #[test]
    fn default_requires_completed_preprocessing() {
        let faces = vec![face(0, Gender::Male), face(1, Gender::Female)];
        let err = resolve(&faces, false, &MappingSpec::UseDefault).unwrap_err();
        assert_matches!(err, MappingError::NotPreprocessed);
    }

    #[test]
    fn default_falls_back_positionally_when_a_group_is_empty() {
        // Two male faces, no female: gender grouping cannot place the
        // second source, so positions win.
        let faces = vec![face(0, Gender::Male), face(1, Gender::Male)];
        let resolved = resolve(&faces, true, &MappingSpec::UseDefault).unwrap();
        assert_eq!(
            resolved.rules,
            vec![
                rule(SourceRole::First, 0, 0),
                rule(SourceRole::Second, 0, 1),
            ]
        );
    }

    #[test]
    fn fallback_leaves_extra_faces_unmapped() {
        let faces = vec![
            face(0, Gender::Unknown),
            face(1, Gender::Unknown),
            face(2, Gender::Unknown),
        ];
        let resolved = resolve(&faces, true, &MappingSpec::UseDefault).unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.rules.iter().all(|r| r.target_face_index < 2));
    }

    #[test]
    fn fallback_on_single_face_template_maps_only_first() {
        let faces = vec![face(0, Gender::Unknown)];
        let resolved = resolve(&faces, true, &MappingSpec::UseDefault).unwrap();
        assert_eq!(resolved.rules, vec![rule(SourceRole::First, 0, 0)]);
    }

    #[test]
    fn default_never_references_out_of_range_targets() {
        // Mapping totality: every resolved target is a real face index.
        let cases: Vec<Vec<FaceObservation>> = vec![
            vec![],
            vec![face(0, Gender::Male)],
            vec![face(0, Gender::Female), face(1, Gender::Unknown)],
            vec![face(0, Gender::Male), face(1, Gender::Female), face(2, Gender::Male)],
        ];
        for faces in cases {
            let resolved = resolve(&faces, true, &MappingSpec::UseDefault).unwrap();
            for r in &resolved.rules {
                assert!((r.target_face_index as usize) < faces.len());
            }
        }
    }

    // -- explicit rules -------------------------------------------------------

    #[test]
    fn explicit_valid_rules_pass_through() {
        let faces = vec![face(0, Gender::Male), face(1, Gender::Female)];
        let rules = vec![rule(SourceRole::Second, 0, 0), rule(SourceRole::First, 1, 1)];
        let resolved = resolve(&faces, true, &MappingSpec::Explicit(rules.clone())).unwrap();
        assert_eq!(resolved.rules, rules);
    }

    #[test]
    fn explicit_out_of_range_target_rejected() {
        let faces = vec![face(0, Gender::Male)];
        let err = resolve(
            &faces,
            true,
            &MappingSpec::Explicit(vec![rule(SourceRole::First, 0, 3)]),
        )
        .unwrap_err();
        assert_matches!(err, MappingError::InvalidRules { ref violations } => {
            assert_eq!(violations.len(), 1);
            assert!(violations[0].contains("out of range"));
        });
    }

    #[test]
    fn explicit_reports_all_violations_not_just_first() {
        let faces = vec![face(0, Gender::Male)];
        let rules = vec![
            rule(SourceRole::First, 0, 5),
            rule(SourceRole::Second, 0, 7),
            rule(SourceRole::First, 0, 0),
            rule(SourceRole::Second, 0, 0),
        ];
        let err = resolve(&faces, true, &MappingSpec::Explicit(rules)).unwrap_err();
        assert_matches!(err, MappingError::InvalidRules { ref violations } => {
            // Two range violations plus one ambiguity.
            assert_eq!(violations.len(), 3);
        });
    }

    #[test]
    fn explicit_ambiguous_target_across_roles_rejected() {
        let faces = vec![face(0, Gender::Male), face(1, Gender::Female)];
        let rules = vec![rule(SourceRole::First, 0, 0), rule(SourceRole::Second, 0, 0)];
        let err = resolve(&faces, true, &MappingSpec::Explicit(rules)).unwrap_err();
        assert_matches!(err, MappingError::InvalidRules { ref violations } => {
            assert!(violations[0].contains("claimed by both"));
        });
    }

    #[test]
    fn explicit_same_role_repeating_target_allowed() {
        let faces = vec![face(0, Gender::Male)];
        let rules = vec![rule(SourceRole::First, 0, 0), rule(SourceRole::First, 0, 0)];
        let resolved = resolve(&faces, true, &MappingSpec::Explicit(rules)).unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn explicit_one_to_many_same_source_allowed() {
        let faces = vec![face(0, Gender::Male), face(1, Gender::Male)];
        let rules = vec![rule(SourceRole::First, 0, 0), rule(SourceRole::First, 0, 1)];
        assert!(resolve(&faces, true, &MappingSpec::Explicit(rules)).is_ok());
    }

    #[test]
    fn explicit_does_not_require_completed_preprocessing_flag() {
        // Targets are still validated against the known faces.
        let faces = vec![face(0, Gender::Male)];
        let rules = vec![rule(SourceRole::First, 0, 0)];
        assert!(resolve(&faces, false, &MappingSpec::Explicit(rules)).is_ok());
    }

    // -- no source ------------------------------------------------------------

    #[test]
    fn unspecified_is_an_error() {
        let faces = vec![face(0, Gender::Male)];
        let err = resolve(&faces, true, &MappingSpec::Unspecified).unwrap_err();
        assert_matches!(err, MappingError::NoSource);
    }

    #[test]
    fn empty_explicit_list_is_no_source() {
        let faces = vec![face(0, Gender::Male)];
        let err = resolve(&faces, true, &MappingSpec::Explicit(vec![])).unwrap_err();
        assert_matches!(err, MappingError::NoSource);
    }

    // -- serde ----------------------------------------------------------------

    #[test]
    fn mapping_spec_tagged_representation() {
        let json = serde_json::to_value(&MappingSpec::UseDefault).unwrap();
        assert_eq!(json["mode"], "use_default");

        let spec = MappingSpec::Explicit(vec![rule(SourceRole::First, 0, 1)]);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["mode"], "explicit");
        assert_eq!(json["rules"][0]["source_role"], "first");
    }

    #[test]
    fn resolved_mapping_serializes_as_bare_array() {
        let resolved = ResolvedMapping {
            rules: vec![rule(SourceRole::First, 0, 0)],
        };
        let json = serde_json::to_value(&resolved).unwrap();
        assert!(json.is_array());
    }
}
