//! Violation records and the per-file analysis result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    MagicLiteral,
    NameCoupling,
    PositionCoupling,
    AlgorithmCoupling,
    GodObject,
    ParameterCoupling,
    DeepNesting,
}

impl ViolationType {
    pub const ALL: [ViolationType; 7] = [
        ViolationType::MagicLiteral,
        ViolationType::NameCoupling,
        ViolationType::PositionCoupling,
        ViolationType::AlgorithmCoupling,
        ViolationType::GodObject,
        ViolationType::ParameterCoupling,
        ViolationType::DeepNesting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationType::MagicLiteral => "magic_literal",
            ViolationType::NameCoupling => "name_coupling",
            ViolationType::PositionCoupling => "position_coupling",
            ViolationType::AlgorithmCoupling => "algorithm_coupling",
            ViolationType::GodObject => "god_object",
            ViolationType::ParameterCoupling => "parameter_coupling",
            ViolationType::DeepNesting => "deep_nesting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// Severity before any threshold escalation.
    pub fn base_severity(self) -> Severity {
        match self {
            ViolationType::MagicLiteral | ViolationType::NameCoupling => Severity::Low,
            ViolationType::PositionCoupling
            | ViolationType::AlgorithmCoupling
            | ViolationType::GodObject
            | ViolationType::ParameterCoupling => Severity::Medium,
            ViolationType::DeepNesting => Severity::High,
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// One step up, saturating at critical.
    pub fn escalate(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub description: String,
    pub node_kind: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: [{}] {}: {}",
            self.line, self.column, self.severity, self.violation_type, self.description
        )
    }
}

/// Violations of one file grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub path: String,
    pub violations: BTreeMap<String, Vec<Violation>>,
    pub total: usize,
}

impl AnalysisResult {
    pub fn from_violations(path: impl Into<String>, mut violations: Vec<Violation>) -> Self {
        violations.sort_by(|a, b| {
            (a.line, a.column, a.violation_type).cmp(&(b.line, b.column, b.violation_type))
        });

        let total = violations.len();
        let mut grouped: BTreeMap<String, Vec<Violation>> = BTreeMap::new();
        for violation in violations {
            grouped
                .entry(violation.violation_type.as_str().to_string())
                .or_default()
                .push(violation);
        }

        Self {
            path: path.into(),
            violations: grouped,
            total,
        }
    }

    pub fn of_type(&self, violation_type: ViolationType) -> &[Violation] {
        self.violations
            .get(violation_type.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.values().flatten()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.iter().map(|v| v.severity).max()
    }

    pub fn is_clean(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(violation_type: ViolationType, line: usize, severity: Severity) -> Violation {
        Violation {
            violation_type,
            line,
            column: 0,
            severity,
            description: String::new(),
            node_kind: "Call".to_string(),
        }
    }

    #[test]
    fn test_grouping_and_order() {
        let result = AnalysisResult::from_violations(
            "a.py",
            vec![
                violation(ViolationType::MagicLiteral, 9, Severity::Low),
                violation(ViolationType::GodObject, 1, Severity::High),
                violation(ViolationType::MagicLiteral, 3, Severity::Low),
            ],
        );

        assert_eq!(result.total, 3);
        let lines: Vec<_> = result.of_type(ViolationType::MagicLiteral).iter().map(|v| v.line).collect();
        assert_eq!(lines, vec![3, 9]);
        assert_eq!(result.max_severity(), Some(Severity::High));
        assert!(result.of_type(ViolationType::DeepNesting).is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let v = violation(ViolationType::ParameterCoupling, 2, Severity::Medium);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "parameter_coupling");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["node_kind"], "Call");
    }

    #[test]
    fn test_names_round_trip_through_lookup() {
        for t in ViolationType::ALL {
            assert_eq!(ViolationType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(Severity::High.escalate(), Severity::Critical);
    }
}
