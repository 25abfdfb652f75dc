//! Safety classification of steps and plans, environment policy
//! enforcement, and plan-level impact analysis.

use serde::{Deserialize, Serialize};

use crate::step::Step;

/// Ordered safety scale. Derive order matters: `Safe < RequiresReview <
/// Unsafe < Dangerous`, and a plan's score is the maximum over its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    RequiresReview,
    Unsafe,
    Dangerous,
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::RequiresReview => "requires_review",
            SafetyLevel::Unsafe => "unsafe",
            SafetyLevel::Dangerous => "dangerous",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// A step's safety rating plus the rationale carried for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepClassification {
    pub level: SafetyLevel,
    pub rationale: &'static str,
}

/// Classifies a single step per the fixed classification table. Column
/// additions are the only rule that depends on the step's payload rather
/// than its kind alone: a non-null column with no default needs a backfill
/// plan, a nullable one (or one with a default) does not.
pub fn classify_step(step: &Step) -> StepClassification {
    match step {
        Step::AddTable { .. } => StepClassification {
            level: SafetyLevel::Safe,
            rationale: "non-breaking",
        },
        Step::AddColumn { column, .. } => {
            if !column.nullable && column.default.is_none() {
                StepClassification {
                    level: SafetyLevel::RequiresReview,
                    rationale: "needs default or data backfill",
                }
            } else {
                StepClassification {
                    level: SafetyLevel::Safe,
                    rationale: "non-breaking",
                }
            }
        }
        Step::AddIndex { .. } => StepClassification {
            level: SafetyLevel::Safe,
            rationale: "non-breaking; may be long on large tables",
        },
        Step::AddForeignKey { .. } => StepClassification {
            level: SafetyLevel::RequiresReview,
            rationale: "requires referential validation of existing rows",
        },
        Step::ModifyColumn { .. } => StepClassification {
            level: SafetyLevel::RequiresReview,
            rationale: "may require data transformation",
        },
        Step::RenameColumn { .. } => StepClassification {
            level: SafetyLevel::RequiresReview,
            rationale: "may break dependent code",
        },
        Step::DropIndex { .. } | Step::DropForeignKey { .. } => StepClassification {
            level: SafetyLevel::Safe,
            rationale: "structural only",
        },
        Step::DropColumn { .. } => StepClassification {
            level: SafetyLevel::Dangerous,
            rationale: "data loss",
        },
        Step::DropTable { .. } => StepClassification {
            level: SafetyLevel::Dangerous,
            rationale: "data loss",
        },
    }
}

/// A plan's score is the maximum over its steps' classifications.
pub fn classify_plan(steps: &[Step]) -> SafetyLevel {
    steps
        .iter()
        .map(|s| classify_step(s).level)
        .max()
        .unwrap_or(SafetyLevel::Safe)
}

/// A crude, step-count-derived downtime estimate. Not a measurement --
/// just enough signal for an operator deciding when to run a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeEstimate {
    None,
    UnderTenSeconds,
    UnderThirtySeconds,
    UnderOneMinute,
}

/// The impact-analysis record carried alongside a plan's safety score:
/// which tables it touches, a crude downtime estimate, and the three
/// yes/no flags an operator reads before approving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub affected_tables: Vec<String>,
    pub downtime_estimate: DowntimeEstimate,
    pub requires_backup: bool,
    pub breaking: bool,
    pub reversible: bool,
}

/// Derives the impact analysis for a plan. `requires_backup` and
/// `breaking` both key off drops and modifies (a modify may need a data
/// transform and is not safely undoable without the pre-modify data);
/// `breaking` additionally covers a non-null column add with no default,
/// which breaks existing writers until backfilled. `reversible` is always
/// true for the core step set: rollback is synthesized from the `from`
/// model for every step kind (see [`crate::diff::rollback`]).
pub fn analyze_impact(steps: &[Step]) -> ImpactAnalysis {
    let mut affected_tables: Vec<String> = steps.iter().map(|s| s.table().to_string()).collect();
    affected_tables.sort();
    affected_tables.dedup();

    let requires_backup = steps.iter().any(|s| {
        matches!(
            s,
            Step::DropTable { .. } | Step::DropColumn { .. } | Step::ModifyColumn { .. }
        )
    });
    let breaking = steps.iter().any(|s| match s {
        Step::DropTable { .. } | Step::DropColumn { .. } | Step::ModifyColumn { .. } => true,
        Step::AddColumn { column, .. } => !column.nullable && column.default.is_none(),
        _ => false,
    });

    let downtime_estimate = match steps.len() {
        0 => DowntimeEstimate::None,
        1..=3 => DowntimeEstimate::UnderTenSeconds,
        4..=10 => DowntimeEstimate::UnderThirtySeconds,
        _ => DowntimeEstimate::UnderOneMinute,
    };

    ImpactAnalysis {
        affected_tables,
        downtime_estimate,
        requires_backup,
        breaking,
        reversible: true,
    }
}

/// The outcome of running a plan's safety score through an environment's
/// deployment policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub blocked: bool,
    pub warnings: Vec<String>,
}

/// Applies environment policy to a classified plan.
///
/// - Production blocks `Dangerous` plans unless `allow_dangerous` is set,
///   warns at `RequiresReview` and above, and adds a low-traffic warning
///   once the plan exceeds ten steps.
/// - Staging echoes the same warnings but never blocks.
/// - Development permits everything; auto-deploy is left to the caller, who
///   should only auto-apply `Safe` plans regardless of environment.
pub fn apply_policy(
    environment: Environment,
    level: SafetyLevel,
    step_count: usize,
    allow_dangerous: bool,
) -> PolicyDecision {
    let mut warnings = Vec::new();
    let mut blocked = false;

    if level >= SafetyLevel::RequiresReview {
        warnings.push("test on staging".to_string());
        warnings.push("create backup".to_string());
    }
    if step_count > 10 {
        warnings.push("run during low traffic".to_string());
    }

    if matches!(environment, Environment::Production)
        && level == SafetyLevel::Dangerous
        && !allow_dangerous
    {
        blocked = true;
    }

    PolicyDecision { blocked, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    #[test]
    fn ordering_matches_the_contract() {
        assert!(SafetyLevel::Safe < SafetyLevel::RequiresReview);
        assert!(SafetyLevel::RequiresReview < SafetyLevel::Unsafe);
        assert!(SafetyLevel::Unsafe < SafetyLevel::Dangerous);
    }

    #[test]
    fn plan_score_is_the_max_of_its_steps() {
        let steps = vec![
            Step::AddTable {
                table: "users".into(),
                columns: vec![],
            },
            Step::DropTable {
                table: "legacy".into(),
            },
        ];
        assert_eq!(classify_plan(&steps), SafetyLevel::Dangerous);
    }

    #[test]
    fn non_null_column_without_default_requires_review() {
        let step = Step::AddColumn {
            table: "users".into(),
            column: Column {
                name: "age".into(),
                sql_type: "INTEGER".into(),
                nullable: false,
                primary: false,
                default: None,
                generated: false,
            },
        };
        assert_eq!(classify_step(&step).level, SafetyLevel::RequiresReview);
    }

    #[test]
    fn production_blocks_dangerous_plans_without_override() {
        let decision = apply_policy(Environment::Production, SafetyLevel::Dangerous, 1, false);
        assert!(decision.blocked);
    }

    #[test]
    fn production_allows_dangerous_plans_with_override() {
        let decision = apply_policy(Environment::Production, SafetyLevel::Dangerous, 1, true);
        assert!(!decision.blocked);
    }

    #[test]
    fn staging_never_blocks() {
        let decision = apply_policy(Environment::Staging, SafetyLevel::Dangerous, 1, false);
        assert!(!decision.blocked);
    }

    #[test]
    fn long_plans_warn_about_traffic() {
        let decision = apply_policy(Environment::Development, SafetyLevel::Safe, 11, false);
        assert!(decision.warnings.iter().any(|w| w.contains("low traffic")));
    }

    #[test]
    fn impact_analysis_lists_affected_tables_deduped_and_sorted() {
        let steps = vec![
            Step::AddTable { table: "users".into(), columns: vec![] },
            Step::AddIndex {
                table: "users".into(),
                index: crate::model::IndexDef { name: "users_email_idx".into(), columns: vec!["email".into()], unique: true },
            },
            Step::DropTable { table: "legacy".into() },
        ];
        let impact = analyze_impact(&steps);
        assert_eq!(impact.affected_tables, vec!["legacy".to_string(), "users".to_string()]);
    }

    #[test]
    fn drop_and_modify_require_backup_and_are_breaking() {
        let steps = vec![Step::DropColumn { table: "users".into(), column: "email".into() }];
        let impact = analyze_impact(&steps);
        assert!(impact.requires_backup);
        assert!(impact.breaking);
        assert!(impact.reversible);
    }

    #[test]
    fn non_null_add_without_default_is_breaking_but_not_backup_requiring() {
        let steps = vec![Step::AddColumn {
            table: "users".into(),
            column: Column {
                name: "age".into(),
                sql_type: "INTEGER".into(),
                nullable: false,
                primary: false,
                default: None,
                generated: false,
            },
        }];
        let impact = analyze_impact(&steps);
        assert!(impact.breaking);
        assert!(!impact.requires_backup);
    }

    #[test]
    fn downtime_estimate_scales_with_step_count() {
        assert_eq!(analyze_impact(&[]).downtime_estimate, DowntimeEstimate::None);
        let one = vec![Step::AddTable { table: "a".into(), columns: vec![] }];
        assert_eq!(analyze_impact(&one).downtime_estimate, DowntimeEstimate::UnderTenSeconds);
        let eleven: Vec<Step> = (0..11)
            .map(|i| Step::AddTable { table: format!("t{i}"), columns: vec![] })
            .collect();
        assert_eq!(analyze_impact(&eleven).downtime_estimate, DowntimeEstimate::UnderOneMinute);
    }
}
