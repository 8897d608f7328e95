//! Drift detection via `plan -detailed-exitcode`
//!
//! Plan output is scanned for the per-resource headline comments Terraform
//! prints (`# a.b will be updated in-place`). Lines that match nothing are
//! ignored, so the resource list is a summary aid and never authoritative.

use crate::backend::{self, ToolBackend};
use crate::context::{CancelToken, ConfirmCallback};
use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Matches `# <address> <change phrase>` headlines in plan output
static CHANGE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*#\s+(\S+)\s+(will be updated in-place|will be destroyed|will be created|must be replaced)",
    )
    .expect("valid regex")
});

/// Plan exit code when there are no changes
const EXIT_NO_CHANGES: i32 = 0;

/// Plan exit code when changes are present
const EXIT_CHANGES: i32 = 2;

/// Kind of change a plan reports for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Replace,
}

impl ChangeType {
    fn from_phrase(phrase: &str) -> Option<Self> {
        match phrase {
            "will be created" => Some(Self::Create),
            "will be updated in-place" => Some(Self::Update),
            "will be destroyed" => Some(Self::Delete),
            "must be replaced" => Some(Self::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource whose real state differs from its configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftedResource {
    pub address: String,
    pub change_type: ChangeType,
    /// The phrase the plan used, e.g. `will be destroyed`
    pub description: String,
}

/// Outcome of one drift check
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriftResult {
    pub has_drift: bool,
    pub drifted_resources: Vec<DriftedResource>,
    pub plan_output: String,
    /// The plan reported changes but no resource line could be recognised
    pub unparsed_changes: bool,
}

impl DriftResult {
    /// Drifted resources grouped by change type, in a stable order
    pub fn by_change_type(&self) -> Vec<(ChangeType, Vec<&DriftedResource>)> {
        let mut groups: Vec<(ChangeType, Vec<&DriftedResource>)> = Vec::new();
        for resource in &self.drifted_resources {
            match groups.iter_mut().find(|(ct, _)| *ct == resource.change_type) {
                Some((_, list)) => list.push(resource),
                None => groups.push((resource.change_type, vec![resource])),
            }
        }
        groups.sort_by_key(|(ct, _)| *ct);
        groups
    }
}

/// Extract drifted resources from plan output
pub fn parse_plan_output(output: &str) -> Vec<DriftedResource> {
    output
        .lines()
        .filter_map(|line| {
            let caps = CHANGE_LINE_RE.captures(line)?;
            let phrase = caps.get(2)?.as_str();
            Some(DriftedResource {
                address: caps.get(1)?.as_str().to_string(),
                change_type: ChangeType::from_phrase(phrase)?,
                description: phrase.to_string(),
            })
        })
        .collect()
}

/// Runs plan and classifies the result
pub struct DriftDetector {
    backend: Arc<dyn ToolBackend>,
}

impl DriftDetector {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self { backend }
    }

    /// Run `plan -detailed-exitcode` and interpret its exit code.
    ///
    /// Exit 0 is no drift, exit 2 is drift, anything else is
    /// [`Error::PlanFailed`].
    pub fn detect(&self, cancel: &CancelToken) -> Result<DriftResult> {
        log::info!("Running {} plan to detect drift", self.backend.binary());
        let out = self.backend.plan(cancel)?;

        match out.exit_code {
            Some(EXIT_NO_CHANGES) => Ok(DriftResult {
                plan_output: out.output,
                ..Default::default()
            }),
            Some(EXIT_CHANGES) => {
                let drifted_resources = parse_plan_output(&out.output);
                let unparsed_changes = drifted_resources.is_empty();
                if unparsed_changes {
                    log::warn!("Plan reported changes but no resource lines were recognised");
                }
                Ok(DriftResult {
                    has_drift: true,
                    drifted_resources,
                    plan_output: out.output,
                    unparsed_changes,
                })
            }
            code => Err(Error::PlanFailed {
                exit_code: code.unwrap_or(-1),
                output: out.output,
            }),
        }
    }
}

/// Pre-import drift check behaviour
#[derive(Debug, Clone, Default)]
pub struct DriftCheckOptions {
    /// Run the check at all
    pub enabled: bool,
    /// Fail instead of prompting when drift exists
    pub abort_on_drift: bool,
    /// Refresh state before planning
    pub refresh_first: bool,
}

/// Check for drift before an import batch.
///
/// Returns `Ok(None)` when the check is disabled. When drift is found the
/// batch either aborts with [`Error::DriftDetected`] or proceeds only if
/// `confirm` approves.
pub fn run_pre_import_check(
    backend: Arc<dyn ToolBackend>,
    options: &DriftCheckOptions,
    cancel: &CancelToken,
    confirm: &mut dyn ConfirmCallback,
) -> Result<Option<DriftResult>> {
    if !options.enabled {
        return Ok(None);
    }

    if options.refresh_first {
        backend::refresh_state(backend.as_ref(), cancel)?;
    }

    let result = DriftDetector::new(backend).detect(cancel)?;
    if !result.has_drift {
        return Ok(Some(result));
    }

    let count = result.drifted_resources.len();
    for resource in &result.drifted_resources {
        log::warn!("Drift: {} {}", resource.address, resource.description);
    }
    if options.abort_on_drift {
        return Err(Error::DriftDetected { count });
    }

    let proceed = confirm
        .confirm("Existing drift detected. Continue with the import anyway?")
        .map_err(|e| Error::Other(format!("confirmation failed: {e}")))?;
    if !proceed {
        return Err(Error::Declined("import".into()));
    }

    log::warn!("Continuing import despite drift in {count} resource(s)");
    Ok(Some(result))
}

/// Re-check drift after a batch.
///
/// Residual drift is only logged; it never fails the batch that already ran.
pub fn post_import_check(backend: Arc<dyn ToolBackend>, cancel: &CancelToken) -> Result<DriftResult> {
    let result = DriftDetector::new(backend).detect(cancel)?;
    if result.has_drift {
        log::warn!(
            "Drift remains after import in {} resource(s)",
            result.drifted_resources.len()
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::context::{AutoConfirm, AutoDecline};

    fn planning(code: i32, text: &str) -> Arc<MockBackend> {
        Arc::new(MockBackend {
            plan_response: Some((code, text.to_string())),
            ..MockBackend::new()
        })
    }

    const SAMPLE_PLAN: &str = "\
Terraform will perform the following actions:

  # hyperping_monitor.api will be created
  + resource \"hyperping_monitor\" \"api\" {
    }

  # hyperping_monitor.web will be updated in-place
  ~ resource \"hyperping_monitor\" \"web\" {
    }

  # hyperping_healthcheck.old will be destroyed
  # hyperping_incident.db must be replaced
-/+ resource \"hyperping_incident\" \"db\" {
    }

Plan: 2 to add, 1 to change, 2 to destroy.
";

    #[test]
    fn test_parse_all_change_types() {
        let drifted = parse_plan_output(SAMPLE_PLAN);
        let got: Vec<(&str, ChangeType)> = drifted
            .iter()
            .map(|d| (d.address.as_str(), d.change_type))
            .collect();
        assert_eq!(
            got,
            vec![
                ("hyperping_monitor.api", ChangeType::Create),
                ("hyperping_monitor.web", ChangeType::Update),
                ("hyperping_healthcheck.old", ChangeType::Delete),
                ("hyperping_incident.db", ChangeType::Replace),
            ]
        );
        assert_eq!(drifted[2].description, "will be destroyed");
    }

    #[test]
    fn test_parse_ignores_unrelated_lines() {
        assert!(parse_plan_output("Refreshing state...\n+ resource\n# just a comment\n").is_empty());
        // Module addresses contain brackets and dots but no spaces
        let drifted = parse_plan_output("  # module.x.aws_s3_bucket.b[\"k\"] will be destroyed");
        assert_eq!(drifted[0].address, "module.x.aws_s3_bucket.b[\"k\"]");
    }

    #[test]
    fn test_detect_update_and_delete() {
        let backend = planning(2, "# a.b will be updated in-place\n# c.d will be destroyed\n");
        let result = DriftDetector::new(backend).detect(&CancelToken::new()).unwrap();

        assert!(result.has_drift);
        assert!(!result.unparsed_changes);
        assert_eq!(result.drifted_resources.len(), 2);
        assert_eq!(result.drifted_resources[0].address, "a.b");
        assert_eq!(result.drifted_resources[0].change_type, ChangeType::Update);
        assert_eq!(result.drifted_resources[1].address, "c.d");
        assert_eq!(result.drifted_resources[1].change_type, ChangeType::Delete);
    }

    #[test]
    fn test_detect_no_drift() {
        let result = DriftDetector::new(planning(0, "No changes."))
            .detect(&CancelToken::new())
            .unwrap();
        assert!(!result.has_drift);
        assert!(result.drifted_resources.is_empty());
        assert_eq!(result.plan_output, "No changes.");
    }

    #[test]
    fn test_detect_plan_error() {
        let err = DriftDetector::new(planning(1, "Error: invalid provider"))
            .detect(&CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::PlanFailed { exit_code: 1, .. }));
        assert_eq!(err.tool_output(), Some("Error: invalid provider"));
    }

    #[test]
    fn test_detect_flags_unparsed_changes() {
        let result = DriftDetector::new(planning(2, "Changes to Outputs:\n  + url = \"x\"\n"))
            .detect(&CancelToken::new())
            .unwrap();
        assert!(result.has_drift);
        assert!(result.unparsed_changes);
    }

    #[test]
    fn test_group_by_change_type() {
        let result = DriftResult {
            has_drift: true,
            drifted_resources: parse_plan_output(
                "# a.x will be destroyed\n# a.y will be created\n# a.z will be destroyed\n",
            ),
            ..Default::default()
        };
        let groups = result.by_change_type();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, ChangeType::Create);
        assert_eq!(groups[1].0, ChangeType::Delete);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn test_pre_import_check_disabled() {
        let backend = planning(2, "# a.b will be destroyed");
        let out = run_pre_import_check(
            backend.clone(),
            &DriftCheckOptions::default(),
            &CancelToken::new(),
            &mut AutoDecline,
        )
        .unwrap();
        assert!(out.is_none());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_pre_import_check_refreshes_first() {
        let backend = planning(0, "");
        let opts = DriftCheckOptions {
            enabled: true,
            refresh_first: true,
            ..Default::default()
        };
        run_pre_import_check(backend.clone(), &opts, &CancelToken::new(), &mut AutoDecline).unwrap();
        assert_eq!(backend.calls(), vec!["refresh", "plan"]);
    }

    #[test]
    fn test_pre_import_check_abort_on_drift() {
        let opts = DriftCheckOptions {
            enabled: true,
            abort_on_drift: true,
            ..Default::default()
        };
        let err = run_pre_import_check(
            planning(2, "# a.b will be destroyed"),
            &opts,
            &CancelToken::new(),
            &mut AutoConfirm,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DriftDetected { count: 1 }));
    }

    #[test]
    fn test_pre_import_check_prompts() {
        let opts = DriftCheckOptions {
            enabled: true,
            ..Default::default()
        };
        let drifting = || planning(2, "# a.b will be destroyed");

        let declined =
            run_pre_import_check(drifting(), &opts, &CancelToken::new(), &mut AutoDecline);
        assert!(matches!(declined, Err(Error::Declined(_))));

        let accepted =
            run_pre_import_check(drifting(), &opts, &CancelToken::new(), &mut AutoConfirm).unwrap();
        assert!(accepted.unwrap().has_drift);
    }

    #[test]
    fn test_post_import_drift_is_not_an_error() {
        let result =
            post_import_check(planning(2, "# a.b will be updated in-place"), &CancelToken::new())
                .unwrap();
        assert!(result.has_drift);
    }
}
