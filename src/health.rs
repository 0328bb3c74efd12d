//! Health Probe: a single synchronous-looking invocation
//! that checks every external dependency without performing a run.
//! Exit code 0 iff every check passes (wired in `src/main.rs`).

use std::path::Path;

use crate::catalog::CatalogClient;
use crate::oracle::OracleClient;

#[derive(Clone, Debug)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Clone, Debug, Default)]
pub struct HealthReport {
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }
}

/// Run every check in : catalog reachability, an oracle no-op
/// call, rubric directory readability plus parse diagnostics, and state
/// directory writability.
pub async fn run_checks(
    catalog: &dyn CatalogClient,
    oracle: &dyn OracleClient,
    rubric_dir: &Path,
    state_dir: &Path,
) -> HealthReport {
    let mut report = HealthReport::default();

    report.checks.push(check_catalog(catalog).await);
    report.checks.push(check_oracle(oracle).await);
    report.checks.push(check_rubric_dir(rubric_dir));
    report.checks.push(check_state_dir(state_dir));

    report
}

async fn check_catalog(catalog: &dyn CatalogClient) -> CheckResult {
    match catalog.list_labels().await {
        Ok(labels) => CheckResult {
            name: "catalog".into(),
            ok: true,
            detail: format!("reachable, {} labels", labels.len()),
        },
        Err(e) => CheckResult { name: "catalog".into(), ok: false, detail: e.to_string() },
    }
}

async fn check_oracle(oracle: &dyn OracleClient) -> CheckResult {
    use crate::model::{Movie, Rubric};
    use crate::oracle::OracleRequest;
    use std::collections::BTreeSet;

    let probe_rubric = Rubric {
        name: "__health_probe__".into(),
        enabled: true,
        prompt: "Respond with an empty decision list.".into(),
        confidence_threshold: 0.5,
        priority: 0,
        include_labels: BTreeSet::new(),
        exclude_labels: BTreeSet::new(),
        use_refinement: false,
        refinement_band: 0.0,
        example_includes: vec![],
        example_excludes: vec![],
    };
    let probe_movie = Movie {
        id: 0,
        title: "health-check probe".into(),
        year: 1900,
        overview: String::new(),
        genres: vec![],
        studio: None,
        alternate_titles: vec![],
        directors: vec![],
        actors: vec![],
        labels: BTreeSet::new(),
    };

    let request = OracleRequest { rubric: &probe_rubric, movies: std::slice::from_ref(&probe_movie), detailed: false };
    match oracle.classify(request).await {
        Ok(_) => CheckResult { name: "oracle".into(), ok: true, detail: "reachable".into() },
        Err(e) => CheckResult { name: "oracle".into(), ok: false, detail: e.to_string() },
    }
}

fn check_rubric_dir(rubric_dir: &Path) -> CheckResult {
    match crate::rubric::extract_dir(rubric_dir, false) {
        Ok(outcome) => CheckResult {
            name: "rubric_dir".into(),
            ok: true,
            detail: format!(
                "{} rubrics, {} diagnostics",
                outcome.rubrics.len(),
                outcome.diagnostics.len()
            ),
        },
        Err(e) => CheckResult { name: "rubric_dir".into(), ok: false, detail: e.to_string() },
    }
}

fn check_state_dir(state_dir: &Path) -> CheckResult {
    let probe = state_dir.join(".kometa_health_probe");
    match std::fs::create_dir_all(state_dir).and_then(|_| std::fs::write(&probe, b"ok")) {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            CheckResult { name: "state_dir".into(), ok: true, detail: "writable".into() }
        }
        Err(e) => CheckResult { name: "state_dir".into(), ok: false, detail: e.to_string() },
    }
}
