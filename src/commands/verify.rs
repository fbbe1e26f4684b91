use anyhow::Result;

use crate::commands::{CommandReport, open_library};
use crate::shelf::catalog::read_catalog;
use crate::shelf::verify::verify_records;

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub strict: bool,
}

pub fn run(opts: &VerifyOptions) -> Result<CommandReport> {
    let (paths, loaded) = open_library(true)?;
    let mut report = CommandReport::new("verify");

    let records = read_catalog(&paths)?;
    let summary = verify_records(&paths, &loaded.config, &records)?;
    report.detail(format!("checked={}", summary.checked));
    report.detail(format!("links={}", summary.links));
    report.detail(format!("records_with_findings={}", summary.problems.len()));

    for problem in &summary.problems {
        let findings: Vec<&str> = problem.findings.iter().map(|f| f.as_str()).collect();
        report.detail(format!(
            "finding key={} path={} {}",
            problem.key,
            problem.file,
            findings.join(",")
        ));
        for link in &problem.blocked_links {
            report.detail(format!("blocked_link key={} path={}", problem.key, link.display()));
        }
    }

    if opts.strict && !summary.problems.is_empty() {
        report.issue(format!(
            "strict verify failed: {} record(s) with findings",
            summary.problems.len()
        ));
    }

    Ok(report)
}
