//! Header and summary banners for `build-domain run`.

use crate::pipeline::RunSummary;

const RULE_WIDTH: usize = 90;

/// What the header reports about the run.
#[derive(Debug, Clone)]
pub struct HeaderInfo<'a> {
    pub repository: &'a str,
    pub branch: &'a str,
    pub build_number: &'a str,
    pub release_config: &'a str,
    pub release_name: &'a str,
    pub diff_check: bool,
    pub serialize: bool,
    pub server_url: &'a str,
}

fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

/// `user@host` of the machine running the build.
pub fn runner_identity() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

pub fn header_lines(info: &HeaderInfo<'_>, runner: &str) -> Vec<String> {
    vec![
        rule(),
        format!("build-domain -- Version:{}", env!("CARGO_PKG_VERSION")),
        rule(),
        format!("Repository    : {}", info.repository),
        format!("Branch        : {}", info.branch),
        format!("Build Number  : {}", info.build_number),
        format!("Release Config: {}", info.release_config),
        format!("Release Name  : {}", info.release_name),
        format!("Diff Check    : {}", info.diff_check),
        format!("Serialize     : {}", info.serialize),
        format!("SFP Server    : {}", info.server_url),
        format!("Runner        : {}", runner),
        rule(),
    ]
}

pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![rule(), "Build Summary".to_string(), rule()];

    if summary.has_artifacts() {
        lines.push(format!(
            "Artifacts        : {} package(s) built",
            summary.artifact_count
        ));
        lines.push(format!(
            "Published        : {}",
            if summary.published { "Yes" } else { "No" }
        ));
        lines.push(format!(
            "Release Candidate: {}",
            summary.release_candidate.as_deref().unwrap_or("Skipped")
        ));
    } else {
        lines.push("Artifacts        : None (no changes detected)".to_string());
        lines.push("Published        : Skipped".to_string());
        lines.push("Release Candidate: Skipped".to_string());
    }

    lines.push(rule());
    lines
}

pub fn print_header(info: &HeaderInfo<'_>) {
    for line in header_lines(info, &runner_identity()) {
        println!("{}", line);
    }
    println!();
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    for line in summary_lines(summary) {
        println!("{}", line);
    }
}
