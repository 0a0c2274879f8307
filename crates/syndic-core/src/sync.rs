//! The sync pipeline: fetch, verify, plan, render, publish.
//!
//! One cycle runs the stages in order under a global deadline. App and
//! target failures are isolated: a catalog 404 for one app skips that
//! app, a failed target leaves the other targets publishing normally.
//! The cycle fails closed - when the deadline fires, nothing written
//! so far is rolled back (publishes are atomic per target) and nothing
//! further is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use syndic_schema::{AppSlug, DigestAlgorithm, VerifiedDownload};

use crate::aur_push::AurPusher;
use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::plan::{self, CycleRecord, PlanReason};
use crate::publish::publish;
use crate::render::{render, BrewPlatform, RenderContext, Target};
use crate::state::ManifestState;
use crate::verify::Verifier;

/// Knobs for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Targets to synchronize, in order.
    pub targets: Vec<Target>,
    /// Homebrew platform selection.
    pub platform: BrewPlatform,
    /// Re-render entries even when unchanged.
    pub force: bool,
    /// Plan and render, but write nothing.
    pub dry_run: bool,
    /// Push changed AUR packages to their git remotes.
    pub push: bool,
    /// SSH key for AUR pushes; handed to git, never read.
    pub aur_ssh_key: Option<PathBuf>,
}

/// Outcome of one target within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetStatus {
    /// Output swapped into the live tree.
    Published,
    /// Nothing changed; live tree left untouched.
    Unchanged,
    /// Rendered but not written (`--dry-run`).
    DryRun,
    /// The target could not be published.
    Failed,
}

/// Per-target report.
#[derive(Debug, Serialize)]
pub struct TargetSummary {
    /// Target this summary describes.
    pub target: Target,
    /// Final status.
    pub status: TargetStatus,
    /// Plan entries that actually changed.
    pub changed: usize,
    /// Apps present in the rendered output.
    pub rendered: usize,
    /// Files written on publish.
    pub written: usize,
    /// Files pruned from the live tree.
    pub removed: usize,
    /// Apps the renderer could not update, with reasons.
    pub skipped: Vec<String>,
    /// AUR packages pushed upstream.
    pub pushed: usize,
    /// Target-level failure, when status is `failed`.
    pub error: Option<String>,
}

/// Report for a whole cycle, printed as JSON by the CLI.
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    /// Cycle timestamp (also embedded in generated manifests).
    pub generated_at: String,
    /// Apps fetched and verified.
    pub apps_synced: usize,
    /// Apps dropped by fetch or verification failures.
    pub apps_failed: usize,
    /// Per-target outcomes.
    pub targets: Vec<TargetSummary>,
    /// The global deadline fired before the cycle finished.
    pub deadline_exceeded: bool,
}

impl SyncSummary {
    /// Process exit code for this cycle: zero only when every target
    /// ended clean and the deadline held.
    pub fn exit_code(&self) -> i32 {
        if self.deadline_exceeded {
            return 2;
        }
        let failed = self
            .targets
            .iter()
            .any(|t| t.status == TargetStatus::Failed || t.error.is_some());
        // A published target with candidates but zero apps in its
        // output is a failure, matching the per-target zero-success
        // rule.
        let starved = self
            .targets
            .iter()
            .any(|t| t.status == TargetStatus::Published && t.changed > 0 && t.rendered == 0);
        if failed || starved || (self.apps_synced == 0 && self.apps_failed > 0) {
            1
        } else {
            0
        }
    }
}

/// What `plan` reports for one target.
#[derive(Debug, Serialize)]
pub struct TargetPlan {
    /// Target this plan describes.
    pub target: Target,
    /// Nothing would change for this target.
    pub noop: bool,
    /// Previously published apps that a sync would prune.
    pub stale: usize,
    /// Per-app reasons, in ascending slug order.
    pub entries: Vec<PlanLine>,
}

/// One app's line in a target plan.
#[derive(Debug, Serialize)]
pub struct PlanLine {
    /// App slug.
    pub slug: AppSlug,
    /// Version reported by the catalog this cycle.
    pub version: String,
    /// Why the app would (or would not) be regenerated.
    pub reason: PlanReason,
}

/// Report of a `plan` run, printed as JSON by the CLI.
#[derive(Debug, Serialize)]
pub struct PlanSummary {
    /// Cycle timestamp.
    pub generated_at: String,
    /// Apps whose catalog records were fetched.
    pub apps_planned: usize,
    /// Apps dropped by catalog fetch failures.
    pub apps_failed: usize,
    /// Per-target plans.
    pub targets: Vec<TargetPlan>,
}

impl PlanSummary {
    /// Process exit code: non-zero only when no app could be planned.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.apps_planned == 0 && self.apps_failed > 0)
    }
}

/// Compute per-target plans from catalog metadata alone.
///
/// No artifact is downloaded and nothing is rendered or written:
/// change classification uses the digests the catalog declares when
/// present and falls back to version comparison otherwise.
///
/// # Errors
///
/// Returns an error only when the HTTP client cannot be built.
pub async fn plan_only(config: &Config, options: &SyncOptions) -> anyhow::Result<PlanSummary> {
    let client = CatalogClient::new(&config.catalog)?;
    let fetched = client.fetch_all(&config.apps).await;

    let mut apps_failed = 0;
    let mut current: Vec<CycleRecord> = Vec::new();
    for (slug, result) in fetched {
        match result {
            Ok(record) => {
                let downloads = record
                    .declared_digests
                    .iter()
                    .filter_map(|(key, digest)| {
                        let url = record.downloads.get(key)?.clone();
                        Some((
                            *key,
                            VerifiedDownload {
                                url,
                                length: 0,
                                digest: digest.clone(),
                                algorithm: DigestAlgorithm::Sha256,
                            },
                        ))
                    })
                    .collect();
                current.push(CycleRecord { record, downloads });
            }
            Err(err) => {
                error!(slug = %slug, error = %err, "skipping app: catalog fetch failed");
                apps_failed += 1;
            }
        }
    }
    current.sort_by(|a, b| a.record.slug.cmp(&b.record.slug));

    let mut targets = Vec::new();
    for target in &options.targets {
        let root = target_root(config, *target);
        let previous = ManifestState::load(*target, root, config);
        let plan = plan::plan(*target, &current, &previous, options.force);
        targets.push(TargetPlan {
            target: *target,
            noop: plan.is_noop(),
            stale: plan.stale,
            entries: plan
                .entries
                .iter()
                .map(|e| PlanLine {
                    slug: e.app.record.slug.clone(),
                    version: e.app.record.version.to_string(),
                    reason: e.reason,
                })
                .collect(),
        });
    }

    Ok(PlanSummary {
        generated_at: Utc::now().to_rfc3339(),
        apps_planned: current.len(),
        apps_failed,
        targets,
    })
}

/// Run one sync cycle under the configured global deadline.
///
/// # Errors
///
/// Returns an error only for setup failures (HTTP client
/// construction); everything after that is reported in the summary.
pub async fn run(config: &Config, options: &SyncOptions) -> anyhow::Result<SyncSummary> {
    let deadline = Duration::from_secs(config.catalog.deadline_secs);
    match tokio::time::timeout(deadline, run_inner(config, options)).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                deadline_secs = config.catalog.deadline_secs,
                "sync deadline exceeded, aborting cycle"
            );
            Ok(SyncSummary {
                generated_at: Utc::now().to_rfc3339(),
                apps_synced: 0,
                apps_failed: config.apps.len(),
                targets: Vec::new(),
                deadline_exceeded: true,
            })
        }
    }
}

async fn run_inner(config: &Config, options: &SyncOptions) -> anyhow::Result<SyncSummary> {
    let generated_at = Utc::now();
    let client = CatalogClient::new(&config.catalog)?;
    let verifier = Verifier::new(
        config.digest_policy,
        config.catalog.timeout_secs,
        config.catalog.retries,
    )?;

    let fetched = client.fetch_all(&config.apps).await;
    let mut apps_failed = 0;
    let mut records = Vec::new();
    for (slug, result) in fetched {
        match result {
            Ok(record) => records.push(record),
            Err(err) => {
                error!(slug = %slug, error = %err, "skipping app: catalog fetch failed");
                apps_failed += 1;
            }
        }
    }

    let mut cycle = verify_all(&verifier, records, config.catalog.concurrency).await;
    apps_failed += cycle
        .iter()
        .filter(|(_, result)| result.is_err())
        .count();
    let mut current: Vec<CycleRecord> = cycle
        .drain(..)
        .filter_map(|(_, result)| result.ok())
        .collect();
    current.sort_by(|a, b| a.record.slug.cmp(&b.record.slug));

    info!(
        synced = current.len(),
        failed = apps_failed,
        "catalog fetch and verification complete"
    );

    // Publishing an empty output set would prune every live manifest.
    // When nothing survived fetch/verify, leave the trees alone.
    if current.is_empty() && apps_failed > 0 {
        warn!("no apps survived fetch and verification, leaving all targets untouched");
        return Ok(SyncSummary {
            generated_at: generated_at.to_rfc3339(),
            apps_synced: 0,
            apps_failed,
            targets: Vec::new(),
            deadline_exceeded: false,
        });
    }

    let mut targets = Vec::new();
    for target in &options.targets {
        targets.push(run_target(*target, &current, config, options, generated_at).await);
    }

    Ok(SyncSummary {
        generated_at: generated_at.to_rfc3339(),
        apps_synced: current.len(),
        apps_failed,
        targets,
        deadline_exceeded: false,
    })
}

async fn verify_all(
    verifier: &Verifier,
    records: Vec<syndic_schema::AppRecord>,
    concurrency: usize,
) -> Vec<(AppSlug, Result<CycleRecord, crate::verify::VerifyError>)> {
    stream::iter(records.into_iter().map(|record| async move {
        let slug = record.slug.clone();
        match verifier.verify(&record).await {
            Ok(downloads) => (slug, Ok(CycleRecord { record, downloads })),
            Err(err) => {
                error!(slug = %slug, error = %err, "skipping app: verification failed");
                (slug, Err(err))
            }
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}

fn target_root<'a>(config: &'a Config, target: Target) -> &'a Path {
    match target {
        Target::Altstore => &config.output.altstore,
        Target::Fdroid => &config.output.fdroid,
        Target::Homebrew => &config.output.homebrew,
        Target::Winget => &config.output.winget,
        Target::Aur => &config.output.aur,
    }
}

async fn run_target(
    target: Target,
    current: &[CycleRecord],
    config: &Config,
    options: &SyncOptions,
    generated_at: chrono::DateTime<Utc>,
) -> TargetSummary {
    let root = target_root(config, target);
    let previous = ManifestState::load(target, root, config);
    let plan = plan::plan(target, current, &previous, options.force);

    let mut summary = TargetSummary {
        target,
        status: TargetStatus::Unchanged,
        changed: plan.changed(),
        rendered: 0,
        written: 0,
        removed: 0,
        skipped: Vec::new(),
        pushed: 0,
        error: None,
    };

    if plan.is_noop() {
        info!(target = %target, "no changes, leaving published tree untouched");
        return summary;
    }

    let ctx = RenderContext {
        config,
        platform: options.platform,
        previous: &previous,
        generated_at,
    };
    let outcome = match render(&plan, &ctx) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(target = %target, error = %err, "render failed");
            summary.status = TargetStatus::Failed;
            summary.error = Some(err.to_string());
            return summary;
        }
    };
    summary.rendered = outcome.rendered;
    summary.skipped = outcome
        .skipped
        .iter()
        .map(|(slug, err)| format!("{slug}: {err}"))
        .collect();
    for (slug, err) in &outcome.skipped {
        warn!(target = %target, slug = %slug, error = %err, "app dropped from output");
    }

    if options.dry_run {
        info!(
            target = %target,
            changed = summary.changed,
            rendered = summary.rendered,
            "dry run, not publishing"
        );
        summary.status = TargetStatus::DryRun;
        return summary;
    }

    match publish(&outcome.output, root, &config.output.preserve) {
        Ok(report) => {
            summary.status = TargetStatus::Published;
            summary.written = report.written;
            summary.removed = report.removed.len();
        }
        Err(err) => {
            error!(target = %target, error = %err, "publish failed");
            summary.status = TargetStatus::Failed;
            summary.error = Some(err.to_string());
            return summary;
        }
    }

    if target == Target::Aur && options.push {
        push_aur_packages(&plan, config, options, root, &mut summary).await;
    }
    summary
}

/// Push every changed AUR package that made it into the published tree.
async fn push_aur_packages(
    plan: &plan::RenderPlan<'_>,
    config: &Config,
    options: &SyncOptions,
    root: &Path,
    summary: &mut TargetSummary,
) {
    let pusher = AurPusher::new(AurPusher::AUR_REMOTE, options.aur_ssh_key.clone());
    let mut failures = Vec::new();

    for entry in &plan.entries {
        if entry.reason == PlanReason::Unchanged {
            continue;
        }
        let record = &entry.app.record;
        let Some(aur) = config
            .app(record.slug.as_str())
            .and_then(|a| a.aur.as_ref())
        else {
            continue;
        };
        let package_dir = root.join(&aur.package_name);
        if !package_dir.join("PKGBUILD").is_file() {
            continue;
        }
        match pusher
            .push(&package_dir, &aur.package_name, record.version.as_str())
            .await
        {
            Ok(true) => summary.pushed += 1,
            Ok(false) => {}
            Err(err) => {
                error!(package = %aur.package_name, error = %err, "AUR push failed");
                failures.push(format!("{}: {err}", aur.package_name));
            }
        }
    }

    if !failures.is_empty() {
        summary.error = Some(failures.join("; "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(targets: Vec<TargetSummary>, synced: usize, failed: usize) -> SyncSummary {
        SyncSummary {
            generated_at: Utc::now().to_rfc3339(),
            apps_synced: synced,
            apps_failed: failed,
            targets,
            deadline_exceeded: false,
        }
    }

    fn target_summary(status: TargetStatus) -> TargetSummary {
        TargetSummary {
            target: Target::Altstore,
            status,
            changed: 1,
            rendered: 1,
            written: 1,
            removed: 0,
            skipped: Vec::new(),
            pushed: 0,
            error: None,
        }
    }

    #[test]
    fn clean_cycle_exits_zero() {
        let s = summary(vec![target_summary(TargetStatus::Published)], 2, 0);
        assert_eq!(s.exit_code(), 0);
    }

    #[test]
    fn partial_app_failure_still_exits_zero() {
        let s = summary(vec![target_summary(TargetStatus::Published)], 1, 1);
        assert_eq!(s.exit_code(), 0);
    }

    #[test]
    fn total_fetch_failure_exits_nonzero() {
        let s = summary(vec![], 0, 3);
        assert_eq!(s.exit_code(), 1);
    }

    #[test]
    fn failed_target_exits_nonzero() {
        let s = summary(
            vec![
                target_summary(TargetStatus::Published),
                target_summary(TargetStatus::Failed),
            ],
            2,
            0,
        );
        assert_eq!(s.exit_code(), 1);
    }

    #[test]
    fn published_target_with_no_surviving_apps_exits_nonzero() {
        let mut starved = target_summary(TargetStatus::Published);
        starved.changed = 2;
        starved.rendered = 0;
        let s = summary(vec![starved], 2, 0);
        assert_eq!(s.exit_code(), 1);
    }

    #[test]
    fn deadline_exit_code_is_distinct() {
        let mut s = summary(vec![], 0, 0);
        s.deadline_exceeded = true;
        assert_eq!(s.exit_code(), 2);
    }
}
