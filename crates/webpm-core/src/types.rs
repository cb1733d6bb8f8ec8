//! Orchestrator result and event types (spec §3 `ExtractedPackage`/
//! `FetchedTree`, §4.10 event channel).

use std::sync::Arc;
use webpm_logger::Phase;
use webpm_manifest::PackageJson;
use webpm_resolver::DependencyNode;
use webpm_tar::ExtractedFile;

/// One resolved package's materialized contents. `manifest` is the
/// `package.json` read back out of the tarball, kept distinct from the
/// registry-supplied `node.name`/`node.version` per the mismatch invariant
/// (spec §3 `ExtractedPackage`: warn and keep node values on mismatch).
#[derive(Debug, Clone)]
pub struct ExtractedPackage {
    pub node: Arc<DependencyNode>,
    pub files: Vec<ExtractedFile>,
    pub manifest: PackageJson,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub resolution_ms: u64,
    pub fetching_ms: u64,
    pub extraction_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone)]
pub struct FetchedTree {
    pub root: Arc<DependencyNode>,
    pub all_packages: Vec<ExtractedPackage>,
    pub total_files: usize,
    pub timings: Timings,
}

/// A progress/completion/error notification, emitted onto the caller's
/// `InstallOptions::events` channel in place of direct logger calls.
#[derive(Debug, Clone)]
pub enum Event {
    Progress { phase: Phase, package_id: String, bytes_done: Option<u64>, bytes_total: Option<u64> },
    PackageComplete(ExtractedPackage),
    Complete(FetchedTree),
    Error(webpm_error::WebpmError),
}
