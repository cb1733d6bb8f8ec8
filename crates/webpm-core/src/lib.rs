//! Orchestrator (spec §4.10): wires specifier parsing, resolution, and the
//! fetch/verify/extract/store pipeline behind a single `install` entry
//! point, grounded in `pacm_core::commands::install`'s "resolve once, fetch
//! the whole tree, report a summary" shape.

pub mod cancellation;
pub mod options;
pub mod pipeline;
pub mod types;

pub use cancellation::CancellationToken;
pub use options::InstallOptions;
pub use types::{Event, ExtractedPackage, FetchedTree, Timings};

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use webpm_error::Result;
use webpm_manifest::{DependencyCategory, PackageJson};
use webpm_registry::{RegistryClient, RegistryClientOptions, VersionMeta};
use webpm_resolver::{resolve_tree as resolver_resolve_tree, DependencyNode, PickOptions, ResolveOptions, ResolverState};
use webpm_specifier::Specifier;
use webpm_store::ContentStore;

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn split_name_and_selector(input: &str) -> (String, Option<String>) {
    match input.rfind('@') {
        Some(i) if i >= 1 => (input[..i].to_string(), Some(input[i + 1..].to_string())),
        _ => (input.to_string(), None),
    }
}

/// Parses the `install`/`resolveTree`/`getPackageInfo` entry-point string
/// into a `Specifier`. `opts.version` (spec §8 scenario A) overrides
/// whatever selector `input` carries.
fn root_specifier(input: &str, opts: &InstallOptions) -> Specifier {
    if let Some(version) = &opts.version {
        let (name, _) = split_name_and_selector(input);
        let formatted = format!("npm:{name}@{version}");
        if let Some(spec) = webpm_specifier::parse(&formatted, None, opts.default_tag(), &opts.registry) {
            return spec;
        }
    }
    webpm_specifier::parse(input, None, opts.default_tag(), &opts.registry).unwrap_or_else(|| {
        let (name, _) = split_name_and_selector(input);
        Specifier::Tag { name, tag: opts.default_tag().to_string() }
    })
}

fn build_registry_client(opts: &InstallOptions) -> Arc<RegistryClient> {
    Arc::new(RegistryClient::new(RegistryClientOptions {
        base_url: opts.registry.clone(),
        token: opts.token.clone(),
        max_retries: opts.retries,
        timeout: std::time::Duration::from_millis(opts.timeout_ms),
        requests_per_minute: opts.requests_per_minute,
        burst_limit: opts.burst_limit,
        persistent_cache: opts.effective_persistent_cache(),
        prefer_offline: opts.prefer_offline,
        ..RegistryClientOptions::default()
    }))
}

fn build_resolve_options(opts: &InstallOptions) -> Arc<ResolveOptions> {
    Arc::new(ResolveOptions {
        registry_base: opts.registry.clone(),
        default_tag: opts.default_tag().to_string(),
        include_optional_dependencies: opts.include_optional,
        include_peer_dependencies: opts.include_peer,
        auto_install_peers: opts.auto_install_peers,
        max_depth: opts.max_depth,
        pick_options: PickOptions {
            published_by: opts.published_by.clone(),
            allow_deprecated: opts.allow_deprecated,
            preferred_version_selectors: opts.preferred_versions.clone(),
            pick_lowest_version: false,
        },
    })
}

/// Bundles the state one resolution root needs; shared across every root of
/// `install_from_manifest` so transitive dependencies common to more than
/// one direct dependency are fetched and stored exactly once (spec §8
/// scenario C, property 4 "no duplicate downloads").
struct Shared {
    registry: Arc<RegistryClient>,
    resolver_state: Arc<ResolverState>,
    resolve_options: Arc<ResolveOptions>,
    store: Arc<ContentStore>,
}

impl Shared {
    fn new(opts: &InstallOptions) -> Self {
        let registry = build_registry_client(opts);
        Self {
            resolver_state: Arc::new(ResolverState::new(registry.clone())),
            resolve_options: build_resolve_options(opts),
            registry,
            store: Arc::new(ContentStore::default()),
        }
    }

    async fn fetch(&self, root: Specifier, opts: &InstallOptions) -> Result<FetchedTree> {
        let total_start = Instant::now();

        let resolution_start = Instant::now();
        let root_node = resolver_resolve_tree(root, self.resolver_state.clone(), self.resolve_options.clone()).await?;
        let resolution_ms = elapsed_ms(resolution_start);

        let nodes = pipeline::collect_unique(&root_node);
        let cancellation = opts.cancellation.clone().unwrap_or_default();

        let outcome = pipeline::run(
            nodes,
            self.registry.clone(),
            self.store.clone(),
            opts.max_concurrent,
            cancellation,
            opts.events.clone(),
        )
        .await?;

        let total_files: usize = outcome.packages.iter().map(|p| p.files.len()).sum();
        let tree = FetchedTree {
            root: root_node,
            all_packages: outcome.packages,
            total_files,
            timings: Timings {
                resolution_ms,
                fetching_ms: outcome.fetching_ms,
                extraction_ms: outcome.extraction_ms,
                total_ms: elapsed_ms(total_start),
            },
        };

        if let Some(events) = &opts.events {
            let _ = events.send(Event::Complete(tree.clone()));
        }

        Ok(tree)
    }
}

/// Resolves and materializes a single package and its full dependency tree
/// (spec §4.10, §8 scenarios A/B/D).
pub async fn install(specifier: &str, opts: InstallOptions) -> Result<FetchedTree> {
    let root = root_specifier(specifier, &opts);
    let shared = Shared::new(&opts);
    let result = shared.fetch(root, &opts).await;
    if let (Err(err), Some(events)) = (&result, &opts.events) {
        let _ = events.send(Event::Error(err.clone()));
    }
    result
}

/// Resolves and materializes every direct dependency declared in `manifest`
/// (spec §8 scenario C), sharing the registry cache and resolver
/// memoization table across roots.
pub async fn install_from_manifest(manifest: &PackageJson, opts: InstallOptions) -> Result<Vec<FetchedTree>> {
    let shared = Arc::new(Shared::new(&opts));

    let mut categories = vec![DependencyCategory::Dependencies];
    if opts.include_dev {
        categories.push(DependencyCategory::DevDependencies);
    }

    let roots: Vec<Specifier> = categories
        .into_iter()
        .flat_map(|category| {
            manifest
                .dependencies_in(category)
                .iter()
                .map(|(alias, bare_specifier)| {
                    webpm_specifier::normalize(alias, bare_specifier, opts.default_tag(), &opts.registry)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let tasks = roots.into_iter().map(|root| {
        let shared = shared.clone();
        let opts = opts.clone();
        async move { shared.fetch(root, &opts).await }
    });

    let results = join_all(tasks).await;
    let mut trees = Vec::with_capacity(results.len());
    for result in results {
        trees.push(result?);
    }
    Ok(trees)
}

/// Resolves `specifier` into a dependency DAG without fetching or extracting
/// any tarball (spec §4.10 "resolution only").
pub async fn resolve_tree(specifier: &str, opts: InstallOptions) -> Result<Arc<DependencyNode>> {
    let root = root_specifier(specifier, &opts);
    let registry = build_registry_client(&opts);
    let resolver_state = Arc::new(ResolverState::new(registry));
    let resolve_options = build_resolve_options(&opts);
    resolver_resolve_tree(root, resolver_state, resolve_options).await
}

/// Fetches registry metadata for `name` and picks the version `opts`
/// selects, without resolving its dependency tree (spec §4.10
/// "introspection only").
pub async fn get_package_info(name: &str, opts: &InstallOptions) -> Result<VersionMeta> {
    let specifier = root_specifier(name, opts);
    let registry = build_registry_client(opts);
    let meta = registry.get_package_meta(specifier.name()).await?;
    let resolve_options = build_resolve_options(opts);
    let (_version, version_meta) = webpm_resolver::pick_version(&meta, &specifier, &resolve_options.pick_options)?;
    Ok(version_meta)
}

/// Delegates to the specifier crate's package-name validator (spec §4.1).
#[must_use]
pub fn validate_package_name(name: &str) -> bool {
    webpm_specifier::validate_package_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;
    use tar::{Builder, Header};
    use tokio::sync::mpsc::unbounded_channel;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn build_tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            for (file_path, data) in entries {
                let mut header = Header::new_gnu();
                header.set_path(format!("package/{file_path}")).unwrap();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, *data).unwrap();
            }
            builder.finish().unwrap();
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    async fn mock_registry(server: &MockServer, name: &str, version: &str, deps: serde_json::Value, tarball: &[u8]) {
        let tarball_path = format!("/-/{name}-{version}.tgz");
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": name,
                "dist-tags": { "latest": version },
                "versions": {
                    version: {
                        "name": name,
                        "version": version,
                        "dependencies": deps,
                        "dist": { "tarball": format!("{}{tarball_path}", server.uri()) },
                    }
                },
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path(tarball_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball.to_vec()))
            .mount(server)
            .await;
    }

    fn opts_for(server: &MockServer) -> InstallOptions {
        InstallOptions { registry: server.uri(), max_concurrent: 4, ..InstallOptions::default() }
    }

    #[tokio::test]
    async fn installs_a_single_leaf_package() {
        let server = MockServer::start().await;
        let tarball = build_tarball(&[
            ("index.js", b"module.exports = 1;"),
            ("package.json", br#"{"name":"leaf","version":"1.0.0"}"#),
        ]);
        mock_registry(&server, "leaf", "1.0.0", json!({}), &tarball).await;

        let tree = install("leaf", opts_for(&server)).await.unwrap();
        assert_eq!(tree.root.version, "1.0.0");
        assert_eq!(tree.all_packages.len(), 1);
        assert_eq!(tree.total_files, 2);
        assert_eq!(tree.all_packages[0].manifest.name.as_deref(), Some("leaf"));
    }

    #[tokio::test]
    async fn installs_a_transitive_dependency_without_refetching_shared_packages() {
        let server = MockServer::start().await;
        let shared_tarball = build_tarball(&[("index.js", b"1")]);
        let top_tarball = build_tarball(&[("index.js", b"require('shared')")]);
        mock_registry(&server, "shared", "1.0.0", json!({}), &shared_tarball).await;
        mock_registry(&server, "top", "1.0.0", json!({ "shared": "^1.0.0" }), &top_tarball).await;

        let tree = install("top", opts_for(&server)).await.unwrap();
        assert_eq!(tree.all_packages.len(), 2);
        assert_eq!(tree.root.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn install_from_manifest_shares_state_across_roots() {
        let server = MockServer::start().await;
        let shared_tarball = build_tarball(&[("index.js", b"1")]);
        let react_tarball = build_tarball(&[("index.js", b"require('shared')")]);
        let ts_tarball = build_tarball(&[("index.js", b"require('shared')")]);
        mock_registry(&server, "shared", "1.0.0", json!({}), &shared_tarball).await;
        mock_registry(&server, "react", "1.0.0", json!({ "shared": "^1.0.0" }), &react_tarball).await;
        mock_registry(&server, "typescript", "1.0.0", json!({ "shared": "^1.0.0" }), &ts_tarball).await;

        let manifest = PackageJson::parse(
            r#"{"dependencies": {"react": "^1.0.0", "typescript": "^1.0.0"}}"#,
        )
        .unwrap();

        let trees = install_from_manifest(&manifest, opts_for(&server)).await.unwrap();
        assert_eq!(trees.len(), 2);
        for tree in &trees {
            assert_eq!(tree.all_packages.len(), 2);
        }
    }

    #[tokio::test]
    async fn resolve_tree_reports_a_cycle_without_fetching_tarballs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "a",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": {
                        "name": "a", "version": "1.0.0",
                        "dependencies": { "b": "^1.0.0" },
                        "dist": { "tarball": format!("{}/a.tgz", server.uri()) },
                    }
                },
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "b",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": {
                        "name": "b", "version": "1.0.0",
                        "dependencies": { "a": "^1.0.0" },
                        "dist": { "tarball": format!("{}/b.tgz", server.uri()) },
                    }
                },
            })))
            .mount(&server)
            .await;

        let node = resolve_tree("a", opts_for(&server)).await.unwrap();
        assert_eq!(node.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_pipeline_before_completion() {
        let server = MockServer::start().await;
        let tarball = build_tarball(&[("index.js", b"1")]);
        mock_registry(&server, "leaf", "1.0.0", json!({}), &tarball).await;

        let token = CancellationToken::new();
        token.cancel();
        let mut opts = opts_for(&server);
        opts.cancellation = Some(token);

        let result = install("leaf", opts).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn events_report_progress_and_completion() {
        let server = MockServer::start().await;
        let tarball = build_tarball(&[("index.js", b"1")]);
        mock_registry(&server, "leaf", "1.0.0", json!({}), &tarball).await;

        let (tx, mut rx) = unbounded_channel();
        let mut opts = opts_for(&server);
        opts.events = Some(tx);

        install("leaf", opts).await.unwrap();

        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::Complete(_)) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }

    #[test]
    fn validates_package_names() {
        assert!(validate_package_name("lodash"));
        assert!(validate_package_name("@types/node"));
        assert!(!validate_package_name("Not Valid"));
    }
}
