//! Resolver (spec §4.8): builds a `DependencyNode` DAG from a root
//! [`Specifier`], memoizing by `ResolutionId` and recursing with a
//! per-path cycle guard, grounded in
//! `pacm_resolver::resolver::DependencyResolver::resolve_full_tree_async`'s
//! "clone `seen` per child task" recursion shape.

use futures::future::{join_all, BoxFuture};
use indexmap::IndexMap;
use std::collections::HashMap as StdHashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use webpm_constants::{DEFAULT_MAX_DEPTH, DEFAULT_REGISTRY, DEFAULT_TAG};
use webpm_error::{Result, WebpmError};
use webpm_logger::get_logger;
use webpm_registry::{RegistryClient, VersionMeta};
use webpm_specifier::Specifier;

use crate::dependency_node::{resolution_id, ChildNode, DependencyEdge, DependencyNode, ResolutionId};
use crate::version_picker::{pick_version, PickOptions};

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub registry_base: String,
    pub default_tag: String,
    pub include_optional_dependencies: bool,
    pub include_peer_dependencies: bool,
    pub auto_install_peers: bool,
    pub max_depth: u16,
    pub pick_options: PickOptions,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            registry_base: DEFAULT_REGISTRY.to_string(),
            default_tag: DEFAULT_TAG.to_string(),
            include_optional_dependencies: true,
            include_peer_dependencies: true,
            auto_install_peers: false,
            max_depth: DEFAULT_MAX_DEPTH,
            pick_options: PickOptions::default(),
        }
    }
}

/// Shared, cross-call memoization table keyed by `ResolutionId` (spec §4.8
/// step 2 / §5 "Shared resources"). `Resolving` is represented by an
/// in-flight `OnceCell` that concurrent callers await instead of re-fetching.
pub struct ResolverState {
    registry: Arc<RegistryClient>,
    resolved: Mutex<StdHashMap<ResolutionId, Arc<OnceCell<Arc<DependencyNode>>>>>,
}

impl ResolverState {
    #[must_use]
    pub fn new(registry: Arc<RegistryClient>) -> Self {
        Self { registry, resolved: Mutex::new(StdHashMap::new()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Required,
    Optional,
}

/// A resolved package's own `devDependencies` are never consulted here —
/// only the manifest being installed has its dev dependencies honored, and
/// only when `install_from_manifest` is asked to (spec §4.8 step 3).
struct DependencyDeclarations<'a> {
    dependencies: &'a IndexMap<String, String>,
    peer_dependencies: &'a IndexMap<String, String>,
    optional_dependencies: &'a IndexMap<String, String>,
}

impl<'a> From<&'a VersionMeta> for DependencyDeclarations<'a> {
    fn from(vm: &'a VersionMeta) -> Self {
        Self {
            dependencies: &vm.dependencies,
            peer_dependencies: &vm.peer_dependencies,
            optional_dependencies: &vm.optional_dependencies,
        }
    }
}

/// Either a freshly-built (or memoized) node, or a back-edge onto an
/// in-progress ancestor — not an error, just the cycle-handling outcome
/// spec §4.8 step 4 describes.
enum ResolveOutcome {
    Node(Arc<DependencyNode>),
    CyclicBackref(ResolutionId),
}

pub async fn resolve_tree(
    root: Specifier,
    state: Arc<ResolverState>,
    options: Arc<ResolveOptions>,
) -> Result<Arc<DependencyNode>> {
    match resolve_node(root, state, options, Arc::new(HashSet::new()), 0).await? {
        ResolveOutcome::Node(node) => Ok(node),
        ResolveOutcome::CyclicBackref(id) => Err(WebpmError::CyclicOptional(id)),
    }
}

fn resolve_node(
    specifier: Specifier,
    state: Arc<ResolverState>,
    options: Arc<ResolveOptions>,
    parent_ids: Arc<HashSet<ResolutionId>>,
    depth: u16,
) -> BoxFuture<'static, Result<ResolveOutcome>> {
    Box::pin(async move {
        let name = specifier.name().to_string();
        let meta = state.registry.get_package_meta(&name).await?;
        let (version, version_meta) = pick_version(&meta, &specifier, &options.pick_options)?;
        let id = resolution_id(&options.registry_base, &name, &version);

        if parent_ids.contains(&id) {
            return Ok(ResolveOutcome::CyclicBackref(id));
        }

        let cell = {
            let mut resolved = state.resolved.lock().await;
            resolved.entry(id.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        if let Some(existing) = cell.get() {
            return Ok(ResolveOutcome::Node(existing.clone()));
        }

        if depth > options.max_depth {
            return Err(WebpmError::MaxDepthExceeded(name, options.max_depth));
        }

        let mut next_parent_ids = (*parent_ids).clone();
        next_parent_ids.insert(id.clone());
        let next_parent_ids = Arc::new(next_parent_ids);

        let node = cell
            .get_or_try_init(|| {
                build_node(name.clone(), version, version_meta, state.clone(), options, next_parent_ids, depth)
            })
            .await?
            .clone();

        Ok(ResolveOutcome::Node(node))
    })
}

async fn build_node(
    name: String,
    version: String,
    version_meta: VersionMeta,
    state: Arc<ResolverState>,
    options: Arc<ResolveOptions>,
    parent_ids: Arc<HashSet<ResolutionId>>,
    depth: u16,
) -> Result<Arc<DependencyNode>> {
    let mut node = DependencyNode::from_version_meta(&options.registry_base, name, version, &version_meta);
    let declarations = DependencyDeclarations::from(&version_meta);

    let mut edges = resolve_category(
        declarations.dependencies,
        Category::Required,
        &state,
        &options,
        &parent_ids,
        depth + 1,
    )
    .await?;

    if options.include_optional_dependencies {
        edges.extend(
            resolve_category(
                declarations.optional_dependencies,
                Category::Optional,
                &state,
                &options,
                &parent_ids,
                depth + 1,
            )
            .await?,
        );
    }

    if options.include_peer_dependencies {
        if options.auto_install_peers {
            edges.extend(
                resolve_category(
                    declarations.peer_dependencies,
                    Category::Required,
                    &state,
                    &options,
                    &parent_ids,
                    depth + 1,
                )
                .await?,
            );
        } else {
            for (alias, range) in declarations.peer_dependencies {
                edges.push(DependencyEdge {
                    alias: alias.clone(),
                    child: ChildNode::PeerRecorded {
                        alias: alias.clone(),
                        range: range.clone(),
                        optional: version_meta.is_peer_optional(alias),
                    },
                });
            }
        }
    }

    node.dependencies = edges;
    Ok(Arc::new(node))
}

async fn resolve_category(
    deps: &IndexMap<String, String>,
    category: Category,
    state: &Arc<ResolverState>,
    options: &Arc<ResolveOptions>,
    parent_ids: &Arc<HashSet<ResolutionId>>,
    depth: u16,
) -> Result<Vec<DependencyEdge>> {
    let futures = deps.iter().map(|(alias, bare_spec)| {
        let alias = alias.clone();
        let specifier =
            webpm_specifier::normalize(&alias, bare_spec, &options.default_tag, &options.registry_base);
        resolve_child(alias, specifier, category, state.clone(), options.clone(), parent_ids.clone(), depth)
    });

    join_all(futures).await.into_iter().collect()
}

async fn resolve_child(
    alias: String,
    specifier: Specifier,
    category: Category,
    state: Arc<ResolverState>,
    options: Arc<ResolveOptions>,
    parent_ids: Arc<HashSet<ResolutionId>>,
    depth: u16,
) -> Result<DependencyEdge> {
    match resolve_node(specifier, state, options, parent_ids, depth).await {
        Ok(ResolveOutcome::Node(node)) => Ok(DependencyEdge { alias, child: ChildNode::Resolved(node) }),
        Ok(ResolveOutcome::CyclicBackref(id)) => {
            Ok(DependencyEdge { alias, child: ChildNode::CyclicBackref(id) })
        }
        Err(e) if category == Category::Optional => {
            get_logger().warn(&format!("skipping optional dependency '{alias}': {e}"));
            Ok(DependencyEdge {
                alias: alias.clone(),
                child: ChildNode::OptionalSkipped { alias, reason: e.to_string() },
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webpm_registry::{RegistryClient, RegistryClientOptions};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options_for(registry_base: String) -> Arc<ResolveOptions> {
        Arc::new(ResolveOptions { registry_base, ..ResolveOptions::default() })
    }

    async fn mock_package(server: &MockServer, name: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn version_entry(name: &str, version: &str, deps: serde_json::Value) -> serde_json::Value {
        json!({
            "name": name,
            "version": version,
            "dependencies": deps,
            "dist": { "tarball": format!("https://registry.example/{name}/-/{name}-{version}.tgz") },
        })
    }

    fn client_for(server: &MockServer) -> Arc<RegistryClient> {
        Arc::new(RegistryClient::new(RegistryClientOptions {
            base_url: server.uri(),
            ..RegistryClientOptions::default()
        }))
    }

    #[tokio::test]
    async fn resolves_a_single_leaf_package() {
        let server = MockServer::start().await;
        mock_package(
            &server,
            "leaf",
            json!({
                "name": "leaf",
                "dist-tags": { "latest": "1.0.0" },
                "versions": { "1.0.0": version_entry("leaf", "1.0.0", json!({})) },
            }),
        )
        .await;

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = options_for(server.uri());
        let root = Specifier::Tag { name: "leaf".to_string(), tag: "latest".to_string() };

        let node = resolve_tree(root, state, options).await.unwrap();
        assert_eq!(node.version, "1.0.0");
        assert!(node.dependencies.is_empty());
    }

    #[tokio::test]
    async fn resolves_transitive_dependency_chain() {
        let server = MockServer::start().await;
        mock_package(
            &server,
            "top",
            json!({
                "name": "top",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": version_entry("top", "1.0.0", json!({ "mid": "^1.0.0" })),
                },
            }),
        )
        .await;
        mock_package(
            &server,
            "mid",
            json!({
                "name": "mid",
                "dist-tags": { "latest": "1.0.0" },
                "versions": { "1.0.0": version_entry("mid", "1.0.0", json!({})) },
            }),
        )
        .await;

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = options_for(server.uri());
        let root = Specifier::Tag { name: "top".to_string(), tag: "latest".to_string() };

        let node = resolve_tree(root, state, options).await.unwrap();
        assert_eq!(node.dependencies.len(), 1);
        match &node.dependencies[0].child {
            ChildNode::Resolved(child) => {
                assert_eq!(child.name, "mid");
                assert_eq!(child.version, "1.0.0");
            }
            other => panic!("expected resolved child, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cyclic_dependency_becomes_a_backref_not_an_error() {
        let server = MockServer::start().await;
        mock_package(
            &server,
            "a",
            json!({
                "name": "a",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": version_entry("a", "1.0.0", json!({ "b": "^1.0.0" })),
                },
            }),
        )
        .await;
        mock_package(
            &server,
            "b",
            json!({
                "name": "b",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": version_entry("b", "1.0.0", json!({ "a": "^1.0.0" })),
                },
            }),
        )
        .await;

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = options_for(server.uri());
        let root = Specifier::Tag { name: "a".to_string(), tag: "latest".to_string() };

        let node = resolve_tree(root, state, options).await.unwrap();
        let expected_a_id = resolution_id(&server.uri(), "a", "1.0.0");
        let b_edge = &node.dependencies[0];
        match &b_edge.child {
            ChildNode::Resolved(b_node) => {
                assert_eq!(b_node.name, "b");
                assert_eq!(b_node.dependencies.len(), 1);
                assert!(matches!(
                    b_node.dependencies[0].child,
                    ChildNode::CyclicBackref(ref id) if *id == expected_a_id
                ));
            }
            other => panic!("expected resolved child, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_optional_dependency_is_skipped_not_fatal() {
        let server = MockServer::start().await;
        mock_package(
            &server,
            "top",
            json!({
                "name": "top",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": {
                        "name": "top",
                        "version": "1.0.0",
                        "optionalDependencies": { "missing": "^1.0.0" },
                        "dist": { "tarball": "https://registry.example/top/-/top-1.0.0.tgz" },
                    },
                },
            }),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = options_for(server.uri());
        let root = Specifier::Tag { name: "top".to_string(), tag: "latest".to_string() };

        let node = resolve_tree(root, state, options).await.unwrap();
        assert_eq!(node.dependencies.len(), 1);
        assert!(matches!(node.dependencies[0].child, ChildNode::OptionalSkipped { .. }));
    }

    #[tokio::test]
    async fn peer_dependency_is_recorded_not_resolved_by_default() {
        let server = MockServer::start().await;
        mock_package(
            &server,
            "top",
            json!({
                "name": "top",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": {
                        "name": "top",
                        "version": "1.0.0",
                        "peerDependencies": { "react": "^18.0.0" },
                        "dist": { "tarball": "https://registry.example/top/-/top-1.0.0.tgz" },
                    },
                },
            }),
        )
        .await;

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = options_for(server.uri());
        let root = Specifier::Tag { name: "top".to_string(), tag: "latest".to_string() };

        let node = resolve_tree(root, state, options).await.unwrap();
        assert_eq!(node.dependencies.len(), 1);
        assert!(matches!(
            &node.dependencies[0].child,
            ChildNode::PeerRecorded { range, optional: false, .. } if range == "^18.0.0"
        ));
    }

    #[tokio::test]
    async fn peer_dependencies_meta_marks_a_recorded_peer_optional() {
        let server = MockServer::start().await;
        mock_package(
            &server,
            "top",
            json!({
                "name": "top",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": {
                        "name": "top",
                        "version": "1.0.0",
                        "peerDependencies": { "react-dom": "^18.0.0" },
                        "peerDependenciesMeta": { "react-dom": { "optional": true } },
                        "dist": { "tarball": "https://registry.example/top/-/top-1.0.0.tgz" },
                    },
                },
            }),
        )
        .await;

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = options_for(server.uri());
        let root = Specifier::Tag { name: "top".to_string(), tag: "latest".to_string() };

        let node = resolve_tree(root, state, options).await.unwrap();
        assert_eq!(node.dependencies.len(), 1);
        assert!(matches!(
            &node.dependencies[0].child,
            ChildNode::PeerRecorded { optional: true, .. }
        ));
    }

    #[tokio::test]
    async fn a_resolved_package_s_own_dev_dependencies_are_never_pulled_in() {
        let server = MockServer::start().await;
        mock_package(
            &server,
            "top",
            json!({
                "name": "top",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": {
                        "name": "top",
                        "version": "1.0.0",
                        "devDependencies": { "tester": "^1.0.0" },
                        "dependencies": { "mid": "^1.0.0" },
                        "dist": { "tarball": "https://registry.example/top/-/top-1.0.0.tgz" },
                    },
                },
            }),
        )
        .await;
        mock_package(
            &server,
            "mid",
            json!({
                "name": "mid",
                "dist-tags": { "latest": "1.0.0" },
                "versions": {
                    "1.0.0": version_entry("mid", "1.0.0", json!({})),
                },
            }),
        )
        .await;

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = options_for(server.uri());
        let root = Specifier::Tag { name: "top".to_string(), tag: "latest".to_string() };

        let node = resolve_tree(root, state, options).await.unwrap();
        assert_eq!(node.dependencies.len(), 1);
        match &node.dependencies[0].child {
            ChildNode::Resolved(mid) => {
                assert_eq!(mid.name, "mid");
                assert!(mid.dependencies.is_empty());
            }
            other => panic!("expected resolved child, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn max_depth_exceeded_on_a_fresh_deep_chain() {
        let server = MockServer::start().await;
        for i in 0..3 {
            let name = format!("pkg{i}");
            let next = format!("pkg{}", i + 1);
            mock_package(
                &server,
                &name,
                json!({
                    "name": name,
                    "dist-tags": { "latest": "1.0.0" },
                    "versions": {
                        "1.0.0": version_entry(&name, "1.0.0", json!({ next.clone(): "^1.0.0" })),
                    },
                }),
            )
            .await;
        }

        let state = Arc::new(ResolverState::new(client_for(&server)));
        let options = Arc::new(ResolveOptions {
            registry_base: server.uri(),
            max_depth: 1,
            ..ResolveOptions::default()
        });
        let root = Specifier::Tag { name: "pkg0".to_string(), tag: "latest".to_string() };

        let err = resolve_tree(root, state, options).await.unwrap_err();
        assert!(matches!(err, WebpmError::MaxDepthExceeded(_, _)));
    }
}
