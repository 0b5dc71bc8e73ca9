//! # Cache Invalidation Module
//!
//! Removal of cached entries by exact key, by key prefix, or wholesale, plus
//! the dependency table that decides which keys a mutation of one resource
//! kind affects.
//!
//! Invalidation never cancels an in-flight fetch. Instead the request is marked
//! superseded and its result is not written back when it settles, so a
//! just-invalidated key cannot be silently repopulated with outdated data.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use super::state::{CacheEvent, InFlightRequest, SharedState};

/// Resource kinds served by the storefront API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Tours,
    Users,
    Bookings,
    Reviews,
    Dashboard,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Tours,
        ResourceKind::Users,
        ResourceKind::Bookings,
        ResourceKind::Reviews,
        ResourceKind::Dashboard,
    ];

    /// First segment of every cache key for this kind
    pub fn key_root(&self) -> &'static str {
        match self {
            Self::Tours => "tours",
            Self::Users => "users",
            Self::Bookings => "bookings",
            Self::Reviews => "reviews",
            Self::Dashboard => "dashboard",
        }
    }

    /// REST collection path relative to the API base URL
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Tours => "tours",
            Self::Users => "users",
            Self::Bookings => "bookings",
            Self::Reviews => "reviews",
            Self::Dashboard => "admin/stats",
        }
    }

    /// `<kind>/all`
    pub fn list_key(&self) -> String {
        format!("{}/all", self.key_root())
    }

    /// `<kind>/<id>`
    pub fn item_key(&self, id: &str) -> String {
        format!("{}/{}", self.key_root(), id)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_root())
    }
}

/// What happened to the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

/// A completed mutation, described by the identifiers its fan-out needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: ResourceKind,
    pub action: MutationAction,
    pub id: Option<String>,
    /// Related identifiers, e.g. `tour_id`, `user_id`
    pub refs: BTreeMap<String, String>,
}

impl Mutation {
    pub fn new(kind: ResourceKind, action: MutationAction) -> Self {
        Self {
            kind,
            action,
            id: None,
            refs: BTreeMap::new(),
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_ref<K: Into<String>, S: Into<String>>(mut self, name: K, value: S) -> Self {
        self.refs.insert(name.into(), value.into());
        self
    }

    /// Value for a `{placeholder}`; `id` is the mutated resource's own id
    pub fn lookup(&self, name: &str) -> Option<&str> {
        if name == "id" {
            self.id.as_deref()
        } else {
            self.refs.get(name).map(String::as_str)
        }
    }
}

/// A concrete removal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum InvalidationTarget {
    Key(String),
    Prefix(String),
}

/// Key template with `{placeholder}` segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(String),
    Prefix(String),
}

impl KeyPattern {
    pub fn exact<S: Into<String>>(template: S) -> Self {
        Self::Exact(template.into())
    }

    pub fn prefix<S: Into<String>>(template: S) -> Self {
        Self::Prefix(template.into())
    }

    /// `None` when a placeholder has no value in the mutation
    pub fn resolve(&self, mutation: &Mutation) -> Option<InvalidationTarget> {
        match self {
            Self::Exact(template) => fill_template(template, mutation).map(InvalidationTarget::Key),
            Self::Prefix(template) => fill_template(template, mutation).map(InvalidationTarget::Prefix),
        }
    }
}

fn fill_template(template: &str, mutation: &Mutation) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let end = rest[start..].find('}')? + start;
        out.push_str(&rest[..start]);
        let value = mutation.lookup(&rest[start + 1..end])?;
        if value.is_empty() {
            return None;
        }
        out.push_str(value);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Resource kind → keys derived from it
#[derive(Debug, Clone)]
pub struct DependencyTable {
    rules: HashMap<ResourceKind, Vec<KeyPattern>>,
}

impl DependencyTable {
    /// A table with no rules
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add a pattern for `kind`
    pub fn with(mut self, kind: ResourceKind, pattern: KeyPattern) -> Self {
        self.rules.entry(kind).or_default().push(pattern);
        self
    }

    pub fn patterns(&self, kind: ResourceKind) -> &[KeyPattern] {
        self.rules.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets for a mutation, in table order without duplicates
    pub fn resolve(&self, mutation: &Mutation) -> Vec<InvalidationTarget> {
        let mut targets = Vec::new();
        for pattern in self.patterns(mutation.kind) {
            if let Some(target) = pattern.resolve(mutation) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }
}

impl Default for DependencyTable {
    fn default() -> Self {
        use KeyPattern as P;
        use ResourceKind::*;

        Self::empty()
            .with(Tours, P::exact("tours/{id}"))
            .with(Tours, P::prefix("tours"))
            .with(Tours, P::exact("dashboard"))
            .with(Users, P::exact("users/{id}"))
            .with(Users, P::prefix("users"))
            .with(Users, P::exact("dashboard"))
            .with(Bookings, P::exact("bookings/{id}"))
            .with(Bookings, P::prefix("bookings"))
            .with(Bookings, P::exact("dashboard"))
            .with(Bookings, P::exact("tours/{tour_id}"))
            .with(Bookings, P::exact("users/{user_id}"))
            .with(Reviews, P::exact("reviews/{id}"))
            .with(Reviews, P::prefix("reviews"))
            .with(Reviews, P::exact("tours/{tour_id}"))
            .with(Reviews, P::exact("dashboard"))
    }
}

/// Outcome of an invalidation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    /// Cached keys that were removed
    pub removed: Vec<String>,

    /// In-flight requests whose results will be discarded
    pub superseded: usize,

    /// True for a full reset
    pub cleared: bool,
}

impl InvalidationReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Cache invalidation engine
pub struct InvalidationEngine<V> {
    state: Arc<SharedState<V>>,
    table: Arc<DependencyTable>,
}

impl<V> Clone for InvalidationEngine<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            table: Arc::clone(&self.table),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> InvalidationEngine<V> {
    pub fn new(state: Arc<SharedState<V>>, table: DependencyTable) -> Self {
        Self {
            state,
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &DependencyTable {
        &self.table
    }

    /// - neither argument: clear everything
    /// - `key`: remove that exact entry
    /// - `prefix`: remove every entry starting with it
    /// - both: both removals
    pub fn invalidate(&self, key: Option<&str>, prefix: Option<&str>) -> InvalidationReport {
        match (key, prefix) {
            (None, None) => self.invalidate_all(),
            _ => {
                let mut targets = Vec::with_capacity(2);
                if let Some(key) = key {
                    targets.push(InvalidationTarget::Key(key.to_string()));
                }
                if let Some(prefix) = prefix {
                    targets.push(InvalidationTarget::Prefix(prefix.to_string()));
                }
                self.invalidate_targets(&targets)
            }
        }
    }

    pub fn invalidate_key(&self, key: &str) -> InvalidationReport {
        self.invalidate_targets(&[InvalidationTarget::Key(key.to_string())])
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> InvalidationReport {
        self.invalidate_targets(&[InvalidationTarget::Prefix(prefix.to_string())])
    }

    /// Apply the dependency-table fan-out for a completed mutation
    pub fn invalidate_mutation(&self, mutation: &Mutation) -> InvalidationReport {
        let targets = self.table.resolve(mutation);
        debug!(
            kind = %mutation.kind,
            action = ?mutation.action,
            id = mutation.id.as_deref().unwrap_or(""),
            targets = targets.len(),
            "Resolved mutation fan-out"
        );
        self.invalidate_targets(&targets)
    }

    /// Remove a set of keys/prefixes as one operation
    pub fn invalidate_targets(&self, targets: &[InvalidationTarget]) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        {
            let in_flight = self.state.in_flight.lock();
            for target in targets {
                match target {
                    InvalidationTarget::Key(key) => self.remove_key(&in_flight, key, &mut report),
                    InvalidationTarget::Prefix(prefix) => {
                        self.remove_prefix(&in_flight, prefix, &mut report)
                    }
                }
            }
        }

        report.removed.sort();
        report.removed.dedup();

        if !report.removed.is_empty() || report.superseded > 0 {
            info!(
                removed = report.removed.len(),
                superseded = report.superseded,
                "Invalidated cache entries"
            );
            self.state.publish(CacheEvent::Invalidated {
                keys: report.removed.clone(),
            });
        }
        report
    }

    /// Full reset: every entry and every error
    pub fn invalidate_all(&self) -> InvalidationReport {
        let mut report = InvalidationReport {
            cleared: true,
            ..Default::default()
        };
        let count = {
            let in_flight = self.state.in_flight.lock();
            report.removed = self.state.store.keys();
            let count = self.state.store.clear();
            self.state.errors.clear();
            for request in in_flight.values() {
                report.superseded += supersede(request);
            }
            count
        };

        info!("Invalidated all {} cache entries", count);
        self.state.publish(CacheEvent::Cleared { count });
        report
    }

    fn remove_key(
        &self,
        in_flight: &HashMap<String, InFlightRequest<V>>,
        key: &str,
        report: &mut InvalidationReport,
    ) {
        if self.state.store.remove(key) {
            report.removed.push(key.to_string());
        }
        self.state.errors.remove(key);
        if let Some(request) = in_flight.get(key) {
            report.superseded += supersede(request);
        }
    }

    fn remove_prefix(
        &self,
        in_flight: &HashMap<String, InFlightRequest<V>>,
        prefix: &str,
        report: &mut InvalidationReport,
    ) {
        report.removed.extend(self.state.store.remove_by_prefix(prefix));
        self.state.errors.retain(|key, _| !key.starts_with(prefix));
        for (key, request) in in_flight.iter() {
            if key.starts_with(prefix) {
                report.superseded += supersede(request);
            }
        }
    }
}

/// 1 if this call marked the request, 0 if it already was
fn supersede<V>(request: &InFlightRequest<V>) -> usize {
    usize::from(!request.superseded.swap(true, Ordering::SeqCst))
}
