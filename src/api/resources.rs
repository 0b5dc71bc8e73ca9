//! # Resource Facade
//!
//! Typed, per-collection access to the storefront API through the data
//! provider. Reads go through `fetch_data` under the collection's cache keys;
//! mutations hit the API directly and, only when the call succeeds, hand a
//! [`Mutation`] to the invalidation engine so every dependent view is dropped.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::marker::PhantomData;
use tracing::{debug, info};

use super::client::ApiClient;
use super::models::{ApiModel, Booking, DashboardStats, Review, Tour, User};
use crate::caching::{DataProvider, InvalidationReport, Mutation, MutationAction, ResourceKind};
use crate::core::error::ProviderResult;

/// A deferred remote read, ready to hand to `fetch_data`
pub type FetchFn = Box<dyn FnOnce() -> BoxFuture<'static, ProviderResult<Value>> + Send>;

/// Bind a GET of `path` to a fetch closure
fn get_path(client: &ApiClient, path: String) -> FetchFn {
    let client = client.clone();
    Box::new(move || async move { client.get(&path).await }.boxed())
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> ProviderResult<T> {
    Ok(serde_json::from_value(value)?)
}

/// Typed access to one REST collection
pub struct Resource<T> {
    client: ApiClient,
    provider: DataProvider,
    _model: PhantomData<fn() -> T>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            provider: self.provider.clone(),
            _model: PhantomData,
        }
    }
}

impl<T: ApiModel> Resource<T> {
    pub fn new(client: ApiClient, provider: DataProvider) -> Self {
        Self {
            client,
            provider,
            _model: PhantomData,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        T::KIND
    }

    /// `GET /<collection>`
    pub fn list_fn(&self) -> FetchFn {
        get_path(&self.client, T::KIND.endpoint().to_string())
    }

    /// `GET /<collection>/<id>`
    pub fn get_fn(&self, id: &str) -> FetchFn {
        get_path(&self.client, format!("{}/{}", T::KIND.endpoint(), id))
    }

    /// `GET /<collection>/<id>/<child>`, e.g. a tour's reviews
    pub fn nested_fn(&self, parent: ResourceKind, parent_id: &str) -> FetchFn {
        get_path(
            &self.client,
            format!("{}/{}/{}", parent.endpoint(), parent_id, T::KIND.endpoint()),
        )
    }

    /// Whole collection, cached under `<kind>/all`
    pub async fn list(&self, force: bool) -> ProviderResult<Vec<T>> {
        let value = self
            .provider
            .fetch_data(&T::KIND.list_key(), self.list_fn(), force)
            .await?;
        decode(value)
    }

    /// One item, cached under `<kind>/<id>`
    pub async fn get(&self, id: &str, force: bool) -> ProviderResult<T> {
        let value = self
            .provider
            .fetch_data(&T::KIND.item_key(id), self.get_fn(id), force)
            .await?;
        decode(value)
    }

    pub async fn create(&self, payload: Value) -> ProviderResult<T> {
        let created = self.client.post(T::KIND.endpoint(), payload).await?;
        let model = decode::<T>(created.clone());

        let id = model.as_ref().ok().map(|m| m.id().to_string());
        let refs = vec![references_of::<T>(&created)];
        self.dispatch(MutationAction::Create, id.as_deref(), refs);

        model
    }

    /// `PATCH /<collection>/<id>`. Invalidates views of both the old and the
    /// new references when the update moved the resource.
    pub async fn update(&self, id: &str, payload: Value) -> ProviderResult<T> {
        let previous = self.cached_references(id);
        let updated = self
            .client
            .patch(&format!("{}/{}", T::KIND.endpoint(), id), payload)
            .await?;

        let refs = vec![references_of::<T>(&updated), previous];
        self.dispatch(MutationAction::Update, Some(id), refs);

        decode(updated)
    }

    pub async fn delete(&self, id: &str) -> ProviderResult<()> {
        // The response carries nothing, so the cached copy is the only source
        let previous = self.cached_references(id);
        self.client
            .delete(&format!("{}/{}", T::KIND.endpoint(), id))
            .await?;

        self.dispatch(MutationAction::Delete, Some(id), vec![previous]);
        Ok(())
    }

    /// References recorded in a cached copy of `id`, from its item view or
    /// from the cached list
    fn cached_references(&self, id: &str) -> Vec<(&'static str, String)> {
        if let Some(value) = self.provider.cached(&T::KIND.item_key(id)) {
            let refs = references_of::<T>(&value);
            if !refs.is_empty() {
                return refs;
            }
        }

        match self.provider.cached(&T::KIND.list_key()) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<T>(item).ok())
                .find(|model| model.id() == id)
                .map(|model| model.references())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// One mutation per distinct reference set
    fn dispatch(
        &self,
        action: MutationAction,
        id: Option<&str>,
        ref_sets: Vec<Vec<(&'static str, String)>>,
    ) -> InvalidationReport {
        let mut distinct: Vec<Vec<(&'static str, String)>> = Vec::new();
        for refs in ref_sets {
            if !distinct.contains(&refs) {
                distinct.push(refs);
            }
        }
        // Keep a bare mutation so the collection views still go
        if distinct.len() > 1 {
            distinct.retain(|refs| !refs.is_empty());
        }
        if distinct.is_empty() {
            distinct.push(Vec::new());
        }

        let mut report = InvalidationReport::default();
        for refs in distinct {
            let mut mutation = Mutation::new(T::KIND, action);
            if let Some(id) = id {
                mutation = mutation.with_id(id);
            }
            for (name, value) in refs {
                mutation = mutation.with_ref(name, value);
            }

            let partial = self.provider.invalidate_mutation(&mutation);
            for key in partial.removed {
                if !report.removed.contains(&key) {
                    report.removed.push(key);
                }
            }
            report.superseded += partial.superseded;
        }

        info!(
            kind = %T::KIND,
            action = ?action,
            id = id.unwrap_or(""),
            removed = report.removed_count(),
            "Mutation invalidated dependent views"
        );
        report
    }
}

fn references_of<T: ApiModel>(value: &Value) -> Vec<(&'static str, String)> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(model) => model.references(),
        Err(e) => {
            debug!(kind = %T::KIND, error = %e, "Could not read references from payload");
            Vec::new()
        }
    }
}

impl Resource<Review> {
    /// Reviews of one tour, cached under `reviews/tour/<id>`
    pub async fn for_tour(&self, tour_id: &str, force: bool) -> ProviderResult<Vec<Review>> {
        let key = format!("{}/tour/{}", ResourceKind::Reviews.key_root(), tour_id);
        let value = self
            .provider
            .fetch_data(&key, self.nested_fn(ResourceKind::Tours, tour_id), force)
            .await?;
        decode(value)
    }
}

impl Resource<Booking> {
    /// Bookings of one user, cached under `bookings/user/<id>`
    pub async fn for_user(&self, user_id: &str, force: bool) -> ProviderResult<Vec<Booking>> {
        let key = format!("{}/user/{}", ResourceKind::Bookings.key_root(), user_id);
        let value = self
            .provider
            .fetch_data(&key, self.nested_fn(ResourceKind::Users, user_id), force)
            .await?;
        decode(value)
    }
}

/// Admin dashboard aggregates
#[derive(Clone)]
pub struct DashboardResource {
    client: ApiClient,
    provider: DataProvider,
}

impl DashboardResource {
    pub fn new(client: ApiClient, provider: DataProvider) -> Self {
        Self { client, provider }
    }

    /// `GET /admin/stats`
    pub fn stats_fn(&self) -> FetchFn {
        get_path(&self.client, ResourceKind::Dashboard.endpoint().to_string())
    }

    pub async fn stats(&self, force: bool) -> ProviderResult<DashboardStats> {
        let value = self
            .provider
            .fetch_data(ResourceKind::Dashboard.key_root(), self.stats_fn(), force)
            .await?;
        decode(value)
    }
}

/// Every resource, sharing one client and one provider
#[derive(Clone)]
pub struct Resources {
    pub tours: Resource<Tour>,
    pub users: Resource<User>,
    pub bookings: Resource<Booking>,
    pub reviews: Resource<Review>,
    pub dashboard: DashboardResource,
}

impl Resources {
    pub fn new(client: ApiClient, provider: DataProvider) -> Self {
        Self {
            tours: Resource::new(client.clone(), provider.clone()),
            users: Resource::new(client.clone(), provider.clone()),
            bookings: Resource::new(client.clone(), provider.clone()),
            reviews: Resource::new(client.clone(), provider.clone()),
            dashboard: DashboardResource::new(client, provider),
        }
    }

    /// Fetch closure for a well-known cache key, used to warm the cache at
    /// startup. `None` for keys no resource serves.
    pub fn fetch_fn_for(&self, key: &str) -> Option<FetchFn> {
        if key == ResourceKind::Dashboard.key_root() {
            return Some(self.dashboard.stats_fn());
        }

        let (root, rest) = key.split_once('/')?;
        let kind = ResourceKind::ALL.into_iter().find(|k| k.key_root() == root)?;
        let fetch = match (kind, rest.split_once('/')) {
            (ResourceKind::Dashboard, _) => return None,
            (ResourceKind::Reviews, Some(("tour", id))) => {
                self.reviews.nested_fn(ResourceKind::Tours, id)
            }
            (ResourceKind::Bookings, Some(("user", id))) => {
                self.bookings.nested_fn(ResourceKind::Users, id)
            }
            (_, Some(_)) => return None,
            (_, None) if rest == "all" => get_path(&self.tours.client, kind.endpoint().to_string()),
            (_, None) => get_path(&self.tours.client, format!("{}/{}", kind.endpoint(), rest)),
        };
        Some(fetch)
    }
}
