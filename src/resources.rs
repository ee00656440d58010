//! Resource Client
//!
//! Typed list/get/create/update/delete for every entity, on top of
//! [`Transport`]. Nothing is cached: each call is a fresh request.

use std::collections::HashSet;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::models::*;
use crate::transport::{Request, Transport};

pub const ME_PATH: &str = "/api/v1/me";

/// An entity type the backend exposes as a CRUD collection
pub trait Resource: DeserializeOwned + Send {
    type Id: Copy + Display + Into<u64> + Send + Sync;
    type Create: Serialize + Sync;
    type Update: Serialize + Sync;

    /// Collection path, e.g. `/api/v1/cameras`
    const COLLECTION: &'static str;
    /// Display name used in messages
    const NAME: &'static str;

    fn id(&self) -> Self::Id;
}

macro_rules! resource {
    ($entity:ty, $id:ty, $create:ty, $update:ty, $path:literal, $name:literal, $field:ident) => {
        impl Resource for $entity {
            type Id = $id;
            type Create = $create;
            type Update = $update;

            const COLLECTION: &'static str = $path;
            const NAME: &'static str = $name;

            fn id(&self) -> $id {
                self.$field
            }
        }
    };
}

resource!(Site, SiteId, NewSite, SiteUpdate, "/api/v1/cameras/sites", "Site", site_id);
resource!(Zone, ZoneId, NewZone, ZoneUpdate, "/api/v1/cameras/zones", "Zone", zone_id);
resource!(Camera, CameraId, NewCamera, CameraUpdate, "/api/v1/cameras", "Camera", camera_id);
resource!(Checklist, ChecklistId, NewChecklist, ChecklistUpdate, "/api/v1/checklists", "Checklist", checklist_id);
resource!(ChecklistTemplate, TemplateId, NewTemplate, TemplateUpdate, "/api/v1/checklists/templates", "Template", template_id);
resource!(Execution, ExecutionId, NewExecution, ExecutionUpdate, "/api/v1/executions", "Execution", execution_id);
resource!(User, UserId, NewUser, UserUpdate, "/api/v1/users", "User", user_id);

/// Offset/limit window for list calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 100;

    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

/// Client for every resource the console manages
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<Transport>,
    /// Identities deleted through this client; never addressed again.
    /// Entries are never evicted, so the set grows with the deletes made
    /// during the client's life.
    deleted: Arc<Mutex<HashSet<(&'static str, u64)>>>,
}

impl ApiClient {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            deleted: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// The user the current token belongs to
    pub async fn me(&self) -> Result<User, ApiError> {
        self.transport.fetch(Request::get(ME_PATH)).await
    }

    pub fn sites(&self) -> Resources<'_, Site> {
        Resources::new(self)
    }

    pub fn zones(&self) -> Resources<'_, Zone> {
        Resources::new(self)
    }

    pub fn cameras(&self) -> Resources<'_, Camera> {
        Resources::new(self)
    }

    pub fn checklists(&self) -> Resources<'_, Checklist> {
        Resources::new(self)
    }

    pub fn templates(&self) -> Resources<'_, ChecklistTemplate> {
        Resources::new(self)
    }

    pub fn executions(&self) -> Resources<'_, Execution> {
        Resources::new(self)
    }

    pub fn users(&self) -> Resources<'_, User> {
        Resources::new(self)
    }

    fn is_deleted(&self, collection: &'static str, id: u64) -> bool {
        self.deleted
            .lock()
            .map(|set| set.contains(&(collection, id)))
            .unwrap_or_else(|poisoned| poisoned.into_inner().contains(&(collection, id)))
    }

    fn mark_deleted(&self, collection: &'static str, id: u64) {
        let mut set = match self.deleted.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.insert((collection, id));
    }
}

/// CRUD handle for one resource type, borrowed from an [`ApiClient`].
///
/// The handle is `Copy` and every call takes it by value, so the returned
/// futures own it and can be joined without binding the handle first.
pub struct Resources<'a, R> {
    client: &'a ApiClient,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for Resources<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Resources<'_, R> {}

impl<'a, R: Resource> Resources<'a, R> {
    fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            _resource: PhantomData,
        }
    }

    pub async fn list(self, page: Page) -> Result<Vec<R>, ApiError> {
        self.client.transport.fetch(Self::list_request(page)).await
    }

    /// Fails with [`ApiError::NotFound`] when the backend has no such entity,
    /// or when this client deleted it earlier.
    pub async fn get(self, id: R::Id) -> Result<R, ApiError> {
        self.ensure_live(id)?;
        self.client.transport.fetch(Request::get(Self::item_path(id))).await
    }

    /// Create an entity; the snapshot returned carries the backend-assigned
    /// identity and timestamps.
    pub async fn create(self, payload: &R::Create) -> Result<R, ApiError> {
        let request = Request::post(R::COLLECTION).json(payload)?;
        let created: R = self.client.transport.fetch(request).await?;

        info!("{} {} created", R::NAME, created.id());
        Ok(created)
    }

    /// Apply a partial update; fields absent from `payload` keep their value
    pub async fn update(self, id: R::Id, payload: &R::Update) -> Result<R, ApiError> {
        self.ensure_live(id)?;
        let request = Request::put(Self::item_path(id)).json(payload)?;
        self.client.transport.fetch(request).await
    }

    /// Delete an entity. Its identity is invalid for the rest of this client's life.
    pub async fn delete(self, id: R::Id) -> Result<(), ApiError> {
        self.ensure_live(id)?;
        let outcome = self.client.transport.execute(Request::delete(Self::item_path(id))).await;

        match &outcome {
            Ok(()) | Err(ApiError::NotFound(_)) => {
                self.client.mark_deleted(R::COLLECTION, id.into());
                info!("{} {} deleted", R::NAME, id);
            }
            Err(_) => {}
        }
        outcome
    }

    async fn list_where(self, page: Page, field: &'static str, value: u64) -> Result<Vec<R>, ApiError> {
        let request = Self::list_request(page).query(field, value);
        self.client.transport.fetch(request).await
    }

    fn ensure_live(&self, id: R::Id) -> Result<(), ApiError> {
        if self.client.is_deleted(R::COLLECTION, id.into()) {
            debug!("Refusing to address deleted {} {}", R::NAME, id);
            return Err(ApiError::NotFound(format!("{} {} was deleted", R::NAME, id)));
        }
        Ok(())
    }

    fn list_request(page: Page) -> Request {
        Request::get(R::COLLECTION)
            .query("skip", page.offset)
            .query("limit", page.limit)
    }

    fn item_path(id: R::Id) -> String {
        format!("{}/{}", R::COLLECTION, id)
    }
}

impl Resources<'_, Zone> {
    pub async fn list_for_site(self, site: SiteId, page: Page) -> Result<Vec<Zone>, ApiError> {
        self.list_where(page, "site_id", site.get()).await
    }
}

impl Resources<'_, Camera> {
    pub async fn list_for_zone(self, zone: ZoneId, page: Page) -> Result<Vec<Camera>, ApiError> {
        self.list_where(page, "zone_id", zone.get()).await
    }
}

impl Resources<'_, Checklist> {
    pub async fn steps(self, id: ChecklistId) -> Result<Vec<ChecklistStep>, ApiError> {
        self.ensure_live(id)?;
        let path = format!("{}/steps", Self::item_path(id));
        self.client.transport.fetch(Request::get(path)).await
    }

    pub async fn add_step(
        self,
        id: ChecklistId,
        step: &NewChecklistStep,
    ) -> Result<ChecklistStep, ApiError> {
        self.ensure_live(id)?;
        let request = Request::post(format!("{}/steps", Self::item_path(id))).json(step)?;
        self.client.transport.fetch(request).await
    }

    pub async fn step(self, id: ChecklistId, step: StepId) -> Result<ChecklistStep, ApiError> {
        self.ensure_live(id)?;
        self.client.transport.fetch(Request::get(Self::step_path(id, step))).await
    }

    pub async fn update_step(
        self,
        id: ChecklistId,
        step: StepId,
        changes: &ChecklistStepUpdate,
    ) -> Result<ChecklistStep, ApiError> {
        self.ensure_live(id)?;
        let request = Request::put(Self::step_path(id, step)).json(changes)?;
        self.client.transport.fetch(request).await
    }

    pub async fn delete_step(self, id: ChecklistId, step: StepId) -> Result<(), ApiError> {
        self.ensure_live(id)?;
        self.client.transport.execute(Request::delete(Self::step_path(id, step))).await?;

        info!("Step {} of checklist {} deleted", step, id);
        Ok(())
    }

    fn step_path(id: ChecklistId, step: StepId) -> String {
        format!("{}/steps/{}", Self::item_path(id), step)
    }
}

impl Resources<'_, Execution> {
    pub async fn list_for_checklist(
        self,
        checklist: ChecklistId,
        page: Page,
    ) -> Result<Vec<Execution>, ApiError> {
        self.list_where(page, "checklist_id", checklist.get()).await
    }

    /// Mark the execution Completed; the backend stamps its end time
    pub async fn complete(self, id: ExecutionId) -> Result<Execution, ApiError> {
        self.ensure_live(id)?;
        let path = format!("{}/complete", Self::item_path(id));
        let done: Execution = self.client.transport.fetch(Request::put(path)).await?;

        info!("Execution {} completed", id);
        Ok(done)
    }

    pub async fn steps(self, id: ExecutionId) -> Result<Vec<StepExecution>, ApiError> {
        self.ensure_live(id)?;
        let path = format!("{}/steps", Self::item_path(id));
        self.client.transport.fetch(Request::get(path)).await
    }

    pub async fn record_step(
        self,
        id: ExecutionId,
        step: &NewStepExecution,
    ) -> Result<StepExecution, ApiError> {
        self.ensure_live(id)?;
        let request = Request::post(format!("{}/steps", Self::item_path(id))).json(step)?;
        self.client.transport.fetch(request).await
    }

    /// Replace the recorded outcome of a step. Step outcomes are addressed
    /// by their own id, outside any one execution's path.
    pub async fn update_step(
        self,
        step: StepExecutionId,
        outcome: &NewStepExecution,
    ) -> Result<StepExecution, ApiError> {
        let path = format!("{}/steps/{}", Execution::COLLECTION, step);
        let request = Request::put(path).json(outcome)?;
        self.client.transport.fetch(request).await
    }
}
