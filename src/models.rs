//! Data Model
//!
//! Snapshots returned by the backend, and the payloads used to create and
//! update them. Snapshots are plain values: nothing in the client mutates one
//! after it has been returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl $name {
                pub fn get(self) -> u64 {
                    self.0
                }
            }

            impl From<u64> for $name {
                fn from(raw: u64) -> Self {
                    Self(raw)
                }
            }

            impl From<$name> for u64 {
                fn from(id: $name) -> u64 {
                    id.0
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

id_type!(
    SiteId,
    ZoneId,
    CameraId,
    ChecklistId,
    ExecutionId,
    UserId,
    /// Checklist template
    TemplateId,
    RoleId,
    /// Step of a checklist
    StepId,
    /// Recorded outcome of one step within an execution
    StepExecutionId,
);

/// Turn a UI selection into a reference, failing before any request is sent
/// when nothing was selected.
///
/// "Nothing selected" is `None`; identifier `0` is a valid selection.
pub fn require<T>(selection: Option<T>, what: &str) -> Result<T, ApiError> {
    selection.ok_or_else(|| ApiError::Precondition(format!("{} is required", what)))
}

// Statuses

/// Lifecycle of sites, zones, checklists and users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActivityStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraStatus {
    #[default]
    Online,
    Offline,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[default]
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Failed,
    Aborted,
}

impl ExecutionStatus {
    /// Completed, Failed and Aborted executions carry an end time
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::InProgress => "In Progress",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityStatus::Active => f.write_str("Active"),
            ActivityStatus::Inactive => f.write_str("Inactive"),
        }
    }
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraStatus::Online => f.write_str("Online"),
            CameraStatus::Offline => f.write_str("Offline"),
            CameraStatus::Maintenance => f.write_str("Maintenance"),
        }
    }
}

// Snapshots

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub site_id: SiteId,
    pub site_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ActivityStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub site_id: SiteId,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ActivityStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub camera_id: CameraId,
    pub camera_name: String,
    #[serde(default)]
    pub camera_code: Option<String>,
    pub zone_id: ZoneId,
    #[serde(default)]
    pub camera_type: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub status: CameraStatus,
    #[serde(default)]
    pub configuration: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub checklist_id: ChecklistId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    pub status: ActivityStatus,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<ChecklistStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistStep {
    pub step_id: StepId,
    pub checklist_id: ChecklistId,
    pub step_number: u32,
    pub description: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub verification_type: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistTemplate {
    pub template_id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub version: String,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A run of a checklist by a user.
///
/// `end_time` is present exactly when `status` is terminal; snapshots that
/// break this are rejected when decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExecutionRecord")]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub checklist_id: ChecklistId,
    pub user_id: UserId,
    pub status: ExecutionStatus,
    #[serde(with = "timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "timestamp::option")]
    pub end_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    pub step_executions: Vec<StepExecution>,
}

#[derive(Deserialize)]
struct ExecutionRecord {
    execution_id: ExecutionId,
    checklist_id: ChecklistId,
    user_id: UserId,
    status: ExecutionStatus,
    #[serde(with = "timestamp")]
    start_time: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(with = "timestamp")]
    created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    step_executions: Vec<StepExecution>,
}

impl TryFrom<ExecutionRecord> for Execution {
    type Error = String;

    fn try_from(raw: ExecutionRecord) -> Result<Self, Self::Error> {
        if raw.status.is_terminal() != raw.end_time.is_some() {
            return Err(format!(
                "execution {} is {} but end_time is {}",
                raw.execution_id,
                raw.status,
                if raw.end_time.is_some() { "set" } else { "missing" },
            ));
        }

        Ok(Execution {
            execution_id: raw.execution_id,
            checklist_id: raw.checklist_id,
            user_id: raw.user_id,
            status: raw.status,
            start_time: raw.start_time,
            end_time: raw.end_time,
            notes: raw.notes,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            step_executions: raw.step_executions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub exec_step_id: StepExecutionId,
    pub execution_id: ExecutionId,
    pub step_id: StepId,
    pub status: String,
    #[serde(default)]
    pub verification_result: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Seconds spent on the step
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: ActivityStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub role_id: RoleId,
    pub role_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// Create payloads. Required fields are plain values, so leaving one out does
// not compile; optional ones are omitted from the body when `None`.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSite {
    pub site_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

impl NewSite {
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            location: None,
            description: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewZone {
    pub zone_name: String,
    pub site_id: SiteId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

impl NewZone {
    pub fn new(zone_name: impl Into<String>, site_id: SiteId) -> Self {
        Self {
            zone_name: zone_name.into(),
            site_id,
            description: None,
            status: None,
        }
    }

    /// Build from a form where the site may not have been picked
    pub fn from_selection(
        zone_name: impl Into<String>,
        site: Option<SiteId>,
    ) -> Result<Self, ApiError> {
        Ok(Self::new(zone_name, require(site, "Site")?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCamera {
    pub camera_name: String,
    pub zone_id: ZoneId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CameraStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NewCamera {
    pub fn new(camera_name: impl Into<String>, zone_id: ZoneId) -> Self {
        Self {
            camera_name: camera_name.into(),
            zone_id,
            camera_code: None,
            camera_type: None,
            ip_address: None,
            status: None,
            configuration: None,
        }
    }

    pub fn from_selection(
        camera_name: impl Into<String>,
        zone: Option<ZoneId>,
    ) -> Result<Self, ApiError> {
        Ok(Self::new(camera_name, require(zone, "Zone")?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewChecklist {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

impl NewChecklist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            template_id: None,
            status: None,
        }
    }
}

/// Start of an execution. The backend records the calling user and start time.
///
/// Executions always start In Progress and end through `complete`, so no
/// status is sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewExecution {
    pub checklist_id: ChecklistId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewExecution {
    pub fn new(checklist_id: ChecklistId) -> Self {
        Self {
            checklist_id,
            notes: None,
        }
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

// Keeps the password out of logs.
impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTemplate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewChecklistStep {
    pub step_number: u32,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewStepExecution {
    pub step_id: StepId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// Update payloads: every field optional, absent fields keep their backend value.

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoneUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

impl ZoneUpdate {
    /// Move the zone to the selected site
    pub fn reassign(site: Option<SiteId>) -> Result<Self, ApiError> {
        Ok(Self {
            site_id: Some(require(site, "Site")?),
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CameraUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<ZoneId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CameraStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CameraUpdate {
    /// Move the camera to the selected zone
    pub fn reassign(zone: Option<ZoneId>) -> Result<Self, ApiError> {
        Ok(Self {
            zone_id: Some(require(zone, "Zone")?),
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChecklistUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChecklistStepUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_type: Option<String>,
}

/// Backend timestamps: RFC 3339, or naive ISO-8601 which is taken as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw))),
                None => Ok(None),
            }
        }
    }
}
