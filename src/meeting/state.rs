use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::events::{EventBus, MeetingEvent};
use crate::error::MeetingError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    Important,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::Important => "important",
            Urgency::Critical => "critical",
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "normal" | "medium" => Ok(Urgency::Normal),
            "important" | "high" => Ok(Urgency::Important),
            "critical" | "urgent" => Ok(Urgency::Critical),
            other => Err(format!("unknown urgency '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::InProgress => "in_progress",
            ActionStatus::Completed => "completed",
        }
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "pending" | "open" | "todo" => Ok(ActionStatus::Pending),
            "in progress" | "started" | "active" => Ok(ActionStatus::InProgress),
            "completed" | "complete" | "done" | "finished" => Ok(ActionStatus::Completed),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaPoint {
    pub id: String,
    pub title: String,
    pub description: String,
    pub urgency: Urgency,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub title: String,
    pub assignee: Option<String>,
    pub due_date: Option<String>,
    pub status: ActionStatus,
    pub trigger: Option<String>,
    pub created_at: i64,
}

/// Partial update for an agenda point; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct AgendaPointUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub urgency: Option<Urgency>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MeetingCounts {
    pub agenda_points: usize,
    pub action_items: usize,
    pub completed_actions: usize,
}

#[derive(Debug, Default)]
struct MeetingInner {
    agenda: Vec<AgendaPoint>,
    actions: Vec<ActionItem>,
}

/// Agenda points and action items of the current meeting
#[derive(Debug, Clone, Default)]
pub struct MeetingState {
    inner: Arc<RwLock<MeetingInner>>,
    events: EventBus,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn clean_title(title: &str) -> Result<String, MeetingError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(MeetingError::EmptyTitle);
    }
    Ok(title.to_string())
}

/// Matches an exact id or a case-insensitive title
fn is_match(id: &str, title: &str, key: &str) -> bool {
    id == key || title.eq_ignore_ascii_case(key.trim())
}

impl MeetingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn add_agenda_point(
        &self,
        title: &str,
        description: &str,
        urgency: Urgency,
    ) -> Result<AgendaPoint, MeetingError> {
        let point = AgendaPoint {
            id: new_id(),
            title: clean_title(title)?,
            description: description.trim().to_string(),
            urgency,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        self.inner.write().await.agenda.push(point.clone());
        tracing::info!("Agenda point added: {}", point.title);
        self.events.publish(MeetingEvent::AgendaPointAdded(point.clone()));
        Ok(point)
    }

    /// `key` is an agenda point id or title
    pub async fn update_agenda_point(
        &self,
        key: &str,
        update: AgendaPointUpdate,
    ) -> Result<AgendaPoint, MeetingError> {
        let title = update.title.as_deref().map(clean_title).transpose()?;

        let mut inner = self.inner.write().await;
        let point = inner
            .agenda
            .iter_mut()
            .find(|p| is_match(&p.id, &p.title, key))
            .ok_or_else(|| MeetingError::AgendaPointNotFound(key.to_string()))?;

        if let Some(title) = title {
            point.title = title;
        }
        if let Some(description) = update.description {
            point.description = description.trim().to_string();
        }
        if let Some(urgency) = update.urgency {
            point.urgency = urgency;
        }

        let point = point.clone();
        drop(inner);
        self.events.publish(MeetingEvent::AgendaPointUpdated(point.clone()));
        Ok(point)
    }

    pub async fn remove_agenda_point(&self, key: &str) -> Result<AgendaPoint, MeetingError> {
        let mut inner = self.inner.write().await;
        let idx = inner
            .agenda
            .iter()
            .position(|p| is_match(&p.id, &p.title, key))
            .ok_or_else(|| MeetingError::AgendaPointNotFound(key.to_string()))?;
        let point = inner.agenda.remove(idx);
        drop(inner);

        tracing::info!("Agenda point removed: {}", point.title);
        self.events.publish(MeetingEvent::AgendaPointRemoved { id: point.id.clone() });
        Ok(point)
    }

    pub async fn agenda_points(&self) -> Vec<AgendaPoint> {
        self.inner.read().await.agenda.clone()
    }

    pub async fn add_action_item(
        &self,
        title: &str,
        assignee: Option<&str>,
        due_date: Option<&str>,
    ) -> Result<ActionItem, MeetingError> {
        let non_empty = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let item = ActionItem {
            id: new_id(),
            title: clean_title(title)?,
            assignee: non_empty(assignee),
            due_date: non_empty(due_date),
            status: ActionStatus::Pending,
            trigger: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        self.inner.write().await.actions.push(item.clone());
        tracing::info!("Action item added: {}", item.title);
        self.events.publish(MeetingEvent::ActionItemAdded(item.clone()));
        Ok(item)
    }

    async fn update_action<F>(&self, key: &str, apply: F) -> Result<ActionItem, MeetingError>
    where
        F: FnOnce(&mut ActionItem),
    {
        let mut inner = self.inner.write().await;
        let item = inner
            .actions
            .iter_mut()
            .find(|a| is_match(&a.id, &a.title, key))
            .ok_or_else(|| MeetingError::ActionItemNotFound(key.to_string()))?;
        apply(&mut *item);
        let item = item.clone();
        drop(inner);

        self.events.publish(MeetingEvent::ActionItemUpdated(item.clone()));
        Ok(item)
    }

    pub async fn set_action_trigger(&self, key: &str, trigger: &str) -> Result<ActionItem, MeetingError> {
        let trigger = trigger.trim().to_string();
        self.update_action(key, |a| a.trigger = Some(trigger)).await
    }

    pub async fn assign_action(&self, key: &str, assignee: &str) -> Result<ActionItem, MeetingError> {
        let assignee = assignee.trim().to_string();
        self.update_action(key, |a| a.assignee = Some(assignee)).await
    }

    pub async fn update_action_status(
        &self,
        key: &str,
        status: ActionStatus,
    ) -> Result<ActionItem, MeetingError> {
        self.update_action(key, |a| a.status = status).await
    }

    pub async fn action_items(&self) -> Vec<ActionItem> {
        self.inner.read().await.actions.clone()
    }

    pub async fn counts(&self) -> MeetingCounts {
        let inner = self.inner.read().await;
        MeetingCounts {
            agenda_points: inner.agenda.len(),
            action_items: inner.actions.len(),
            completed_actions: inner
                .actions
                .iter()
                .filter(|a| a.status == ActionStatus::Completed)
                .count(),
        }
    }
}
