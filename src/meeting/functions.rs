use futures::FutureExt;
use serde_json::{json, Value};

use super::state::{ActionStatus, AgendaPointUpdate, MeetingState, Urgency};
use crate::assistant::functions::{optional_str, required_str, FunctionRegistry, Params};
use crate::error::AssistantError;

fn parse_param<T>(params: &Params, key: &str) -> Result<Option<T>, AssistantError>
where
    T: std::str::FromStr<Err = String>,
{
    optional_str(params, key)
        .map(|v| {
            v.parse::<T>().map_err(|reason| AssistantError::InvalidParameter {
                param: key.to_string(),
                reason,
            })
        })
        .transpose()
}

fn to_value<T: serde::Serialize>(v: T) -> Result<Value, AssistantError> {
    serde_json::to_value(v).map_err(|e| AssistantError::MalformedResponse(e.to_string()))
}

/// Installs the built-in agenda and action item functions
pub async fn register_meeting_functions(registry: &FunctionRegistry, state: &MeetingState) {
    let s = state.clone();
    registry
        .register_fn(
            "create_agenda_point",
            "Create an agenda point. Params: title, description?, urgency? (low|normal|important|critical)",
            move |params| {
                let s = s.clone();
                async move {
                    let title = required_str(&params, "create_agenda_point", "title")?;
                    let description = optional_str(&params, "description").unwrap_or("");
                    let urgency = parse_param::<Urgency>(&params, "urgency")?.unwrap_or_default();
                    to_value(s.add_agenda_point(title, description, urgency).await?)
                }
                .boxed()
            },
        )
        .await;

    let s = state.clone();
    registry
        .register_fn(
            "update_agenda_point",
            "Update an agenda point. Params: agenda_point (id or title), title?, description?, urgency?",
            move |params| {
                let s = s.clone();
                async move {
                    let key = required_str(&params, "update_agenda_point", "agenda_point")?;
                    let update = AgendaPointUpdate {
                        title: optional_str(&params, "title").map(str::to_string),
                        description: optional_str(&params, "description").map(str::to_string),
                        urgency: parse_param::<Urgency>(&params, "urgency")?,
                    };
                    to_value(s.update_agenda_point(key, update).await?)
                }
                .boxed()
            },
        )
        .await;

    let s = state.clone();
    registry
        .register_fn(
            "delete_agenda_point",
            "Delete an agenda point. Params: agenda_point (id or title)",
            move |params| {
                let s = s.clone();
                async move {
                    let key = required_str(&params, "delete_agenda_point", "agenda_point")?;
                    to_value(s.remove_agenda_point(key).await?)
                }
                .boxed()
            },
        )
        .await;

    let s = state.clone();
    registry
        .register_fn("list_agenda_points", "List all agenda points", move |_| {
            let s = s.clone();
            async move { to_value(s.agenda_points().await) }.boxed()
        })
        .await;

    let s = state.clone();
    registry
        .register_fn(
            "create_action_item",
            "Create an action item. Params: title, assignee?, due_date?",
            move |params| {
                let s = s.clone();
                async move {
                    let title = required_str(&params, "create_action_item", "title")?;
                    let item = s
                        .add_action_item(
                            title,
                            optional_str(&params, "assignee"),
                            optional_str(&params, "due_date"),
                        )
                        .await?;
                    to_value(item)
                }
                .boxed()
            },
        )
        .await;

    let s = state.clone();
    registry
        .register_fn(
            "set_action_trigger",
            "Set the trigger condition of an action item. Params: action_id (id or title), trigger",
            move |params| {
                let s = s.clone();
                async move {
                    let key = required_str(&params, "set_action_trigger", "action_id")?;
                    let trigger = required_str(&params, "set_action_trigger", "trigger")?;
                    to_value(s.set_action_trigger(key, trigger).await?)
                }
                .boxed()
            },
        )
        .await;

    let s = state.clone();
    registry
        .register_fn(
            "assign_action",
            "Assign an action item. Params: action_id (id or title), assignee",
            move |params| {
                let s = s.clone();
                async move {
                    let key = required_str(&params, "assign_action", "action_id")?;
                    let assignee = required_str(&params, "assign_action", "assignee")?;
                    to_value(s.assign_action(key, assignee).await?)
                }
                .boxed()
            },
        )
        .await;

    let s = state.clone();
    registry
        .register_fn(
            "update_action_status",
            "Change an action item's status. Params: action_id (id or title), status (pending|in_progress|completed)",
            move |params| {
                let s = s.clone();
                async move {
                    let key = required_str(&params, "update_action_status", "action_id")?;
                    let status = parse_param::<ActionStatus>(&params, "status")?.ok_or_else(|| {
                        AssistantError::MissingParameter {
                            function: "update_action_status".to_string(),
                            param: "status".to_string(),
                        }
                    })?;
                    to_value(s.update_action_status(key, status).await?)
                }
                .boxed()
            },
        )
        .await;

    let s = state.clone();
    registry
        .register_fn("list_action_items", "List all action items", move |_| {
            let s = s.clone();
            async move { to_value(s.action_items().await) }.boxed()
        })
        .await;

    let s = state.clone();
    registry
        .register_fn("get_meeting_status", "Counts of agenda points and action items", move |_| {
            let s = s.clone();
            async move {
                let counts = s.counts().await;
                Ok(json!({
                    "agenda_points": counts.agenda_points,
                    "action_items": counts.action_items,
                    "completed_actions": counts.completed_actions,
                }))
            }
            .boxed()
        })
        .await;
}
