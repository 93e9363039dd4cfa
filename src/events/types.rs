//! Domain event types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    KanbanMemberAdded,
    KanbanMemberRemoved,
    KanbanMemberJoined,

    ProjectCreated,
    ProjectUpdated,
    ProjectStatusChanged,
    ProjectMoved,
    ProjectDeleted,

    InvitationCreated,
    UserRegistered,

    RoleCreated,
    RoleDeleted,

    NotificationRequested,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::KanbanMemberAdded => "kanban.member.added",
            EventType::KanbanMemberRemoved => "kanban.member.removed",
            EventType::KanbanMemberJoined => "kanban.member.joined",
            EventType::ProjectCreated => "project.created",
            EventType::ProjectUpdated => "project.updated",
            EventType::ProjectStatusChanged => "project.status_changed",
            EventType::ProjectMoved => "project.moved",
            EventType::ProjectDeleted => "project.deleted",
            EventType::InvitationCreated => "invitation.created",
            EventType::UserRegistered => "user.registered",
            EventType::RoleCreated => "role.created",
            EventType::RoleDeleted => "role.deleted",
            EventType::NotificationRequested => "notification.requested",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    Board,
    Project,
    Invitation,
    User,
    Role,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Board => "kanban_board",
            AggregateType::Project => "project",
            AggregateType::Invitation => "invitation",
            AggregateType::User => "user",
            AggregateType::Role => "role",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: EventType,
    pub aggregate_type: AggregateType,
    pub aggregate_id: i32,
    pub payload: serde_json::Value,
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Acting user; absent for self-service and system actions.
    pub actor_id: Option<i32>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventMetadata {
    pub fn by(actor_id: Option<i32>) -> Self {
        Self {
            actor_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMembershipPayload {
    pub board_id: i32,
    pub user_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTransitionPayload {
    pub project_id: i32,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub user_id: i32,
    pub title: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(EventType::KanbanMemberAdded.as_str(), "kanban.member.added");
        assert_eq!(EventType::KanbanMemberJoined.as_str(), "kanban.member.joined");
        assert_eq!(
            EventType::ProjectStatusChanged.as_str(),
            "project.status_changed"
        );
        assert_eq!(EventType::ProjectMoved.as_str(), "project.moved");
        assert_eq!(EventType::InvitationCreated.as_str(), "invitation.created");
        assert_eq!(
            EventType::NotificationRequested.as_str(),
            "notification.requested"
        );
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(format!("{}", EventType::UserRegistered), "user.registered");
        assert_eq!(format!("{}", EventType::RoleDeleted), "role.deleted");
    }

    #[test]
    fn test_aggregate_type_as_str() {
        assert_eq!(AggregateType::Board.as_str(), "kanban_board");
        assert_eq!(AggregateType::Project.as_str(), "project");
        assert_eq!(format!("{}", AggregateType::Invitation), "invitation");
    }

    #[test]
    fn test_domain_event_serialization() {
        let event = DomainEvent {
            event_type: EventType::KanbanMemberAdded,
            aggregate_type: AggregateType::Board,
            aggregate_id: 3,
            payload: serde_json::to_value(BoardMembershipPayload {
                board_id: 3,
                user_id: 8,
            })
            .unwrap(),
            metadata: EventMetadata::by(Some(1)),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "KanbanMemberAdded");
        assert_eq!(json["payload"]["user_id"], 8);
        assert_eq!(json["metadata"]["actor_id"], 1);
    }

    #[test]
    fn test_notification_payload_shape() {
        let json = serde_json::to_value(NotificationPayload {
            user_id: 4,
            title: "Added to board".to_string(),
            message: "You were added to Sales".to_string(),
        })
        .unwrap();
        assert_eq!(json["user_id"], 4);
        assert_eq!(json["title"], "Added to board");
    }
}
