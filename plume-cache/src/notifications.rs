//! User-facing descriptions of mutation outcomes.

use chrono::{DateTime, Utc};
use plume_core::MutationError;

use crate::mutation::MutationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Retry,
    SignIn,
    Dismiss,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Describe a settled mutation, or `None` when nothing should be shown.
    ///
    /// Toggles succeed silently and cancelled mutations are never reported.
    pub fn for_outcome<T>(kind: MutationKind, outcome: &Result<T, MutationError>) -> Option<Self> {
        match outcome {
            Ok(_) => success(kind),
            Err(MutationError::Cancelled) => None,
            Err(err) if err.requires_sign_in() => Some(
                Self::new(
                    NotificationLevel::Error,
                    "Authentication Required",
                    sign_in_prompt(kind),
                )
                .with_action(NotificationAction::SignIn),
            ),
            Err(err) => {
                let action = match err {
                    MutationError::Network { .. } => NotificationAction::Retry,
                    _ => NotificationAction::Dismiss,
                };
                Some(
                    Self::new(NotificationLevel::Error, failure_title(kind), err.user_message())
                        .with_action(action),
                )
            }
        }
    }
}

fn success(kind: MutationKind) -> Option<Notification> {
    let (title, message) = match kind {
        MutationKind::CreateComment => ("Comment Posted", "Your comment has been added successfully"),
        MutationKind::UpdateComment => ("Comment Updated", "Your comment has been updated"),
        MutationKind::DeleteComment => ("Comment Deleted", "Your comment has been removed"),
        MutationKind::UpdateProfile => {
            ("Profile Updated", "Your profile has been updated successfully")
        }
        MutationKind::UpdatePost => ("Post Updated", "Your post has been updated successfully"),
        MutationKind::CreatePost => ("Post Created", "Your post has been created"),
        MutationKind::DeletePost => ("Post Deleted", "Your post has been deleted"),
        MutationKind::AddPostTags => ("Tags Updated", "The post's tags have been updated"),
        MutationKind::ToggleLike
        | MutationKind::ToggleSave
        | MutationKind::ToggleFollow
        | MutationKind::Custom => return None,
    };
    Some(Notification::new(NotificationLevel::Success, title, message))
}

fn failure_title(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::CreateComment => "Failed to Post Comment",
        MutationKind::UpdateComment => "Failed to Update Comment",
        MutationKind::DeleteComment => "Failed to Delete Comment",
        MutationKind::UpdateProfile | MutationKind::UpdatePost => "Update Failed",
        MutationKind::CreatePost => "Failed to Create Post",
        MutationKind::DeletePost => "Failed to Delete Post",
        MutationKind::AddPostTags => "Failed to Update Tags",
        MutationKind::ToggleLike
        | MutationKind::ToggleSave
        | MutationKind::ToggleFollow
        | MutationKind::Custom => "Action Failed",
    }
}

fn sign_in_prompt(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::ToggleLike => "Please sign in to like posts",
        MutationKind::ToggleSave => "Please sign in to save posts",
        MutationKind::ToggleFollow => "Please sign in to follow people",
        MutationKind::CreateComment | MutationKind::UpdateComment | MutationKind::DeleteComment => {
            "Please sign in to comment"
        }
        MutationKind::UpdateProfile
        | MutationKind::UpdatePost
        | MutationKind::CreatePost
        | MutationKind::DeletePost
        | MutationKind::AddPostTags
        | MutationKind::Custom => {
            "Please sign in to continue"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_success_is_silent() {
        assert!(Notification::for_outcome(MutationKind::ToggleLike, &Ok::<(), _>(())).is_none());
        let posted = Notification::for_outcome(MutationKind::CreateComment, &Ok::<(), _>(())).unwrap();
        assert_eq!(posted.level, NotificationLevel::Success);
        assert_eq!(posted.title, "Comment Posted");
    }

    #[test]
    fn test_unauthorized_asks_for_sign_in() {
        let outcome: Result<(), _> = Err(MutationError::Unauthorized {
            message: "expired".to_string(),
        });
        let note = Notification::for_outcome(MutationKind::ToggleSave, &outcome).unwrap();
        assert_eq!(note.title, "Authentication Required");
        assert_eq!(note.message, "Please sign in to save posts");
        assert_eq!(note.action, Some(NotificationAction::SignIn));
    }

    #[test]
    fn test_validation_carries_backend_message() {
        let outcome: Result<(), _> = Err(MutationError::Validation {
            message: "Comment is too long".to_string(),
        });
        let note = Notification::for_outcome(MutationKind::CreateComment, &outcome).unwrap();
        assert_eq!(note.title, "Failed to Post Comment");
        assert_eq!(note.message, "Comment is too long");
        assert_eq!(note.action, Some(NotificationAction::Dismiss));
    }

    #[test]
    fn test_network_failure_is_generic_and_retryable() {
        let outcome: Result<(), _> = Err(MutationError::Network {
            message: "connection reset".to_string(),
        });
        let note = Notification::for_outcome(MutationKind::ToggleLike, &outcome).unwrap();
        assert_eq!(note.title, "Action Failed");
        assert!(!note.message.contains("connection reset"));
        assert_eq!(note.action, Some(NotificationAction::Retry));

        let cancelled: Result<(), _> = Err(MutationError::Cancelled);
        assert!(Notification::for_outcome(MutationKind::ToggleLike, &cancelled).is_none());
    }

    #[test]
    fn test_post_lifecycle_notifications() {
        let created = Notification::for_outcome(MutationKind::CreatePost, &Ok::<(), _>(())).unwrap();
        assert_eq!(created.title, "Post Created");

        let outcome: Result<(), _> = Err(MutationError::Conflict {
            message: "Post no longer exists".to_string(),
        });
        let note = Notification::for_outcome(MutationKind::DeletePost, &outcome).unwrap();
        assert_eq!(note.title, "Failed to Delete Post");
        assert_eq!(note.message, "Post no longer exists");
        assert_eq!(note.action, Some(NotificationAction::Dismiss));
    }
}
