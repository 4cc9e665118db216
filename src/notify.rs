//! Instructor notifications for new enrollments.
//!
//! The enrollment service only enqueues an [`EnrollmentNotice`]; a worker task
//! turns it into a stored notification and optionally forwards it to a
//! realtime gateway. Nothing here ever reports back to the enrolling user.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::models::{EnrollmentType, Notification};
use crate::repo::{NotificationRepository, Store, UnitOfWork, UserRepository};

pub const NEW_ENROLLMENT: &str = "new_enrollment";

#[derive(Clone, Debug, PartialEq)]
pub struct EnrollmentNotice {
    pub instructor_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub student_id: Uuid,
    pub enrollment_type: EnrollmentType,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("webhook error: {0}")]
    Webhook(#[from] reqwest::Error),

    #[error("student {0} not found")]
    StudentMissing(Uuid),
}

/// Sending half of the notification queue.
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<EnrollmentNotice>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, Receiver<EnrollmentNotice>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Never blocks and never fails the caller.
    pub fn notify(&self, notice: EnrollmentNotice) {
        match self.tx.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(notice)) => {
                tracing::warn!(
                    "Notification queue full, dropping enrollment notice for course {}",
                    notice.course_id
                );
            }
            Err(TrySendError::Closed(notice)) => {
                tracing::warn!(
                    "Notification worker gone, dropping enrollment notice for course {}",
                    notice.course_id
                );
            }
        }
    }
}

struct Webhook {
    client: reqwest::Client,
    url: String,
}

pub struct NotificationWorker {
    store: Arc<dyn Store>,
    webhook: Option<Webhook>,
}

impl NotificationWorker {
    pub fn new(store: Arc<dyn Store>, webhook_url: Option<String>) -> Self {
        let webhook = webhook_url.map(|url| Webhook {
            client: reqwest::Client::new(),
            url,
        });
        Self { store, webhook }
    }

    pub fn spawn(self, mut rx: Receiver<EnrollmentNotice>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                match self.deliver(&notice).await {
                    Ok(notification) => tracing::debug!(
                        "Notification {} delivered to instructor {}",
                        notification.id,
                        notice.instructor_id
                    ),
                    Err(e) => tracing::warn!(
                        "Error sending enrollment notification for course {}: {}",
                        notice.course_id,
                        e
                    ),
                }
            }
            tracing::info!("Notification worker stopped");
        })
    }

    pub async fn deliver(&self, notice: &EnrollmentNotice) -> Result<Notification, NotifyError> {
        let mut uow = self.store.begin().await?;
        let student = uow
            .find_user(notice.student_id)
            .await?
            .ok_or(NotifyError::StudentMissing(notice.student_id))?;

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: notice.instructor_id,
            kind: NEW_ENROLLMENT.to_string(),
            title: "New enrollment".to_string(),
            message: format!("{} enrolled in \"{}\"", student.name, notice.course_title),
            data: Some(json!({
                "course_id": notice.course_id,
                "student_id": student.id,
                "enrollment_type": notice.enrollment_type,
                "course_title": notice.course_title,
                "student_name": student.name,
            })),
            is_read: false,
            created_at: Utc::now(),
        };
        uow.insert_notification(&notification).await?;
        uow.commit().await?;

        if let Some(webhook) = &self.webhook {
            webhook
                .client
                .post(&webhook.url)
                .json(&json!({
                    "room": format!("user_{}", notice.instructor_id),
                    "notification": notification,
                }))
                .send()
                .await?
                .error_for_status()?;
        }

        Ok(notification)
    }
}

/// Spawns the worker and returns the handle the enrollment service sends to.
pub fn start(store: Arc<dyn Store>, config: &Config) -> Notifier {
    let (notifier, rx) = Notifier::channel(config.notification_queue_size);
    NotificationWorker::new(store, config.notification_webhook_url.clone()).spawn(rx);
    notifier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::User;

    fn notice(student_id: Uuid) -> EnrollmentNotice {
        EnrollmentNotice {
            instructor_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            course_title: "Rust 101".to_string(),
            student_id,
            enrollment_type: EnrollmentType::Free,
        }
    }

    #[tokio::test]
    async fn deliver_stores_notification_for_instructor() {
        let store = MemoryStore::new();
        let student = User {
            id: Uuid::new_v4(),
            name: "Lan".to_string(),
            email: "lan@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        };
        store.insert_user(student.clone()).await;
        let worker = NotificationWorker::new(Arc::new(store.clone()), None);

        let notice = notice(student.id);
        let notification = worker.deliver(&notice).await.unwrap();

        assert_eq!(notification.user_id, notice.instructor_id);
        assert_eq!(notification.kind, NEW_ENROLLMENT);
        assert_eq!(notification.message, "Lan enrolled in \"Rust 101\"");
        assert_eq!(notification.data.as_ref().unwrap()["enrollment_type"], "free");
        assert_eq!(store.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn deliver_fails_for_unknown_student() {
        let store = MemoryStore::new();
        let worker = NotificationWorker::new(Arc::new(store.clone()), None);

        let err = worker.deliver(&notice(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, NotifyError::StudentMissing(_)));
        assert!(store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn notify_drops_notices_when_queue_is_full() {
        let (notifier, mut rx) = Notifier::channel(1);
        notifier.notify(notice(Uuid::new_v4()));
        notifier.notify(notice(Uuid::new_v4()));

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notify_survives_a_stopped_worker() {
        let (notifier, rx) = Notifier::channel(4);
        drop(rx);
        notifier.notify(notice(Uuid::new_v4()));
    }
}
