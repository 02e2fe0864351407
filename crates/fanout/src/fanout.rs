//! Fan-out consumer — turns one post-created event into per-follower
//! notification records and live deliveries.
//!
//! Each message moves through an explicit state machine:
//! received → discarded (undecodable), persisted + acked, or failed. The
//! failure policy for this queue is acknowledge-and-drop: a post event whose
//! fan-out cannot complete is logged and consumed rather than redelivered
//! forever.

use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::events::PostCreated;
use herald_common::types::{NewNotification, NotificationDelivery, User};
use herald_mq::EventQueue;

use crate::dispatcher::DeliveryDispatcher;
use crate::store::{NotificationStore, UserStore};

/// Rows per INSERT statement when persisting a fan-out batch.
const NOTIFICATION_BATCH_SIZE: usize = 1000;

/// Notification type tag for new-post notifications.
const NEW_POST_NOTIFICATION_TYPE: &str = "newpost";

/// What to do with a message whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Acknowledge and drop; the event is lost for this service.
    AckAndDrop,
    /// Reject with requeue; the broker redelivers.
    Requeue,
}

/// Terminal state of one consumed message.
enum Outcome {
    Discarded(&'static str),
    Persisted { deliveries: Vec<NotificationDelivery> },
    Failed(AppError),
}

pub struct PostFanoutConsumer {
    pool: PgPool,
    dispatcher: DeliveryDispatcher,
}

impl PostFanoutConsumer {
    /// Failure policy for the new-post queue.
    const ON_FAILURE: FailureAction = FailureAction::AckAndDrop;

    pub fn new(pool: PgPool, dispatcher: DeliveryDispatcher) -> Self {
        Self { pool, dispatcher }
    }

    /// Consume the new-post queue until the broker stream ends.
    pub async fn run<Q: EventQueue>(&self, mq: &Q) -> Result<(), AppError> {
        let mut messages = mq
            .consume(herald_mq::NEW_POST_QUEUE)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?;

        tracing::info!(queue = herald_mq::NEW_POST_QUEUE, "Fan-out consumer started");

        while let Some(message) = messages.recv().await {
            match self.process(&message.body).await {
                Outcome::Discarded(reason) => {
                    tracing::warn!(reason, "Discarding new-post event");
                    if let Err(e) = message.ack().await {
                        tracing::error!(error = %e, "Failed to ack discarded message");
                    }
                }
                Outcome::Persisted { deliveries } => {
                    if let Err(e) = message.ack().await {
                        tracing::error!(error = %e, "Failed to ack processed message");
                    }
                    // Live push happens only after the batch is durable and acked.
                    for delivery in deliveries {
                        self.dispatcher.dispatch(delivery);
                    }
                }
                Outcome::Failed(e) => {
                    tracing::error!(error = %e, "Fan-out failed");
                    let result = match Self::ON_FAILURE {
                        FailureAction::AckAndDrop => message.ack().await,
                        FailureAction::Requeue => message.nack(true).await,
                    };
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to settle failed message");
                    }
                }
            }
        }

        Ok(())
    }

    async fn process(&self, body: &[u8]) -> Outcome {
        let event: PostCreated = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(_) => return Outcome::Discarded("undecodable payload"),
        };

        let receivers =
            match NotificationStore::get_interested_followers(&self.pool, event.user_id).await {
                Ok(receivers) => receivers,
                Err(e) => return Outcome::Failed(e),
            };

        if receivers.is_empty() {
            return Outcome::Persisted {
                deliveries: Vec::new(),
            };
        }

        let author = match UserStore::find_by_id(&self.pool, event.user_id).await {
            Ok(author) => author,
            Err(e) => return Outcome::Failed(e),
        };

        let (notifications, deliveries) = build_fanout(&event, &author, &receivers);

        if let Err(e) =
            NotificationStore::create_batched(&self.pool, &notifications, NOTIFICATION_BATCH_SIZE)
                .await
        {
            return Outcome::Failed(e);
        }

        tracing::info!(
            post_id = event.post_id,
            author_id = %event.user_id,
            receivers = receivers.len(),
            "Fanned out new-post notifications"
        );

        Outcome::Persisted { deliveries }
    }
}

/// Build the notification rows and live deliveries for one post event.
/// Every receiver gets the same type, content and resource reference.
fn build_fanout(
    event: &PostCreated,
    author: &User,
    receivers: &[Uuid],
) -> (Vec<NewNotification>, Vec<NotificationDelivery>) {
    let content = format!(
        "{} has created new post: {}",
        author.username, event.post_title
    );
    let resource_id = event.post_id.to_string();

    let notifications = receivers
        .iter()
        .map(|&receiver_id| NewNotification {
            kind: NEW_POST_NOTIFICATION_TYPE.to_string(),
            receiver_id,
            content: content.clone(),
            resource_id: resource_id.clone(),
        })
        .collect();

    let deliveries = receivers
        .iter()
        .map(|&receiver_id| NotificationDelivery {
            receiver_id,
            kind: NEW_POST_NOTIFICATION_TYPE.to_string(),
            content: content.clone(),
            resource_id: resource_id.clone(),
        })
        .collect();

    (notifications, deliveries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_event() -> PostCreated {
        PostCreated {
            post_id: 42,
            user_id: Uuid::new_v4(),
            post_title: "Hello".to_string(),
            created_at: Utc::now(),
        }
    }

    fn make_author(id: Uuid) -> User {
        User {
            id,
            username: "alice".to_string(),
            display_name: None,
            avatar_url: None,
        }
    }

    #[test]
    fn test_build_fanout_one_record_per_receiver() {
        let event = make_event();
        let author = make_author(event.user_id);
        let receivers: Vec<Uuid> = (0..7).map(|_| Uuid::new_v4()).collect();

        let (notifications, deliveries) = build_fanout(&event, &author, &receivers);

        assert_eq!(notifications.len(), 7);
        assert_eq!(deliveries.len(), 7);
        for (n, receiver) in notifications.iter().zip(&receivers) {
            assert_eq!(n.receiver_id, *receiver);
            assert_eq!(n.kind, "newpost");
            assert_eq!(n.content, "alice has created new post: Hello");
            assert_eq!(n.resource_id, "42");
        }
    }

    #[test]
    fn test_build_fanout_empty_receivers() {
        let event = make_event();
        let author = make_author(event.user_id);

        let (notifications, deliveries) = build_fanout(&event, &author, &[]);
        assert!(notifications.is_empty());
        assert!(deliveries.is_empty());
    }

    #[test]
    fn test_post_created_decode_rejects_malformed_payload() {
        assert!(serde_json::from_slice::<PostCreated>(b"not json").is_err());
        assert!(serde_json::from_slice::<PostCreated>(br#"{"post_id": "nope"}"#).is_err());
    }

    #[test]
    fn test_post_created_decode_wire_format() {
        let body = serde_json::json!({
            "post_id": 7,
            "user_id": Uuid::nil(),
            "post_title": "First!",
            "created_at": "2025-01-01T00:00:00Z"
        });
        let event: PostCreated = serde_json::from_value(body).unwrap();
        assert_eq!(event.post_id, 7);
        assert_eq!(event.post_title, "First!");
    }
}
