//! Send, history, read, and typing commands.

use tracing::{info, warn};

use curalink_shared::error::{CuralinkError, ProtocolError, ValidationError};
use curalink_shared::models::{Attachment, AttachmentSource, Delivery, Draft};
use curalink_shared::protocol::{ClientEvent, MessagePayload, SendMessagePayload};
use curalink_shared::types::{PendingId, RoomId};
use curalink_store::{Confirmation, Outgoing};

use crate::client::ChatClient;
use crate::events::{emit_ui, UiEvent};

impl ChatClient {
    /// Send a message: validate, upload the attachment if any, append an
    /// optimistic entry, then reconcile with the server acknowledgement.
    ///
    /// A failed send stays in the log as `Failed` rather than disappearing.
    pub async fn send_message(
        &self,
        room_id: &RoomId,
        draft: Draft,
    ) -> Result<PendingId, CuralinkError> {
        // Rejected locally before any network call.
        if draft.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let attachment = match draft.attachment {
            Some(source) => Some(self.upload_attachment(source).await?),
            None => None,
        };
        let content = draft.content.filter(|c| !c.trim().is_empty());

        let (pending, me, role) = {
            let mut guard = self.lock();
            let me = guard.me.clone();
            let role = guard.role;
            let pending = guard.conversations.send_optimistic(
                room_id,
                Outgoing {
                    sender_id: me.clone(),
                    sender_role: role,
                    content: content.clone(),
                    attachment: attachment.clone(),
                },
            );
            (pending, me, role)
        };
        emit_ui(
            &self.ui_tx,
            UiEvent::MessageAppended {
                room_id: room_id.clone(),
            },
        );

        let payload = SendMessagePayload {
            room_id: room_id.clone(),
            sender_id: me,
            sender_type: role,
            content,
            file_link: attachment.as_ref().map(|a| a.url.clone()),
            file_type: attachment.as_ref().map(|a| a.kind),
            file_name: attachment.map(|a| a.file_name),
        };

        match self
            .session()
            .emit_ack(ClientEvent::SendMessage(payload))
            .await
        {
            Ok(ack) => match serde_json::from_value::<MessagePayload>(ack) {
                Ok(server) => {
                    let confirmation = self.lock().conversations.confirm_pending(
                        room_id,
                        pending,
                        server.into_message(),
                    );
                    if confirmation == Confirmation::Unknown {
                        warn!(%pending, "Acknowledgement arrived for unknown pending entry");
                    }
                    emit_ui(
                        &self.ui_tx,
                        UiEvent::DeliveryChanged {
                            room_id: room_id.clone(),
                            pending,
                            delivery: Delivery::Confirmed,
                        },
                    );
                    info!(room = %room_id, %pending, "Message send confirmed");
                    Ok(pending)
                }
                Err(source) => {
                    self.mark_send_failed(room_id, pending);
                    Err(ProtocolError::MalformedPayload {
                        event: "sendMessage".into(),
                        source,
                    }
                    .into())
                }
            },
            Err(err) => {
                warn!(room = %room_id, error = %err, "Message send failed");
                self.mark_send_failed(room_id, pending);
                Err(err.into())
            }
        }
    }

    fn mark_send_failed(&self, room_id: &RoomId, pending: PendingId) {
        self.lock().conversations.fail_pending(room_id, pending);
        emit_ui(
            &self.ui_tx,
            UiEvent::DeliveryChanged {
                room_id: room_id.clone(),
                pending,
                delivery: Delivery::Failed,
            },
        );
    }

    /// An upload failure is a recoverable, per-attachment error; the draft is
    /// never sent without its attachment.
    async fn upload_attachment(
        &self,
        source: AttachmentSource,
    ) -> Result<Attachment, CuralinkError> {
        let uploaded = self
            .api
            .upload_file(&source.file_name, source.kind, source.bytes)
            .await?;
        Ok(Attachment {
            kind: uploaded.file_type,
            url: uploaded.file_url,
            file_name: uploaded.file_name,
            size: None,
        })
    }

    /// Fetch one history page and merge it into the log.  Messages that
    /// arrived live while the page was in flight are preserved; a failed
    /// fetch leaves the already-loaded log untouched.
    pub async fn load_history(&self, room_id: &RoomId, page: u32) -> Result<usize, CuralinkError> {
        let fetched = self
            .api
            .fetch_history(room_id, page, self.config.history_page_size, None)
            .await?;
        let inserted = self.lock().conversations.merge_history(room_id, fetched.messages);
        emit_ui(
            &self.ui_tx,
            UiEvent::HistoryMerged {
                room_id: room_id.clone(),
                inserted,
            },
        );
        Ok(inserted)
    }

    /// Mark the whole room read locally (incoming messages and the unread
    /// counter), then tell the server.
    pub async fn mark_room_read(&self, room_id: &RoomId) -> Result<(), CuralinkError> {
        let (me, total) = {
            let mut guard = self.lock();
            let counterpart_role = guard.role.counterpart();
            guard.conversations.mark_read_from(room_id, counterpart_role);
            if let Some(counterpart) = guard.directory.counterpart_of(room_id) {
                guard.unread.apply_cleared(&counterpart);
                guard.directory.set_unread(&counterpart, 0);
            }
            (guard.me.clone(), guard.unread.total())
        };
        emit_ui(&self.ui_tx, UiEvent::UnreadChanged { total });

        self.session()
            .emit(ClientEvent::MarkAsRead {
                room_id: room_id.clone(),
                receiver_id: me,
            })
            .await?;
        Ok(())
    }

    /// Forward the local typing state to the counterpart.
    pub async fn set_typing(&self, room_id: &RoomId, is_typing: bool) -> Result<(), CuralinkError> {
        let me = self.lock().me.clone();
        self.session()
            .emit(ClientEvent::Typing {
                room_id: room_id.clone(),
                user_id: me,
                is_typing,
            })
            .await?;
        Ok(())
    }
}
