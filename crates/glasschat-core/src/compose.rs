//! Compose & send pipeline.
//!
//! Turns local compose state (text, optional image, optional reply
//! target) into durable messages. An image with a caption becomes two
//! ordered messages: the image first, the caption right after, both
//! carrying the reply target. Attachment failures abort the whole send;
//! nothing is partially written.

use std::sync::Arc;

use tracing::{debug, info};

use glasschat_media::{prepare_image, AttachmentUploader, ImageQuality};
use glasschat_shared::{ConversationId, Message, MessageId, Role};
use glasschat_store::{ConversationPatch, ConversationStore, MessagePatch, NewMessage};

use crate::error::SendError;

/// Local compose state handed to [`SendPipeline::send`].
#[derive(Debug, Clone, Default)]
pub struct Outgoing {
    pub text: Option<String>,
    /// Raw image bytes from the picker, processed per the quality toggle.
    pub image: Option<Vec<u8>>,
    pub reply_to: Option<MessageId>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            image: Some(bytes),
            ..Default::default()
        }
    }

    pub fn with_caption(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: MessageId) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// Sends, edits, and deletes messages for one side of a conversation.
pub struct SendPipeline<S, U> {
    store: Arc<S>,
    uploader: U,
    conversation: ConversationId,
    role: Role,
    quality: ImageQuality,
}

impl<S: ConversationStore, U: AttachmentUploader> SendPipeline<S, U> {
    pub fn new(store: Arc<S>, uploader: U, conversation: ConversationId, role: Role) -> Self {
        Self {
            store,
            uploader,
            conversation,
            role,
            quality: ImageQuality::Fast,
        }
    }

    /// The user-toggled "fast vs high-quality" upload switch.
    pub fn set_quality(&mut self, quality: ImageQuality) {
        self.quality = quality;
    }

    pub fn quality(&self) -> ImageQuality {
        self.quality
    }

    /// Send the composed content. Returns the stored messages in append
    /// order.
    ///
    /// The caller clears its compose input as soon as this is invoked
    /// (optimistic); a returned error is surfaced inline and the input is
    /// not restored.
    pub async fn send(&self, outgoing: Outgoing) -> Result<Vec<Message>, SendError> {
        let text = outgoing
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if text.is_none() && outgoing.image.is_none() {
            return Err(SendError::EmptyMessage);
        }

        // The sender cannot still be typing once the message lands.
        // Best-effort, like every presence write.
        if let Err(e) = self
            .store
            .merge_conversation(
                &self.conversation,
                ConversationPatch::typing(self.role, false),
            )
            .await
        {
            debug!(conversation = %self.conversation, error = %e, "typing reset failed");
        }

        let mut sent = Vec::new();

        if let Some(bytes) = &outgoing.image {
            // Process + upload first: if this fails the whole send aborts
            // before anything reaches the store.
            let prepared = prepare_image(bytes, self.quality)?;
            let url = self.uploader.upload(&prepared).await?;

            let mut message = NewMessage::image(self.role, url);
            if let Some(reply_to) = outgoing.reply_to {
                message = message.with_reply_to(reply_to);
            }
            sent.push(self.store.append_message(&self.conversation, message).await?);
        }

        if let Some(text) = text {
            let mut message = NewMessage::text(self.role, text);
            if let Some(reply_to) = outgoing.reply_to {
                message = message.with_reply_to(reply_to);
            }
            sent.push(self.store.append_message(&self.conversation, message).await?);
        }

        info!(
            conversation = %self.conversation,
            count = sent.len(),
            "message sent"
        );
        Ok(sent)
    }

    /// Rewrite a message's text in place and mark it edited. Only the
    /// original author may edit; the timestamp and delivery status are
    /// untouched by construction.
    pub async fn edit(&self, message_id: MessageId, new_text: impl Into<String>) -> Result<(), SendError> {
        let existing = self.store.get_message(&self.conversation, message_id).await?;
        if existing.sender != self.role {
            return Err(SendError::NotAuthor);
        }
        self.store
            .update_message(&self.conversation, message_id, MessagePatch::edit(new_text.into()))
            .await?;
        Ok(())
    }

    /// Permanently remove one message. Idempotent; returns whether it
    /// existed.
    pub async fn delete(&self, message_id: MessageId) -> Result<bool, SendError> {
        Ok(self.store.delete_message(&self.conversation, message_id).await?)
    }

    /// Permanently remove every message in the conversation.
    pub async fn clear_history(&self) -> Result<usize, SendError> {
        Ok(self.store.clear_messages(&self.conversation).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use glasschat_media::MediaError;
    use glasschat_shared::{MessageStatus, Role};
    use glasschat_store::MemoryStore;
    use std::io::Cursor;

    struct StubUploader;

    #[async_trait]
    impl AttachmentUploader for StubUploader {
        async fn upload(&self, _image_bytes: &[u8]) -> Result<String, MediaError> {
            Ok("https://img.example/hosted.jpg".to_string())
        }
    }

    struct FailingUploader;

    #[async_trait]
    impl AttachmentUploader for FailingUploader {
        async fn upload(&self, _image_bytes: &[u8]) -> Result<String, MediaError> {
            Err(MediaError::UploadRejected(500))
        }
    }

    fn conv() -> ConversationId {
        ConversationId::from("VIP-01")
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(32, 32, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn pipeline<U: AttachmentUploader>(
        store: &Arc<MemoryStore>,
        uploader: U,
    ) -> SendPipeline<MemoryStore, U> {
        SendPipeline::new(store.clone(), uploader, conv(), Role::User)
    }

    #[tokio::test]
    async fn text_send_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, StubUploader);

        pipeline.send(Outgoing::text("Hello")).await.unwrap();

        let messages = store.list_messages(&conv()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Hello");
        assert_eq!(messages[0].sender, Role::User);
        assert!(!messages[0].is_image);
        assert_eq!(messages[0].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn empty_send_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, StubUploader);

        assert!(matches!(
            pipeline.send(Outgoing::default()).await,
            Err(SendError::EmptyMessage)
        ));
        assert!(matches!(
            pipeline.send(Outgoing::text("   ")).await,
            Err(SendError::EmptyMessage)
        ));
        assert!(store.list_messages(&conv()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_with_caption_lands_as_two_ordered_messages() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, StubUploader);
        let reply_to = MessageId::new();

        pipeline
            .send(
                Outgoing::image(png_bytes())
                    .with_caption("Hello")
                    .with_reply_to(reply_to),
            )
            .await
            .unwrap();

        let messages = store.list_messages(&conv()).await.unwrap();
        assert_eq!(messages.len(), 2);

        assert!(messages[0].is_image);
        assert_eq!(messages[0].text, "https://img.example/hosted.jpg");
        assert!(!messages[1].is_image);
        assert_eq!(messages[1].text, "Hello");
        assert!(messages[0].timestamp.unwrap() < messages[1].timestamp.unwrap());

        // Both halves carry the same reply target.
        assert_eq!(messages[0].reply_to_id, Some(reply_to));
        assert_eq!(messages[1].reply_to_id, Some(reply_to));
    }

    #[tokio::test]
    async fn failed_upload_aborts_the_whole_send() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, FailingUploader);

        let err = pipeline
            .send(Outgoing::image(png_bytes()).with_caption("Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Upload(_)));

        // Not even the caption went out.
        assert!(store.list_messages(&conv()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_forces_typing_off() {
        let store = Arc::new(MemoryStore::new());
        store
            .merge_conversation(&conv(), ConversationPatch::typing(Role::User, true))
            .await
            .unwrap();
        let pipeline = pipeline(&store, StubUploader);

        pipeline.send(Outgoing::text("hi")).await.unwrap();

        let state = store.get_conversation(&conv()).await.unwrap().unwrap();
        assert!(!state.user_typing);
    }

    #[tokio::test]
    async fn only_the_author_may_edit() {
        let store = Arc::new(MemoryStore::new());
        let user_pipeline = pipeline(&store, StubUploader);
        let admin_pipeline =
            SendPipeline::new(store.clone(), StubUploader, conv(), Role::Admin);

        let sent = user_pipeline.send(Outgoing::text("helo")).await.unwrap();
        let id = sent[0].id;

        assert!(matches!(
            admin_pipeline.edit(id, "hacked").await,
            Err(SendError::NotAuthor)
        ));

        user_pipeline.edit(id, "hello").await.unwrap();
        let stored = store.get_message(&conv(), id).await.unwrap();
        assert_eq!(stored.text, "hello");
        assert!(stored.is_edited);
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.timestamp, sent[0].timestamp);
    }

    #[tokio::test]
    async fn delete_and_clear_history() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, StubUploader);

        let sent = pipeline.send(Outgoing::text("a")).await.unwrap();
        pipeline.send(Outgoing::text("b")).await.unwrap();

        assert!(pipeline.delete(sent[0].id).await.unwrap());
        assert!(!pipeline.delete(sent[0].id).await.unwrap());

        assert_eq!(pipeline.clear_history().await.unwrap(), 1);
        assert!(store.list_messages(&conv()).await.unwrap().is_empty());
    }
}
