/// Conversation list state for one signed-in user
///
/// The thread list is only ever replaced by a fresh derivation. Local
/// placeholders survive a replacement until a derived thread with the same
/// (posting, counterpart) key shows up.
use crate::chat_service::ChatService;
use crate::conversation::{ChatMessage, ConversationThread, ThreadKey};
use crate::error::{LostFoundError, Result};
use crate::ids::{PostId, UserId};
use crate::models::{PostType, Profile};
use crate::reference_card::ReferenceCard;
use crate::session::Session;
use tracing::{debug, error, info, warn};

/// Issued by [`Inbox::begin_load`]; only the latest ticket may apply results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

/// Proof that a delete was requested for a thread; consumed on confirmation
#[derive(Debug)]
pub struct PendingDelete {
    thread_id: String,
    key: ThreadKey,
    placeholder: bool,
}

impl PendingDelete {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn key(&self) -> &ThreadKey {
        &self.key
    }
}

/// "Contact the poster" request coming from a posting
#[derive(Debug, Clone)]
pub struct ContactRequest {
    pub counterpart_id: UserId,
    pub counterpart_name: String,
    pub post_id: PostId,
    pub post_title: String,
    pub post_type: PostType,
    pub post_image: Option<String>,
}

pub struct Inbox {
    viewer: Profile,
    threads: Vec<ConversationThread>,
    active: Option<String>,
    draft: String,
    generation: u64,
}

impl Inbox {
    pub fn new(viewer: Profile) -> Self {
        Self {
            viewer,
            threads: Vec::new(),
            active: None,
            draft: String::new(),
            generation: 0,
        }
    }

    pub fn for_session(session: &Session) -> Result<Self> {
        Ok(Self::new(session.require_user()?.clone()))
    }

    pub fn viewer(&self) -> &Profile {
        &self.viewer
    }

    pub fn threads(&self) -> &[ConversationThread] {
        &self.threads
    }

    pub fn thread(&self, id: &str) -> Option<&ConversationThread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_by_key(&self, key: &ThreadKey) -> Option<&ConversationThread> {
        self.threads.iter().find(|t| &t.key == key)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_thread(&self) -> Option<&ConversationThread> {
        self.active.as_deref().and_then(|id| self.thread(id))
    }

    /// Returns false when no thread has that id
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.thread(id).is_some() {
            self.active = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Apply a derivation if `ticket` is still the newest; returns whether it applied
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        derived: Vec<ConversationThread>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Discarding superseded load {} (latest {})",
                ticket.generation, self.generation
            );
            return false;
        }
        self.replace_threads(derived);
        true
    }

    fn replace_threads(&mut self, derived: Vec<ConversationThread>) {
        let mut next: Vec<ConversationThread> =
            Vec::with_capacity(self.threads.len() + derived.len());

        for old in self.threads.drain(..) {
            if !old.is_placeholder() {
                continue;
            }
            match derived.iter().find(|t| t.key == old.key) {
                Some(real) => {
                    if self.active.as_deref() == Some(old.id.as_str()) {
                        debug!("Placeholder {} became {}", old.id, real.id);
                        self.active = Some(real.id.clone());
                    }
                }
                None => next.push(old),
            }
        }
        next.extend(derived);
        self.threads = next;

        if let Some(active) = &self.active {
            if !self.threads.iter().any(|t| &t.id == active) {
                self.active = None;
            }
        }
    }

    /// Re-fetch and re-derive. On failure the list falls back to empty
    /// (placeholders stay) and the error is returned for display.
    pub async fn refresh(&mut self, chat: &ChatService) -> Result<()> {
        let ticket = self.begin_load();
        match chat.conversations(&self.viewer.id).await {
            Ok(threads) => {
                self.finish_load(ticket, threads);
                Ok(())
            }
            Err(e) => {
                error!("Failed to load conversations: {}", e);
                self.finish_load(ticket, Vec::new());
                Err(e)
            }
        }
    }

    /// Open the thread for a posting's owner, creating a placeholder and
    /// sending the posting's reference card when none exists yet.
    /// Returns the id of the now-active thread.
    pub async fn open_contact(
        &mut self,
        chat: &ChatService,
        contact: ContactRequest,
    ) -> Result<String> {
        if contact.counterpart_id == self.viewer.id {
            return Err(LostFoundError::InvalidArgument(
                "cannot start a conversation with yourself".to_string(),
            ));
        }

        let key = ThreadKey::new(contact.post_id, contact.counterpart_id.clone());
        if let Some(existing) = self.thread_by_key(&key) {
            let id = existing.id.clone();
            self.active = Some(id.clone());
            return Ok(id);
        }

        let placeholder = ConversationThread::placeholder(
            contact.counterpart_id.clone(),
            &contact.counterpart_name,
            contact.post_id,
            &contact.post_title,
            contact.post_type,
        );
        info!("Opened placeholder {} for {}", placeholder.id, key);
        self.active = Some(placeholder.id.clone());
        self.threads.insert(0, placeholder);

        let card = ReferenceCard {
            title: contact.post_title,
            image: contact.post_image,
            post_type: contact.post_type,
            post_id: contact.post_id,
        };
        match chat
            .send_message(&self.viewer, &contact.counterpart_id, contact.post_id, &card.encode())
            .await
        {
            Ok(_) => {
                if let Err(e) = self.refresh(chat).await {
                    warn!("Card for {} sent but refresh failed: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to send reference card for {}: {}", key, e),
        }

        self.active
            .clone()
            .ok_or_else(|| LostFoundError::NotFound(format!("conversation {}", key)))
    }

    /// Send the draft to the active thread. The draft is cleared only after
    /// the message is stored, so nothing typed is lost on failure.
    pub async fn send_draft(&mut self, chat: &ChatService) -> Result<ChatMessage> {
        let text = self.draft.trim().to_string();
        if text.is_empty() {
            return Err(LostFoundError::InvalidArgument(
                "message text must not be empty".to_string(),
            ));
        }
        let thread = self
            .active_thread()
            .ok_or_else(|| LostFoundError::NotFound("no active conversation".to_string()))?;
        let (counterpart, post_id) = (thread.counterpart.id.clone(), thread.post_id);

        let sent = match chat.send_message(&self.viewer, &counterpart, post_id, &text).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Send failed, keeping draft: {}", e);
                return Err(e);
            }
        };
        self.draft.clear();

        if let Err(e) = self.refresh(chat).await {
            warn!("Message {} sent but refresh failed: {}", sent.id, e);
        }
        Ok(sent)
    }

    pub fn request_delete(&self, thread_id: &str) -> Result<PendingDelete> {
        let thread = self
            .thread(thread_id)
            .ok_or_else(|| LostFoundError::NotFound(format!("conversation {}", thread_id)))?;
        Ok(PendingDelete {
            thread_id: thread.id.clone(),
            key: thread.key.clone(),
            placeholder: thread.is_placeholder(),
        })
    }

    /// Irreversibly delete a confirmed thread; returns removed message count.
    /// A placeholder that was reconciled since the request resolves to the
    /// stored thread with the same key.
    pub async fn confirm_delete(
        &mut self,
        chat: &ChatService,
        pending: PendingDelete,
    ) -> Result<usize> {
        let (thread_id, placeholder) = match self
            .thread(&pending.thread_id)
            .or_else(|| self.thread_by_key(&pending.key))
        {
            Some(t) => (t.id.clone(), t.is_placeholder()),
            None => (pending.thread_id.clone(), pending.placeholder),
        };

        let removed = if placeholder {
            0
        } else {
            let key = &pending.key;
            chat.delete_conversation(&self.viewer.id, &key.counterpart_id, key.post_id)
                .await?
        };

        self.threads.retain(|t| t.id != thread_id);
        if self.active.as_deref() == Some(thread_id.as_str()) {
            self.active = None;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::models::{Category, Location, NewPost};
    use chrono::Utc;

    fn viewer() -> Profile {
        Profile {
            id: UserId::new("me").unwrap(),
            name: "Me".to_string(),
            email: "me@example.com".to_string(),
            avatar_url: String::new(),
            joined_at: Utc::now(),
        }
    }

    fn derived(post: u64, counterpart: &str) -> ConversationThread {
        let mut t = ConversationThread::placeholder(
            UserId::new(counterpart).unwrap(),
            counterpart,
            PostId(post),
            "title",
            PostType::Lost,
        );
        t.id = t.key.to_string();
        t
    }

    #[test]
    fn test_superseded_load_is_discarded() {
        let mut inbox = Inbox::new(viewer());
        let stale = inbox.begin_load();
        let fresh = inbox.begin_load();

        assert!(inbox.finish_load(fresh, vec![derived(1, "a")]));
        assert!(!inbox.finish_load(stale, vec![derived(2, "b"), derived(3, "c")]));
        assert_eq!(inbox.threads().len(), 1);
        assert_eq!(inbox.threads()[0].id, "1:a");
    }

    #[test]
    fn test_placeholder_reconciles_by_key() {
        let mut inbox = Inbox::new(viewer());
        let placeholder = ConversationThread::placeholder(
            UserId::new("a").unwrap(),
            "A",
            PostId(1),
            "Keys",
            PostType::Lost,
        );
        let temp_id = placeholder.id.clone();
        inbox.threads.push(placeholder);
        assert!(inbox.set_active(&temp_id));

        let ticket = inbox.begin_load();
        inbox.finish_load(ticket, vec![]);
        assert_eq!(inbox.active_id(), Some(temp_id.as_str()));
        assert_eq!(inbox.threads().len(), 1);

        let ticket = inbox.begin_load();
        inbox.finish_load(ticket, vec![derived(1, "a"), derived(2, "b")]);
        assert_eq!(inbox.active_id(), Some("1:a"));
        assert!(inbox.threads().iter().all(|t| !t.is_placeholder()));
    }

    #[test]
    fn test_active_cleared_when_thread_disappears() {
        let mut inbox = Inbox::new(viewer());
        let ticket = inbox.begin_load();
        inbox.finish_load(ticket, vec![derived(1, "a")]);
        assert!(inbox.set_active("1:a"));

        let ticket = inbox.begin_load();
        inbox.finish_load(ticket, vec![]);
        assert_eq!(inbox.active_id(), None);
        assert!(!inbox.set_active("1:a"));
    }

    #[tokio::test]
    async fn test_confirm_delete_follows_reconciled_placeholder() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = Backend::open(dir.path(), 8).unwrap();
        let owner = Profile {
            id: UserId::new("a").unwrap(),
            name: "A".to_string(),
            ..viewer()
        };
        let post = backend
            .posts
            .create_post(
                &owner,
                NewPost {
                    title: "Keys".to_string(),
                    description: String::new(),
                    post_type: PostType::Lost,
                    category: Category::KeysCards,
                    image_url: None,
                    location: Location {
                        lat: 0.0,
                        lng: 0.0,
                        name: "Park".to_string(),
                    },
                    contact_info: None,
                },
            )
            .await
            .unwrap();

        let mut inbox = Inbox::new(viewer());
        let placeholder =
            ConversationThread::placeholder(owner.id.clone(), "A", post.id, "Keys", PostType::Lost);
        let temp_id = placeholder.id.clone();
        inbox.threads.push(placeholder);
        let pending = inbox.request_delete(&temp_id).unwrap();

        backend
            .chat
            .send_message(&viewer(), &owner.id, post.id, "hello")
            .await
            .unwrap();
        inbox.refresh(&backend.chat).await.unwrap();
        assert!(inbox.thread(&temp_id).is_none());

        let removed = inbox.confirm_delete(&backend.chat, pending).await.unwrap();
        assert_eq!(removed, 1);
        assert!(inbox.threads().is_empty());
        assert!(backend.chat.conversations(&owner.id).await.unwrap().is_empty());
    }

    #[test]
    fn test_for_session_requires_sign_in() {
        let mut session = Session::new();
        assert!(Inbox::for_session(&session).is_err());
        session.sign_in(viewer());
        assert_eq!(Inbox::for_session(&session).unwrap().viewer().name, "Me");
    }
}
