//! The dealroom service facade.
//!
//! Every inbound operation follows the same shape: gate the actor, apply the
//! primary mutation through the owning component, then record the audit
//! entry and queue notifications. Only the primary mutation can fail the
//! call; audit and notification problems are logged and swallowed.

mod deals;
mod documents;
mod identities;
mod participants;

use crate::config::DealroomConfig;
use crate::projection::{project, Projection};
use dealroom_audit::{AuditEvent, AuditLog, ChainVerification};
use dealroom_custody::DocumentCustody;
use dealroom_directory::IdentityDirectory;
use dealroom_lifecycle::DealLifecycle;
use dealroom_notify::{
    BroadcastNotificationSink, Notification, NotificationEmitter, NotificationSink,
};
use dealroom_participation::ParticipationLedger;
use dealroom_policy::{authorize, has_capability, Capability};
use dealroom_storage::{
    AuditStore, BlobStore, DealStore, DealroomStorage, DocumentStore, IdentityStore,
    InMemoryBlobStore, InMemoryDealroomStorage, ParticipationStore, TaskStore,
};
use dealroom_types::{
    Actor, AuditLogEntry, DealId, DealParticipation, DealroomError, DealroomResult,
    TimelineStep,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Assembles a [`DealroomService`] from storage collaborators.
///
/// Every row store defaults to the single storage bundle passed to
/// [`DealroomServiceBuilder::new`]; individual stores can be swapped out.
pub struct DealroomServiceBuilder {
    config: DealroomConfig,
    identities: Arc<dyn IdentityStore>,
    participations: Arc<dyn ParticipationStore>,
    deals: Arc<dyn DealStore>,
    tasks: Arc<dyn TaskStore>,
    documents: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditStore>,
    blobs: Arc<dyn BlobStore>,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl DealroomServiceBuilder {
    pub fn new<S: DealroomStorage + 'static>(storage: Arc<S>) -> Self {
        Self {
            config: DealroomConfig::default(),
            identities: storage.clone(),
            participations: storage.clone(),
            deals: storage.clone(),
            tasks: storage.clone(),
            documents: storage.clone(),
            audit: storage,
            blobs: Arc::new(InMemoryBlobStore::new()),
            sink: None,
        }
    }

    pub fn config(mut self, config: DealroomConfig) -> Self {
        self.config = config;
        self
    }

    pub fn document_store(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = documents;
        self
    }

    pub fn task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn audit_store(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = audit;
        self
    }

    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    /// Deliver notifications to `sink` instead of the built-in broadcast channel.
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the service. Must run inside a tokio runtime for notifications
    /// to be delivered.
    pub fn build(self) -> DealroomResult<DealroomService> {
        let default_timeline = self.config.timeline.default_timeline()?;

        let directory = Arc::new(IdentityDirectory::new(
            self.identities.clone(),
            self.participations.clone(),
        ));
        let ledger = ParticipationLedger::new(self.participations.clone(), directory.clone());
        let custody = DocumentCustody::new(self.documents.clone(), self.tasks.clone())
            .with_rejected_override(self.config.custody.allow_rejected_override);
        let lifecycle = DealLifecycle::new(self.deals.clone());
        let audit = AuditLog::new(self.audit).with_enabled(self.config.audit.enabled);

        let (broadcast, sink): (Option<Arc<BroadcastNotificationSink>>, Arc<dyn NotificationSink>) =
            match self.sink {
                Some(sink) => (None, sink),
                None => {
                    let broadcast = Arc::new(BroadcastNotificationSink::new());
                    (Some(broadcast.clone()), broadcast)
                }
            };
        let notifier = if self.config.notifications.enabled {
            NotificationEmitter::spawn(sink, self.config.notifications.channel_capacity)
        } else {
            NotificationEmitter::disabled()
        };

        info!(
            audit = self.config.audit.enabled,
            notifications = notifier.is_enabled(),
            rejected_override = self.config.custody.allow_rejected_override,
            "Dealroom service ready"
        );

        Ok(DealroomService {
            config: self.config,
            directory,
            ledger,
            custody,
            lifecycle,
            participations: self.participations,
            tasks: self.tasks,
            blobs: self.blobs,
            audit,
            notifier,
            broadcast,
            default_timeline,
        })
    }
}

/// In-process API over the deal custody core.
pub struct DealroomService {
    config: DealroomConfig,
    directory: Arc<IdentityDirectory>,
    ledger: ParticipationLedger,
    custody: DocumentCustody,
    lifecycle: DealLifecycle,
    participations: Arc<dyn ParticipationStore>,
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    audit: AuditLog,
    notifier: NotificationEmitter,
    broadcast: Option<Arc<BroadcastNotificationSink>>,
    default_timeline: Vec<TimelineStep>,
}

impl DealroomService {
    pub fn builder<S: DealroomStorage + 'static>(storage: Arc<S>) -> DealroomServiceBuilder {
        DealroomServiceBuilder::new(storage)
    }

    /// A service over fresh in-memory storage.
    pub fn in_memory(config: DealroomConfig) -> DealroomResult<Self> {
        Self::builder(Arc::new(InMemoryDealroomStorage::new()))
            .config(config)
            .build()
    }

    pub fn config(&self) -> &DealroomConfig {
        &self.config
    }

    /// Live notification stream, when the built-in broadcast sink is in use.
    pub fn subscribe_notifications(&self) -> Option<broadcast::Receiver<Notification>> {
        self.broadcast.as_ref().map(|b| b.subscribe())
    }

    /// Wait until every queued notification has reached the sink.
    pub async fn flush_notifications(&self) {
        self.notifier.flush().await;
    }

    /// Audit entries of one deal, oldest first.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, deal_id = %deal_id))]
    pub async fn audit_trail(&self, actor: &Actor, deal_id: &DealId) -> DealroomResult<Vec<AuditLogEntry>> {
        authorize(actor, Capability::ReadAudit, "read audit trail")?;
        self.audit.trail(deal_id).await
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn verify_audit_chain(&self, actor: &Actor) -> DealroomResult<ChainVerification> {
        authorize(actor, Capability::ReadAudit, "verify audit chain")?;
        self.audit.verify_chain().await
    }

    /// Project every stored row into deal, task and roster views.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn snapshot(&self, actor: &Actor) -> DealroomResult<Projection> {
        authorize(actor, Capability::EditDeals, "view all deals")?;
        let identities = self.directory.list().await?;
        let links = self.participations.list_participations().await?;
        let deals = self.lifecycle.list().await?;
        let tasks = self.tasks.list_tasks().await?;
        Ok(project(&identities, &links, &deals, &tasks))
    }

    async fn record(&self, event: AuditEvent) {
        self.audit.record(event).await;
    }

    fn notify(&self, notification: Notification) {
        self.notifier.emit(notification);
    }

    /// Staff pass; everyone else needs an active link on the deal.
    async fn deal_access(
        &self,
        actor: &Actor,
        deal_id: &DealId,
        action: &str,
    ) -> DealroomResult<Option<DealParticipation>> {
        let link = self.ledger.active_link_for(deal_id, actor).await?;
        if link.is_none() && !has_capability(actor, Capability::EditDeals) {
            return Err(DealroomError::permission_denied(
                action,
                "an active participant of the deal or role broker, lawyer or admin",
            ));
        }
        Ok(link)
    }
}
